//! Compare command - orders two release names.

use anyhow::{Context, Result};
use std::cmp::Ordering;

use minimize::release::Release;

/// Execute the compare command.
pub fn cmd_compare(left: &str, right: &str) -> Result<()> {
    let a: Release = left.parse()?;
    let b: Release = right.parse()?;
    let ordering = a
        .compare(&b)
        .with_context(|| format!("Cannot compare {} with {}", left, right))?;

    let symbol = match ordering {
        Ordering::Less => "<",
        Ordering::Equal => "=",
        Ordering::Greater => ">",
    };
    println!("{} {} {}", a, symbol, b);
    Ok(())
}
