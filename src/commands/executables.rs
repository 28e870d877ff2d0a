//! Executables command - lists what an unpacked package ships.

use anyhow::{Context, Result};

use minimize::config::Config;
use minimize::pipeline::Pipeline;

/// Execute the executables command.
///
/// With `all`, each executable's libraries are resolved and the packages
/// providing them are listed next to it.
pub fn cmd_executables(package: &str, all: bool, config: &Config) -> Result<()> {
    let hint = || format!("Run 'minimize build {} --fetch --unpack' first", package);
    let mut pipeline = Pipeline::from_config(config);
    let set = pipeline.executables(package).with_context(hint)?;

    if all {
        let manifests = pipeline
            .executable_manifests(package)
            .with_context(|| format!("Failed to resolve libraries of {}", package))?;
        for manifest in &manifests {
            println!("{}", manifest.path);
            for name in manifest.packages() {
                println!("    {}", name);
            }
            for gap in &manifest.unresolved {
                println!("    ! {} ({}): {}", gap.library, gap.stage, gap.reason);
            }
        }
    } else {
        for exe in set.iter() {
            println!("{:<24} {}", exe.name, exe.image_path().display());
        }
    }

    for collision in &set.collisions {
        println!(
            "  note: {} also at /{} (kept /{})",
            collision.name,
            collision.replaced.display(),
            collision.kept.display()
        );
    }
    if set.is_empty() {
        println!("No executables in {}", package);
    }
    Ok(())
}
