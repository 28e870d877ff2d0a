//! Shared-library discovery via the dynamic link inspector.
//!
//! `ldd` is run on the fully qualified executable path and its report is
//! parsed one line at a time. The supported grammar is
//!
//! ```text
//! [<soname> =>] <absolute path> (<load address>)
//! ```
//!
//! Virtual objects such as `linux-vdso.so.1` have no path and are skipped.
//! `<soname> => not found` lines are kept as unresolved, and anything else
//! is kept as unrecognised, so nothing is dropped silently.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::process::Cmd;

/// Produces the textual dependency report for an executable.
pub trait LinkInspector {
    fn inspect(&self, executable: &Path) -> Result<String>;
}

/// A shared object the executable resolves against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Library {
    /// File name, e.g. `libc.so.6`.
    pub name: String,
    /// Absolute path as reported by the inspector.
    pub path: PathBuf,
}

impl Library {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, path }
    }
}

/// Parsed link inspector report. One level deep: the libraries' own
/// dependencies are not followed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Resolved libraries, in report order.
    pub libraries: Vec<Library>,
    /// Sonames reported as `not found`.
    pub unresolved: Vec<String>,
    /// Lines that match no known form.
    pub unrecognized: Vec<String>,
}

impl LinkReport {
    /// One [`Error::UnresolvedLibrary`] per unresolved soname.
    pub fn unresolved_errors(&self) -> impl Iterator<Item = Error> + '_ {
        self.unresolved.iter().map(|soname| Error::UnresolvedLibrary {
            soname: soname.clone(),
        })
    }
}

/// Parse an `ldd` report.
pub fn parse_ldd_output(output: &str) -> LinkReport {
    let mut report = LinkReport::default();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty()
            || line.contains("not a dynamic executable")
            || line.contains("statically linked")
        {
            continue;
        }

        let (soname, rest) = match line.split_once("=>") {
            Some((soname, rest)) => (Some(soname.trim()), rest.trim()),
            None => (None, line),
        };

        if rest.starts_with("not found") {
            report
                .unresolved
                .push(soname.unwrap_or(rest).to_string());
            continue;
        }

        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(path), Some(addr)) if path.starts_with('/') && addr.starts_with("(0x") => {
                report.libraries.push(Library::from_path(path));
            }
            // linux-gate.so.1 =>  (0x...)
            (Some(addr), None) if addr.starts_with("(0x") => {}
            // linux-vdso.so.1 (0x...)
            (Some(_), Some(addr)) if soname.is_none() && addr.starts_with("(0x") => {}
            _ => report.unrecognized.push(line.to_string()),
        }
    }

    report
}

/// [`LinkInspector`] backed by `ldd`.
#[derive(Debug, Clone, Default)]
pub struct LddInspector {
    timeout: Option<Duration>,
}

impl LddInspector {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl LinkInspector for LddInspector {
    fn inspect(&self, executable: &Path) -> Result<String> {
        let mut cmd = Cmd::new("ldd").arg_path(executable).allow_fail();
        if let Some(t) = self.timeout {
            cmd = cmd.timeout(t);
        }
        let result = cmd.run()?;

        // ldd exits 1 for static binaries but still says so
        let text = format!("{}{}", result.stdout, result.stderr);
        if !result.success() && !text.contains("not a dynamic executable") {
            return Err(Error::LinkInspection {
                path: executable.to_path_buf(),
                reason: result.stderr_trimmed().to_string(),
            });
        }
        Ok(result.stdout)
    }
}

/// Inspect `executable` and parse the report.
pub fn libraries(inspector: &dyn LinkInspector, executable: &Path) -> Result<LinkReport> {
    if !executable.is_absolute() {
        return Err(Error::LinkInspection {
            path: executable.to_path_buf(),
            reason: "executable path must be absolute".to_string(),
        });
    }
    let text = inspector.inspect(executable)?;
    Ok(parse_ldd_output(&text))
}
