//! Package archive extraction.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, IoContext, Result};
use crate::process::{shell_in, shell_quote};

/// Extracts an installable package archive's file payload into a directory.
///
/// Implementations must keep symlinks as links and preserve permission
/// bits; executable discovery relies on the execute bit surviving.
pub trait ArchiveExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// [`ArchiveExtractor`] for RPMs using `rpm2cpio | cpio`.
#[derive(Debug, Clone, Default)]
pub struct RpmExtractor {
    timeout: Option<Duration>,
}

impl RpmExtractor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ArchiveExtractor for RpmExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        if !archive.is_file() {
            return Err(Error::Missing {
                what: format!("archive {}", archive.display()),
            });
        }
        fs::create_dir_all(dest).io_context(|| format!("creating {}", dest.display()))?;

        // cpio keeps symlinks as links; -m keeps mtimes, -u overwrites on re-extract
        let archive = fs::canonicalize(archive)
            .io_context(|| format!("resolving {}", archive.display()))?;
        let command = format!(
            "rpm2cpio {} | cpio -idmu --quiet",
            shell_quote(&archive.to_string_lossy())
        );
        shell_in(&command, dest, self.timeout).map_err(|e| match e {
            Error::Tool { message, .. } => Error::Tool {
                program: "rpm2cpio | cpio".to_string(),
                message: format!("extracting {}: {}", archive.display(), message),
            },
            other => other,
        })?;
        Ok(())
    }
}
