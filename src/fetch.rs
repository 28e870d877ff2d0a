//! Artifact download.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::error::{IoContext, Result};
use crate::process::Cmd;

/// Retrieves a URL into a local file.
pub trait ArtifactFetcher {
    /// Download `url` to `dest`. Implementations skip the download when
    /// `dest` already exists.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// [`ArtifactFetcher`] backed by `curl`.
///
/// Downloads into `<dest>.part` and renames on success, so an interrupted
/// transfer never leaves a file that the existence check would accept.
#[derive(Debug, Clone, Default)]
pub struct CurlFetcher {
    timeout: Option<Duration>,
}

impl CurlFetcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ArtifactFetcher for CurlFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        if dest.exists() {
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .io_context(|| format!("creating {}", parent.display()))?;
        }

        let mut part = dest.as_os_str().to_owned();
        part.push(".part");
        let part = Path::new(&part);

        info!("Downloading {}", url);
        let mut cmd = Cmd::new("curl")
            .args(["-fsSL", "-o"])
            .arg_path(part)
            .arg(url)
            .error_msg(format!("download of {}", url));
        if let Some(t) = self.timeout {
            cmd = cmd.timeout(t);
        }
        if let Err(e) = cmd.run() {
            let _ = fs::remove_file(part);
            return Err(e);
        }

        fs::rename(part, dest)
            .io_context(|| format!("moving download into place at {}", dest.display()))
    }
}
