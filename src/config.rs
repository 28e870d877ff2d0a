//! Configuration management for minimize.
//!
//! Reads configuration from environment variables. `main` loads an
//! optional `.env` (via dotenvy) first, so real environment variables take
//! precedence over the file. CLI flags override both.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for each external command, in seconds.
pub const DEFAULT_COMMAND_TIMEOUT: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Downloaded package archives (default: minimize/packages)
    pub package_dir: PathBuf,
    /// Extracted package trees, one directory per package (default: minimize/unpack)
    pub unpack_dir: PathBuf,
    /// Image trees, one directory per executable (default: minimize/model)
    pub model_dir: PathBuf,
    /// Per-command deadline; `None` disables it (MINIMIZE_COMMAND_TIMEOUT=0)
    pub command_timeout: Option<Duration>,
    /// Download install-time dependencies alongside each package
    pub fetch_dependencies: bool,
    /// Protocol passed to `dnf download --urlprotocol`
    pub url_protocol: String,
}

impl Config {
    /// Load configuration from the environment, resolving relative paths
    /// against `base_dir`.
    pub fn load(base_dir: &Path) -> Self {
        Self::from_lookup(base_dir, |key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(base_dir: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let dir = |key: &str, default: &str| {
            let path = PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()));
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };

        let command_timeout = match lookup("MINIMIZE_COMMAND_TIMEOUT")
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT)),
        };

        let fetch_dependencies = lookup("MINIMIZE_FETCH_DEPS")
            .map(|s| !matches!(s.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);

        Self {
            package_dir: dir("MINIMIZE_PACKAGE_DIR", "minimize/packages"),
            unpack_dir: dir("MINIMIZE_UNPACK_DIR", "minimize/unpack"),
            model_dir: dir("MINIMIZE_MODEL_DIR", "minimize/model"),
            command_timeout,
            fetch_dependencies,
            url_protocol: lookup("MINIMIZE_URL_PROTOCOL").unwrap_or_else(|| "https".to_string()),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  MINIMIZE_PACKAGE_DIR: {}", self.package_dir.display());
        println!("  MINIMIZE_UNPACK_DIR: {}", self.unpack_dir.display());
        println!("  MINIMIZE_MODEL_DIR: {}", self.model_dir.display());
        match self.command_timeout {
            Some(t) => println!("  MINIMIZE_COMMAND_TIMEOUT: {}s", t.as_secs()),
            None => println!("  MINIMIZE_COMMAND_TIMEOUT: disabled"),
        }
        println!("  MINIMIZE_FETCH_DEPS: {}", self.fetch_dependencies);
        println!("  MINIMIZE_URL_PROTOCOL: {}", self.url_protocol);
    }
}
