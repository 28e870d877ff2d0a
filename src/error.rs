//! Domain errors for package resolution and image assembly.
//!
//! Library code returns [`Error`]; the command layer wraps it in
//! `anyhow` with extra context before it reaches `main`.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The package index had no entry for a file or package name.
    #[error("no package provides '{query}'")]
    NotFound { query: String },

    /// A file or directory the run depends on is absent.
    #[error("{what} not found")]
    Missing { what: String },

    /// A release name did not match `<name>-<major>.<minor>[.<patch>]-<build>.<distro>.<arch>`.
    #[error("cannot parse release name '{input}'")]
    Parse { input: String },

    /// Two releases of different packages, distros or architectures were compared.
    #[error("mismatched package {field}: {left} != {right}")]
    Mismatch {
        field: &'static str,
        left: String,
        right: String,
    },

    /// The link inspector could not run or produced no usable report.
    #[error("link inspection failed for {}: {reason}", path.display())]
    LinkInspection { path: PathBuf, reason: String },

    /// The link inspector reported `<soname> => not found`.
    #[error("shared library '{soname}' could not be resolved by the dynamic linker")]
    UnresolvedLibrary { soname: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// An external tool exited unsuccessfully.
    #[error("'{program}' failed: {message}")]
    Tool { program: String, message: String },

    #[error("'{program}' timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("manifest serialization failed: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl Error {
    /// Build an [`Error::Io`] with a human readable context line.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Errors that must abort the run no matter which package they concern.
    ///
    /// A mismatch means the index handed back releases that cannot be
    /// ordered against each other, so no selection is trustworthy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Mismatch { .. })
    }

    /// True for the "index has nothing for this query" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}

/// Attach a context line to `std::io::Result` values.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::io(f(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_is_fatal() {
        let err = Error::Mismatch {
            field: "arch",
            left: "x86_64".into(),
            right: "aarch64".into(),
        };
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "mismatched package arch: x86_64 != aarch64");
    }

    #[test]
    fn test_not_found_is_not_fatal() {
        let err = Error::NotFound {
            query: "/usr/lib64/libfoo.so.2".into(),
        };
        assert!(!err.is_fatal());
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_context_wraps_source() {
        let res: std::io::Result<()> = Err(std::io::Error::from(std::io::ErrorKind::NotFound));
        let err = res.io_context(|| "reading /nope").unwrap_err();
        assert!(err.to_string().starts_with("reading /nope: "));
    }
}
