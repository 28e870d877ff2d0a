//! Package index queries.
//!
//! The index answers two questions: which releases provide a file or name,
//! and where the artifact for a package (and its install-time
//! dependencies) can be downloaded. [`DnfIndex`] asks `dnf`; tests use an
//! in-memory implementation of [`PackageIndex`].

use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::process::Cmd;

/// One record from a "who provides this" query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRecord {
    /// Full release name, e.g. `libfoo-2.3.1-4.el9.aarch64`.
    pub full_name: String,
    pub summary: String,
    pub repo: String,
    /// The file path the package registers for the query, if reported.
    pub filename: Option<String>,
}

/// A downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRef {
    pub url: String,
    /// Last path segment of `url`, e.g. `libfoo-2.3.1-4.el9.aarch64.rpm`.
    pub filename: String,
}

impl DownloadRef {
    /// Build a reference from a URL, taking the filename from its last segment.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.trim();
        if !url.contains("://") {
            return None;
        }
        let filename = url.rsplit('/').next().filter(|s| !s.is_empty())?;
        Some(Self {
            url: url.to_string(),
            filename: filename.to_string(),
        })
    }
}

/// Queryable catalog mapping files and names to releases and downloads.
pub trait PackageIndex {
    /// Every release that provides `query` (a file path or package name).
    ///
    /// Returns [`Error::NotFound`] when nothing matches.
    fn providers_of(&self, query: &str) -> Result<Vec<ProviderRecord>>;

    /// Direct download location for one package.
    fn download_url(&self, query: &str) -> Result<DownloadRef>;

    /// Download locations for a package and all of its install-time dependencies.
    fn download_urls_with_deps(&self, query: &str) -> Result<Vec<DownloadRef>>;
}

/// [`PackageIndex`] backed by the `dnf` command.
#[derive(Debug, Clone)]
pub struct DnfIndex {
    program: String,
    url_protocol: String,
    timeout: Option<Duration>,
}

impl DnfIndex {
    pub fn new(url_protocol: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: "dnf".to_string(),
            url_protocol: url_protocol.into(),
            timeout,
        }
    }

    fn cmd(&self) -> Cmd {
        let cmd = Cmd::new(&self.program);
        match self.timeout {
            Some(t) => cmd.timeout(t),
            None => cmd,
        }
    }

    fn list_urls(&self, query: &str, resolve: bool) -> Result<Vec<DownloadRef>> {
        let mut cmd = self.cmd().args(["--quiet", "download"]);
        if resolve {
            cmd = cmd.arg("--resolve");
        }
        let result = cmd
            .args(["--url", "--urlprotocol", &self.url_protocol])
            .arg(query)
            .error_msg(format!("dnf download --url {}", query))
            .run()?;

        let refs = parse_url_listing(&result.stdout);
        if refs.is_empty() {
            return Err(Error::NotFound {
                query: query.to_string(),
            });
        }
        Ok(refs)
    }
}

impl PackageIndex for DnfIndex {
    fn providers_of(&self, query: &str) -> Result<Vec<ProviderRecord>> {
        debug!(query, "dnf provides");
        let result = self
            .cmd()
            .args(["--quiet", "provides", query])
            .allow_fail()
            .run()?;

        // dnf exits 1 with "No matches found" on stderr
        let records = parse_provides_output(&result.stdout);
        if records.is_empty() {
            if result.success() || result.stderr.contains("No match") {
                return Err(Error::NotFound {
                    query: query.to_string(),
                });
            }
            return Err(Error::Tool {
                program: self.program.clone(),
                message: result.stderr_trimmed().to_string(),
            });
        }
        Ok(records)
    }

    fn download_url(&self, query: &str) -> Result<DownloadRef> {
        let mut refs = self.list_urls(query, false)?;
        Ok(refs.swap_remove(0))
    }

    fn download_urls_with_deps(&self, query: &str) -> Result<Vec<DownloadRef>> {
        self.list_urls(query, true)
    }
}

/// Parse `dnf provides` output.
///
/// Records are separated by blank lines:
///
/// ```text
/// libfoo-2.3.1-4.el9.aarch64 : Foo runtime library
/// Repo         : baseos
/// Matched from:
/// Filename     : /usr/lib64/libfoo.so.2
/// ```
pub fn parse_provides_output(output: &str) -> Vec<ProviderRecord> {
    let mut records = Vec::new();
    let mut current: Option<ProviderRecord> = None;

    for line in output.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            records.extend(current.take());
            continue;
        }

        let (key, value) = match line.split_once(" : ") {
            Some((k, v)) => (k.trim(), v.trim()),
            None => match line.trim().strip_suffix(':') {
                Some(k) => (k.trim(), ""),
                // continuation of a wrapped value
                None => continue,
            },
        };

        let Some(record) = current.as_mut() else {
            current = Some(ProviderRecord {
                full_name: key.to_string(),
                summary: value.to_string(),
                repo: String::new(),
                filename: None,
            });
            continue;
        };

        match key.to_ascii_lowercase().as_str() {
            "repo" => record.repo = value.to_string(),
            "filename" => record.filename = Some(value.to_string()),
            "matched from" | "provide" | "other" => {}
            _ => {
                // a header line without the separating blank line
                records.extend(current.take());
                current = Some(ProviderRecord {
                    full_name: key.to_string(),
                    summary: value.to_string(),
                    repo: String::new(),
                    filename: None,
                });
            }
        }
    }
    records.extend(current);
    records
}

/// Parse `dnf download --url` output, one URL per line.
pub fn parse_url_listing(output: &str) -> Vec<DownloadRef> {
    output.lines().filter_map(DownloadRef::from_url).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDES: &str = "\
libfoo-2.3.1-3.el9.aarch64 : Foo runtime library
Repo         : baseos
Matched from:
Filename     : /usr/lib64/libfoo.so.2

libfoo-2.3.1-4.el9.aarch64 : Foo runtime library
Repo         : @System
Matched from:
Filename     : /usr/lib64/libfoo.so.2

";

    #[test]
    fn test_parse_provides_records() {
        let records = parse_provides_output(PROVIDES);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].full_name, "libfoo-2.3.1-3.el9.aarch64");
        assert_eq!(records[0].summary, "Foo runtime library");
        assert_eq!(records[0].repo, "baseos");
        assert_eq!(records[1].repo, "@System");
        assert_eq!(records[1].filename.as_deref(), Some("/usr/lib64/libfoo.so.2"));
    }

    #[test]
    fn test_parse_provides_epoch_and_provide_line() {
        let out = "openssl-libs-1:3.0.7-27.el9.x86_64 : A general purpose cryptography library\n\
                   Repo        : baseos\n\
                   Matched from:\n\
                   Provide    : libcrypto.so.3()(64bit)\n";
        let records = parse_provides_output(out);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].full_name, "openssl-libs-1:3.0.7-27.el9.x86_64");
        assert_eq!(records[0].filename, None);
    }

    #[test]
    fn test_parse_provides_without_blank_separator() {
        let out = "a-1.0-1.el9.x86_64 : A\nRepo : r\nb-1.0-1.el9.x86_64 : B\nRepo : r\n";
        let names: Vec<_> = parse_provides_output(out)
            .into_iter()
            .map(|r| r.full_name)
            .collect();
        assert_eq!(names, ["a-1.0-1.el9.x86_64", "b-1.0-1.el9.x86_64"]);
    }

    #[test]
    fn test_parse_provides_empty() {
        assert!(parse_provides_output("").is_empty());
        assert!(parse_provides_output("\n\n").is_empty());
    }

    #[test]
    fn test_parse_url_listing() {
        let out = "Last metadata expiration check: 0:01:02 ago.\n\
                   https://mirror.example/baseos/Packages/l/libfoo-2.3.1-4.el9.aarch64.rpm\n\
                   https://mirror.example/baseos/Packages/g/glibc-2.34-100.el9.aarch64.rpm\n";
        let refs = parse_url_listing(out);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].filename, "libfoo-2.3.1-4.el9.aarch64.rpm");
        assert_eq!(refs[1].filename, "glibc-2.34-100.el9.aarch64.rpm");
    }

    #[test]
    fn test_download_ref_rejects_non_urls() {
        assert!(DownloadRef::from_url("not a url").is_none());
        assert!(DownloadRef::from_url("https://host/dir/").is_none());
    }
}
