//! Release names: parsing and ordering.
//!
//! A release is one versioned build of a package as the package index names
//! it, e.g. `libfoo-2.3.1-4.el9.aarch64`:
//!
//! ```text
//! <name>-[<epoch>:]<major>.<minor>[.<patch>]-<build>.<distro>.<arch>
//! ```
//!
//! Releases of the same package (same name, distro and arch) are totally
//! ordered by `(epoch, major, minor, patch, build)`, all compared as
//! integers. Comparing releases that differ in name, distro or arch is an
//! error rather than a silent `false`.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Error, Result};

fn release_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<name>.+?)-(?:(?P<epoch>\d+):)?(?P<major>\d+)\.(?P<minor>\d+)(?:\.(?P<patch>\d+))?-(?P<build>\d+)\.(?P<distro>\S+)\.(?P<arch>[^.\s]+)$",
        )
        .expect("release grammar is a valid regex")
    })
}

/// A parsed release name. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Release {
    name: String,
    epoch: Option<u64>,
    major: u64,
    minor: u64,
    patch: Option<u64>,
    build: u64,
    distro: String,
    arch: String,
}

impl Release {
    /// Parse a release name, failing with [`Error::Parse`] if it does not
    /// match the grammar.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let parse_err = || Error::Parse {
            input: input.to_string(),
        };
        let caps = release_re().captures(input).ok_or_else(parse_err)?;

        let num = |key: &str| -> Result<Option<u64>> {
            caps.name(key)
                .map(|m| m.as_str().parse::<u64>().map_err(|_| parse_err()))
                .transpose()
        };

        Ok(Self {
            name: caps["name"].to_string(),
            epoch: num("epoch")?,
            major: num("major")?.ok_or_else(parse_err)?,
            minor: num("minor")?.ok_or_else(parse_err)?,
            patch: num("patch")?,
            build: num("build")?.ok_or_else(parse_err)?,
            distro: caps["distro"].to_string(),
            arch: caps["arch"].to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    /// Patch level; a missing patch orders as 0.
    pub fn patch(&self) -> Option<u64> {
        self.patch
    }

    pub fn build(&self) -> u64 {
        self.build
    }

    pub fn distro(&self) -> &str {
        &self.distro
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Version string without epoch, e.g. `2.3.1-4`.
    pub fn version(&self) -> String {
        match self.patch {
            Some(patch) => format!("{}.{}.{}-{}", self.major, self.minor, patch, self.build),
            None => format!("{}.{}-{}", self.major, self.minor, self.build),
        }
    }

    fn sort_key(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.epoch.unwrap_or(0),
            self.major,
            self.minor,
            self.patch.unwrap_or(0),
            self.build,
        )
    }

    /// Check that `other` is a release of the same package, distro and arch.
    pub fn ensure_comparable(&self, other: &Release) -> Result<()> {
        let fields = [
            ("name", &self.name, &other.name),
            ("distro", &self.distro, &other.distro),
            ("arch", &self.arch, &other.arch),
        ];
        for (field, left, right) in fields {
            if left != right {
                return Err(Error::Mismatch {
                    field,
                    left: left.clone(),
                    right: right.clone(),
                });
            }
        }
        Ok(())
    }

    /// Order two releases of the same package.
    pub fn compare(&self, other: &Release) -> Result<Ordering> {
        self.ensure_comparable(other)?;
        Ok(self.sort_key().cmp(&other.sort_key()))
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.name)?;
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}.{}.{}", self.version(), self.distro, self.arch)
    }
}

impl FromStr for Release {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Sort releases newest first.
///
/// Every pair must be comparable; the first mismatch aborts the sort.
pub fn sort_descending<T, F>(items: &mut [T], release_of: F) -> Result<()>
where
    F: Fn(&T) -> &Release,
{
    if let Some((first, rest)) = items.split_first() {
        let head = release_of(first);
        for item in rest {
            head.ensure_comparable(release_of(item))?;
        }
    }
    items.sort_by(|a, b| release_of(b).sort_key().cmp(&release_of(a).sort_key()));
    Ok(())
}
