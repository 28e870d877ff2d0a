//! Shared-library closure of an executable, mapped to providing packages.
//!
//! One level deep: the executable's direct report from the link inspector,
//! not the libraries' own dependencies. Per-library failures are recorded
//! as [`ResolutionGap`]s; only fatal errors abort.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::executable::Executable;
use crate::ldd::{self, Library, LinkInspector};
use crate::package::{PackageResolver, ResolvedPackage};

/// Where in the pipeline a library was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GapStage {
    Inspect,
    Resolve,
    Fetch,
    Unpack,
    Place,
}

impl fmt::Display for GapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inspect => "inspect",
            Self::Resolve => "resolve",
            Self::Fetch => "fetch",
            Self::Unpack => "unpack",
            Self::Place => "place",
        };
        f.write_str(s)
    }
}

/// A library the image will be missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionGap {
    /// Soname or path of the library.
    pub library: String,
    pub stage: GapStage,
    pub reason: String,
}

impl ResolutionGap {
    pub fn new(library: impl Into<String>, stage: GapStage, err: &Error) -> Self {
        Self {
            library: library.into(),
            stage,
            reason: err.to_string(),
        }
    }
}

/// A library together with the package that provides it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibrary {
    pub library: Library,
    pub package: ResolvedPackage,
}

impl ResolvedLibrary {
    /// Path the library has inside the image.
    ///
    /// Taken from the providing release's metadata rather than the link
    /// inspector, which may report a different prefix.
    pub fn image_path(&self) -> PathBuf {
        self.package
            .selected()
            .filename
            .clone()
            .unwrap_or_else(|| self.library.path.clone())
    }
}

/// Result of resolving an executable's libraries.
#[derive(Debug, Clone, Default)]
pub struct DependencySet {
    pub libraries: Vec<ResolvedLibrary>,
    pub gaps: Vec<ResolutionGap>,
}

impl DependencySet {
    /// Distinct providing package names, sorted.
    pub fn package_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.libraries.iter().map(|l| l.package.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Find the libraries `executable` needs and the packages that provide them.
///
/// A failure to run the inspector at all is returned as an error: without a
/// report there is no closure to speak of. Unresolved (`not found`) and
/// unrecognised report lines become gaps.
pub fn resolve_dependencies(
    resolver: &mut PackageResolver,
    inspector: &dyn LinkInspector,
    executable: &Executable,
) -> Result<DependencySet> {
    let path = if executable.path.is_absolute() {
        executable.path.clone()
    } else {
        std::env::current_dir()
            .map_err(|e| Error::io("reading current directory", e))?
            .join(&executable.path)
    };
    let report = ldd::libraries(inspector, &path)?;

    let mut set = DependencySet::default();
    for (soname, err) in report.unresolved.iter().zip(report.unresolved_errors()) {
        warn!("{}", err);
        set.gaps.push(ResolutionGap::new(soname.clone(), GapStage::Inspect, &err));
    }
    for line in &report.unrecognized {
        let err = Error::LinkInspection {
            path: path.clone(),
            reason: format!("unrecognised report line '{}'", line),
        };
        warn!("{}", err);
        set.gaps.push(ResolutionGap::new(line.clone(), GapStage::Inspect, &err));
    }

    for library in report.libraries {
        match resolver.resolve_library(&library.path) {
            Ok(package) => {
                info!(
                    "{} <- {}",
                    library.path.display(),
                    package.selected().release
                );
                set.libraries.push(ResolvedLibrary { library, package });
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("{}: {}", library.path.display(), e);
                set.gaps.push(ResolutionGap::new(
                    library.path.display().to_string(),
                    GapStage::Resolve,
                    &e,
                ));
            }
        }
    }

    Ok(set)
}
