//! The image composition manifest.
//!
//! ```json
//! {
//!   "name": "exampled",
//!   "path": "/usr/sbin/exampled",
//!   "package": "example-server",
//!   "libraries": [
//!     { "path": "/usr/lib64/libfoo.so.2", "package": "libfoo", "version": "2.3.1-4" }
//!   ]
//! }
//! ```
//!
//! The four top-level fields and the three library fields are the stable
//! contract. `unresolved` is only written when something is missing.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dependencies::{DependencySet, GapStage, ResolutionGap};
use crate::error::{IoContext, Result};
use crate::executable::Executable;
use crate::model::{LibraryState, ModelReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub path: String,
    pub package: String,
    pub libraries: Vec<ManifestLibrary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<ManifestGap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestLibrary {
    pub path: String,
    pub package: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestGap {
    pub library: String,
    pub stage: String,
    pub reason: String,
}

impl From<&ResolutionGap> for ManifestGap {
    fn from(gap: &ResolutionGap) -> Self {
        Self {
            library: gap.library.clone(),
            stage: gap.stage.to_string(),
            reason: gap.reason.clone(),
        }
    }
}

impl Manifest {
    /// Describe the resolved composition of an executable's image.
    ///
    /// When a [`ModelReport`] is given, only libraries that were actually
    /// placed are listed and placement failures join the gaps.
    pub fn build(
        executable: &Executable,
        package: &str,
        deps: &DependencySet,
        model: Option<&ModelReport>,
    ) -> Self {
        let mut libraries = Vec::new();
        let mut unresolved: Vec<ManifestGap> = deps.gaps.iter().map(ManifestGap::from).collect();

        match model {
            Some(report) => {
                for outcome in &report.libraries {
                    match &outcome.state {
                        LibraryState::Placed { path } => libraries.push(ManifestLibrary {
                            path: path.display().to_string(),
                            package: outcome.library.package.name.clone(),
                            version: outcome.library.package.version(),
                        }),
                        LibraryState::Failed(gap) => unresolved.push(gap.into()),
                        _ => unresolved.push(ManifestGap {
                            library: outcome.library.image_path().display().to_string(),
                            stage: GapStage::Place.to_string(),
                            reason: "placement did not complete".to_string(),
                        }),
                    }
                }
            }
            None => {
                for lib in &deps.libraries {
                    libraries.push(ManifestLibrary {
                        path: lib.image_path().display().to_string(),
                        package: lib.package.name.clone(),
                        version: lib.package.version(),
                    });
                }
            }
        }

        Self {
            name: executable.name.clone(),
            path: executable.image_path().display().to_string(),
            package: package.to_string(),
            libraries,
            unresolved,
        }
    }

    /// Sorted, distinct names of the packages the image draws libraries from.
    pub fn packages(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.libraries.iter().map(|l| l.package.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the manifest to `dest`, or to stdout when `dest` is `-`.
    pub fn write(&self, dest: &Path) -> Result<()> {
        let json = self.to_json()?;
        if dest == Path::new("-") {
            let mut out = std::io::stdout().lock();
            writeln!(out, "{}", json).io_context(|| "writing manifest to stdout")?;
            return Ok(());
        }
        crate::common::ensure_parent_exists(dest)?;
        fs::write(dest, json + "\n").io_context(|| format!("writing {}", dest.display()))
    }
}
