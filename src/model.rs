//! Image tree assembly.
//!
//! The materializer lays out a minimal root filesystem holding the daemon
//! and its libraries:
//!
//! ```text
//! model/<exe>/
//!   lib   -> usr/lib
//!   lib64 -> usr/lib64
//!   usr/lib/  usr/lib64/
//!   usr/sbin/<exe>
//! ```
//!
//! Each library moves through `Pending -> Fetched -> Unpacked -> Placed`,
//! or stops in `Failed`. A failed library does not undo or stop the others.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::common::{copy_entry, entry_exists, image_relative, normalize};
use crate::dependencies::{GapStage, ResolutionGap, ResolvedLibrary};
use crate::error::{Error, IoContext, Result};
use crate::executable::Executable;
use crate::package::{prefix_variant, PackageResolver};

/// Longest symlink chain followed when placing a library.
pub const MAX_LINK_HOPS: usize = 8;

/// Directories every image gets.
const IMAGE_DIRS: &[&str] = &["usr/lib", "usr/lib64"];

/// Top-level compatibility links: (link, target).
const IMAGE_LINKS: &[(&str, &str)] = &[("lib", "usr/lib"), ("lib64", "usr/lib64")];

/// Progress of one library through the materializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryState {
    Pending,
    Fetched,
    Unpacked,
    Placed { path: PathBuf },
    Failed(ResolutionGap),
}

#[derive(Debug, Clone)]
pub struct LibraryOutcome {
    pub library: ResolvedLibrary,
    pub state: LibraryState,
}

/// What ended up in the image.
#[derive(Debug, Clone, Default)]
pub struct ModelReport {
    pub root: PathBuf,
    /// In-image path of the daemon.
    pub executable: PathBuf,
    pub libraries: Vec<LibraryOutcome>,
}

impl ModelReport {
    pub fn placed(&self) -> impl Iterator<Item = &LibraryOutcome> {
        self.libraries
            .iter()
            .filter(|o| matches!(o.state, LibraryState::Placed { .. }))
    }

    pub fn gaps(&self) -> impl Iterator<Item = &ResolutionGap> {
        self.libraries.iter().filter_map(|o| match &o.state {
            LibraryState::Failed(gap) => Some(gap),
            _ => None,
        })
    }
}

/// Builds one image tree under `root`.
#[derive(Debug, Clone)]
pub struct Materializer {
    root: PathBuf,
    force_unpack: bool,
    fetch_dependencies: bool,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            force_unpack: false,
            fetch_dependencies: true,
        }
    }

    /// Re-extract package archives even when already unpacked.
    pub fn force_unpack(mut self, force: bool) -> Self {
        self.force_unpack = force;
        self
    }

    /// Also download each library package's install-time dependencies.
    pub fn fetch_dependencies(mut self, fetch: bool) -> Self {
        self.fetch_dependencies = fetch;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start an empty root with `usr/lib`, `usr/lib64` and the
    /// `lib`/`lib64` links.
    ///
    /// Whatever a previous run left under the root is removed, so the tree
    /// only ever holds what this run places and matches its manifest.
    pub fn init(&self) -> Result<()> {
        if entry_exists(&self.root) {
            debug!("Clearing previous image at {}", self.root.display());
            fs::remove_dir_all(&self.root)
                .io_context(|| format!("clearing {}", self.root.display()))?;
        }

        for dir in IMAGE_DIRS {
            let path = self.root.join(dir);
            fs::create_dir_all(&path).io_context(|| format!("creating {}", path.display()))?;
        }

        for (link, target) in IMAGE_LINKS {
            let link_path = self.root.join(link);
            symlink(target, &link_path)
                .io_context(|| format!("creating /{} symlink", link))?;
        }
        Ok(())
    }

    /// Copy the daemon from its unpacked package into the image at the same
    /// relative path. A symlink is copied as a link.
    pub fn place_binary(&self, unpacked_root: &Path, executable: &Executable) -> Result<PathBuf> {
        let src = unpacked_root.join(&executable.relative);
        let dst = self.root.join(&executable.relative);
        copy_entry(&src, &dst)?;
        info!("Placed {}", executable.image_path().display());
        Ok(executable.image_path())
    }

    /// Walk one library through fetch, unpack and placement.
    pub fn place_library(
        &self,
        resolver: &mut PackageResolver,
        library: &ResolvedLibrary,
    ) -> LibraryState {
        let name = library.image_path().display().to_string();
        let mut state = LibraryState::Pending;

        loop {
            state = match state {
                LibraryState::Pending => {
                    match resolver.fetch(&library.package, self.fetch_dependencies) {
                        Ok(_) => LibraryState::Fetched,
                        Err(e) => LibraryState::Failed(ResolutionGap::new(&name, GapStage::Fetch, &e)),
                    }
                }
                LibraryState::Fetched => match resolver.unpack(&library.package, self.force_unpack) {
                    Ok(_) => LibraryState::Unpacked,
                    Err(e) => LibraryState::Failed(ResolutionGap::new(&name, GapStage::Unpack, &e)),
                },
                LibraryState::Unpacked => {
                    let unpacked = resolver.layout().unpacked(&library.package.name);
                    match self.copy_library(&unpacked, &library.image_path()) {
                        Ok(path) => LibraryState::Placed { path },
                        Err(e) => LibraryState::Failed(ResolutionGap::new(&name, GapStage::Place, &e)),
                    }
                }
                done @ (LibraryState::Placed { .. } | LibraryState::Failed(_)) => return done,
            };
        }
    }

    /// Place every library, collecting outcomes. Fetch, unpack and copy
    /// failures are recorded per library.
    pub fn place_libraries(
        &self,
        resolver: &mut PackageResolver,
        libraries: &[ResolvedLibrary],
    ) -> Vec<LibraryOutcome> {
        libraries
            .iter()
            .map(|library| {
                let state = self.place_library(resolver, library);
                match &state {
                    LibraryState::Placed { path } => info!("Placed {}", path.display()),
                    LibraryState::Failed(gap) => {
                        warn!("{} not placed ({}): {}", gap.library, gap.stage, gap.reason)
                    }
                    _ => {}
                }
                LibraryOutcome {
                    library: library.clone(),
                    state,
                }
            })
            .collect()
    }

    /// Copy `image_path` from an unpacked package tree into the image,
    /// following symlinks up to [`MAX_LINK_HOPS`] so that each link's target
    /// is present too.
    pub fn copy_library(&self, unpacked_root: &Path, image_path: &Path) -> Result<PathBuf> {
        let mut relative = image_relative(image_path);
        if !entry_exists(&unpacked_root.join(&relative)) {
            // legacy /lib64 form recorded for a file shipped under /usr/lib64, or vice versa
            if let Some(alt) = prefix_variant(&Path::new("/").join(&relative)) {
                let alt = image_relative(&alt);
                if entry_exists(&unpacked_root.join(&alt)) {
                    debug!("{} found as {}", relative.display(), alt.display());
                    relative = alt;
                }
            }
        }
        let placed = Path::new("/").join(&relative);

        for _ in 0..=MAX_LINK_HOPS {
            let src = unpacked_root.join(&relative);
            let dst = self.root.join(&relative);
            let Some(target) = copy_entry(&src, &dst)? else {
                return Ok(placed);
            };

            let resolved = if target.is_absolute() {
                image_relative(&target)
            } else {
                let parent = relative.parent().unwrap_or(Path::new(""));
                normalize(&Path::new("/").join(parent).join(&target))
                    .strip_prefix("/")
                    .map(Path::to_path_buf)
                    .unwrap_or_default()
            };
            debug!("{} -> {}", relative.display(), resolved.display());

            if !entry_exists(&unpacked_root.join(&resolved)) {
                return Err(Error::Missing {
                    what: format!(
                        "link target {} of {} in {}",
                        target.display(),
                        placed.display(),
                        unpacked_root.display()
                    ),
                });
            }
            relative = resolved;
        }

        Err(Error::io(
            format!("placing {}", placed.display()),
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("more than {} symlink hops", MAX_LINK_HOPS),
            ),
        ))
    }
}
