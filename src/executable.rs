//! Executable discovery in an unpacked package tree.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// A regular file with at least one execute bit set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    /// File basename.
    pub name: String,
    /// Absolute (or root-joined) path on disk.
    pub path: PathBuf,
    /// Path relative to the tree root, e.g. `usr/sbin/exampled`.
    pub relative: PathBuf,
    /// Package that owns the tree, if known.
    pub package: Option<String>,
}

impl Executable {
    /// Path as it appears inside the image, e.g. `/usr/sbin/exampled`.
    pub fn image_path(&self) -> PathBuf {
        Path::new("/").join(&self.relative)
    }
}

/// Two executables that share a basename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub name: String,
    pub kept: PathBuf,
    pub replaced: PathBuf,
}

/// Executables keyed by basename.
///
/// The walk visits entries in file-name order, so which path wins a
/// basename collision is deterministic: the later one. Every collision is
/// recorded.
#[derive(Debug, Clone, Default)]
pub struct ExecutableSet {
    pub by_name: BTreeMap<String, Executable>,
    pub collisions: Vec<Collision>,
}

impl ExecutableSet {
    pub fn get(&self, name: &str) -> Option<&Executable> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Executable> {
        self.by_name.values()
    }

    fn insert(&mut self, exe: Executable) {
        if let Some(previous) = self.by_name.insert(exe.name.clone(), exe.clone()) {
            warn!(
                "executable name '{}' found twice: {} replaces {}",
                exe.name,
                exe.relative.display(),
                previous.relative.display()
            );
            self.collisions.push(Collision {
                name: exe.name,
                kept: exe.relative,
                replaced: previous.relative,
            });
        }
    }
}

/// Find every executable regular file under `root`.
///
/// Symlinks are never reported and never followed: a link to an executable
/// is found again when the walk reaches its target.
pub fn find_executables(root: &Path, package: Option<&str>) -> Result<ExecutableSet> {
    if !root.is_dir() {
        return Err(Error::Missing {
            what: format!("unpacked tree {}", root.display()),
        });
    }

    let mut set = ExecutableSet::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading entry under {}: {}", root.display(), e);
                continue;
            }
        };

        // file_type() comes from lstat when not following links
        if !entry.file_type().is_file() {
            continue;
        }
        let mode = match entry.metadata() {
            Ok(meta) => meta.permissions().mode(),
            Err(e) => {
                warn!("Cannot stat {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if mode & 0o111 == 0 {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry.path().to_path_buf());

        set.insert(Executable {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_path_buf(),
            relative,
            package: package.map(str::to_string),
        });
    }

    Ok(set)
}
