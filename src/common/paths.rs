//! Path helpers for moving files between the unpack cache and the image tree.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, IoContext, Result};

/// Ensure all parent directories of a file exist.
pub fn ensure_parent_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).io_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Turn an absolute in-image path (`/usr/lib64/x`) into one relative to a
/// tree root (`usr/lib64/x`).
pub fn image_relative(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect()
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// `..` never climbs above the start of the path.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(out.components().next_back(), None | Some(Component::RootDir)) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if `path` exists as anything, including a dangling symlink.
pub fn entry_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Copy one directory entry without following it.
///
/// A symlink is recreated as a symlink with the same target; a regular file
/// is copied with its permission bits. Existing destinations are left alone.
/// Returns the link target when `src` was a symlink.
pub fn copy_entry(src: &Path, dst: &Path) -> Result<Option<PathBuf>> {
    let meta = src
        .symlink_metadata()
        .io_context(|| format!("reading {}", src.display()))?;

    if meta.file_type().is_symlink() {
        let target = fs::read_link(src).io_context(|| format!("reading link {}", src.display()))?;
        if !entry_exists(dst) {
            ensure_parent_exists(dst)?;
            symlink(&target, dst).io_context(|| format!("creating link {}", dst.display()))?;
        }
        return Ok(Some(target));
    }

    if !meta.is_file() {
        return Err(Error::io(
            format!("copying {}", src.display()),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }

    if !entry_exists(dst) {
        ensure_parent_exists(dst)?;
        fs::copy(src, dst)
            .io_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
    }
    Ok(None)
}
