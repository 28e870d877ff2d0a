//! Shared utilities across minimize modules.

pub mod paths;

pub use paths::{copy_entry, ensure_parent_exists, entry_exists, image_relative, normalize};
