//! minimize: build a minimal image tree for a single daemon binary.
//!
//! The pipeline resolves a daemon package through the package index,
//! downloads and unpacks it, asks the dynamic linker which shared
//! libraries the daemon needs, maps each library back to its package,
//! and assembles an image tree plus a JSON manifest of what went in.

pub mod common;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod executable;
pub mod extract;
pub mod fetch;
pub mod index;
pub mod ldd;
pub mod manifest;
pub mod model;
pub mod package;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod release;
pub mod timing;

pub use error::{Error, Result};
