//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Run the pipeline for a daemon package
//! - `compare` - Order two release names
//! - `executables` - List executables of an unpacked package
//! - `show` - Display information
//! - `preflight` - Run preflight checks

pub mod build;
mod compare;
mod executables;
mod preflight;
pub mod show;

pub use build::cmd_build;
pub use compare::cmd_compare;
pub use executables::cmd_executables;
pub use preflight::cmd_preflight;
pub use show::cmd_show;
