//! Crate entry point for **gitfleet**.
//!
//! The library has two layers:
//! - [`bulk`]: the engine that runs one git operation across many
//!   repositories with bounded concurrency, per-task timeouts, abort and
//!   progress reporting.
//! - [`git`]: the backend seam the engine calls into, with a `git2`
//!   implementation.
//!
//! The remaining modules back the `gitfleet` CLI (config parsing, target
//! selection, terminal output). The `pub use` re-exports make the commands
//! accessible directly from the crate root.

pub mod bulk;
pub mod git;

mod check;
mod config;
mod list;
mod paths;
mod run;

pub use check::cmd_check;
pub use config::{BulkSettings, Config, Repository, load_config};
pub use list::cmd_list;
pub use paths::gitfleet_home;
pub use run::{RunSettings, cmd_run};
