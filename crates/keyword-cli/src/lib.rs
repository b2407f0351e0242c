//! Keyword planner CLI library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (next, record, report, update, related, status)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{build_deps, execute, init_logging, load_settings, run, run_command};
