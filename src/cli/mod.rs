//! CLI interface and argument parsing
//!
//! This module turns the loaded recipe into a clap command: every task is a
//! subcommand next to the built-in `list`, `tree`, `plan` and `completion`.

pub mod app;

// Re-export main types
pub use app::*;
