//! Deployer - a task graph executor for multi-host deployments
//!
//! Recipes declare tasks, groups and before/after/fail hooks. A requested
//! task is expanded into an ordered plan and run on every selected host,
//! hosts in parallel and steps per host in sequence.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod host;
pub mod recipe;
pub mod runner;

// Re-export commonly used types
pub use error::{DeployerError, Result};
pub use recipe::Recipe;

/// Current version of Deployer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
