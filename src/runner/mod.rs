//! Task execution engine
//!
//! This module handles running execution plans: the command runner
//! boundary, per-step contexts, task actions, and outcome reporting.

pub mod action;
pub mod command;
pub mod context;
pub mod executor;
pub mod report;
pub mod script;
pub mod when;

// Re-export main types
pub use action::*;
pub use command::*;
pub use context::*;
pub use executor::*;
pub use report::*;
pub use script::*;
pub use when::*;
