//! Task graph
//!
//! The task registry, the hook graph and the planner that turns a requested
//! task into a host-bound execution plan.

pub mod hooks;
pub mod planner;
pub mod registry;

// Re-export main types
pub use hooks::*;
pub use planner::*;
pub use registry::*;
