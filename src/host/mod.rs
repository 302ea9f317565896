//! Deployment targets and their configuration
//!
//! This module holds the host model, host selectors, the layered
//! configuration store and `{{key}}` interpolation.

pub mod interpolate;
pub mod inventory;
pub mod store;

// Re-export main types
pub use interpolate::*;
pub use inventory::*;
pub use store::*;
