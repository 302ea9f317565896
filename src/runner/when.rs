//! When condition evaluation
//!
//! Conditions gate individual script steps. A list of conditions is combined
//! with AND logic.

use crate::config;
use crate::error::ExecutionResult;
use crate::runner::Context;

/// A condition guarding a script step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Shell condition evaluated on the host
    Test(String),

    /// Shell condition evaluated on this machine
    LocalTest(String),

    Equal { left: String, right: String },
    NotEqual { left: String, right: String },

    /// Configuration key is set for the host
    ConfigSet(String),

    /// Configuration key is not set for the host
    ConfigNotSet(String),

    Always,
}

impl Condition {
    pub fn from_config(config: config::WhenEntry) -> Self {
        if let Some(cmd) = config.test {
            Condition::Test(cmd)
        } else if let Some(cmd) = config.local_test {
            Condition::LocalTest(cmd)
        } else if let Some(eq) = config.equal {
            Condition::Equal {
                left: eq.left,
                right: eq.right,
            }
        } else if let Some(ne) = config.not_equal {
            Condition::NotEqual {
                left: ne.left,
                right: ne.right,
            }
        } else if let Some(key) = config.config_set {
            Condition::ConfigSet(key)
        } else if let Some(key) = config.config_not_set {
            Condition::ConfigNotSet(key)
        } else {
            Condition::Always
        }
    }
}

/// Evaluate a list of conditions (all must be true - AND logic)
pub async fn evaluate_when_list(conditions: &[Condition], ctx: &Context) -> ExecutionResult<bool> {
    for condition in conditions {
        if !evaluate_when(condition, ctx).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluate a single condition
pub async fn evaluate_when(condition: &Condition, ctx: &Context) -> ExecutionResult<bool> {
    match condition {
        Condition::Always => Ok(true),

        Condition::Test(cmd) => ctx.test(cmd).await,

        Condition::LocalTest(cmd) => ctx.test_locally(cmd).await,

        Condition::Equal { left, right } => Ok(ctx.parse(left)? == ctx.parse(right)?),

        Condition::NotEqual { left, right } => Ok(ctx.parse(left)? != ctx.parse(right)?),

        Condition::ConfigSet(key) => Ok(ctx.has(key)),

        Condition::ConfigNotSet(key) => Ok(!ctx.has(key)),
    }
}
