//! Core recipe file types
//!
//! This module defines the data structures that represent a deploy.yml recipe.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Top-level recipe structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeConfig {
    /// Project name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Recipes applied before this one (paths or globs, relative to this file)
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_one_or_many"
    )]
    pub import: Vec<String>,

    /// Global configuration values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,

    /// `.env` file exported to every command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dotenv: Option<String>,

    /// Deployment targets keyed by alias
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, HostEntry>,

    /// Tasks keyed by name
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskEntry>,

    /// Hook edges, applied in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<HookEntry>,

    /// Shell used for local commands (e.g., ["sh", "-c"])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Vec<String>>,
}

/// A host definition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HostEntry {
    /// Address to connect to (defaults to the alias)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// SSH user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_user: Option<String>,

    /// SSH port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Run commands on this machine instead of over SSH
    #[serde(default)]
    pub local: bool,

    /// Labels used by host selectors
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Host-level configuration values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
}

/// A task definition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskEntry {
    /// Description shown by `dep list`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,

    /// Run once for the whole deployment
    #[serde(default)]
    pub once: bool,

    /// Skip this task's own before/after hooks
    #[serde(default)]
    pub shallow: bool,

    /// Hidden from listings
    #[serde(default)]
    pub hidden: bool,

    /// Hidden from listings
    #[serde(default)]
    pub private: bool,

    /// Member tasks, making this a group
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_group"
    )]
    pub group: Option<Vec<String>>,

    /// Steps executed on each host
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_script"
    )]
    pub script: Vec<ScriptEntry>,
}

/// A script item - either a bare command or a detailed step
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ScriptEntry {
    /// Simple string, run on the host
    Simple(String),

    /// Step with conditions and a single instruction
    Step(ScriptStep),
}

/// A detailed script step
///
/// Exactly one of `run`, `local`, `cd`, `set` or `echo` must be given.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptStep {
    /// Conditions that must all hold for the step to run
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_one_or_many"
    )]
    pub when: Vec<WhenEntry>,

    /// Command run on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    /// Command run on this machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,

    /// Working directory for later `run` steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cd: Option<String>,

    /// Configuration values set on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<BTreeMap<String, Value>>,

    /// Message printed with the host prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,

    /// Stream command output instead of capturing it
    #[serde(default)]
    pub stream: bool,
}

/// A conditional expression
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhenEntry {
    /// Shell condition evaluated on the host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,

    /// Shell condition evaluated on this machine
    #[serde(rename = "local-test", skip_serializing_if = "Option::is_none")]
    pub local_test: Option<String>,

    /// Check if values are equal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equal: Option<WhenComparison>,

    /// Check if values are not equal
    #[serde(rename = "not-equal", skip_serializing_if = "Option::is_none")]
    pub not_equal: Option<WhenComparison>,

    /// Check if a configuration key is set
    #[serde(rename = "config-set", skip_serializing_if = "Option::is_none")]
    pub config_set: Option<String>,

    /// Check if a configuration key is not set
    #[serde(rename = "config-not-set", skip_serializing_if = "Option::is_none")]
    pub config_not_set: Option<String>,
}

/// A comparison for when conditions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhenComparison {
    /// Left-hand side of comparison
    pub left: String,

    /// Right-hand side of comparison
    pub right: String,
}

/// A hook definition
///
/// Exactly one of `before`, `after` or `fail` names the trigger.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HookEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,

    /// Hooked task names
    #[serde(deserialize_with = "deserialize_one_or_many")]
    pub run: Vec<String>,
}

/// Deserialize a single value or a list of values into a Vec
fn deserialize_one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: DeserializeOwned,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| serde_yaml::from_value(item).map_err(D::Error::custom))
            .collect(),
        // Null or empty
        Value::Null => Ok(Vec::new()),
        other => {
            let item = serde_yaml::from_value(other).map_err(D::Error::custom)?;
            Ok(vec![item])
        }
    }
}

/// Custom deserializer for groups; an explicit empty group stays `Some`
fn deserialize_group<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_one_or_many(deserializer).map(Some)
}

/// Custom deserializer for scripts that accepts a single command string
fn deserialize_script<'de, D>(deserializer: D) -> Result<Vec<ScriptEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;

    match value {
        // Multi-line string: one command per non-empty line
        Value::String(s) => Ok(s
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| ScriptEntry::Simple(line.to_string()))
            .collect()),
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| ScriptEntry::deserialize(item).map_err(D::Error::custom))
            .collect(),
        Value::Mapping(_) => {
            let entry = ScriptEntry::deserialize(value).map_err(D::Error::custom)?;
            Ok(vec![entry])
        }
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("script must be a string, step, or list")),
    }
}
