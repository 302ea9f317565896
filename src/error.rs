//! Error types for Deployer

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Deployer operations
pub type Result<T> = std::result::Result<T, DeployerError>;

/// Main error type for Deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    /// Recipe, registry and plan-building errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Step execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Variable interpolation errors
    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Recipe loading and plan-building errors
///
/// Everything here is raised before any step runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to find recipe file (searched: {0})")]
    NotFound(String),

    #[error("Invalid recipe: {0}")]
    Invalid(String),

    #[error("Task '{0}' is not defined")]
    TaskNotFound(String),

    #[error("Cyclic dependency detected: {0}")]
    CyclicDependency(String),

    #[error("Failed to import '{path}': {error}")]
    Import { path: PathBuf, error: String },

    #[error("Host '{0}' is not defined")]
    UnknownHost(String),

    #[error("Invalid host selector '{selector}': {error}")]
    InvalidSelector { selector: String, error: String },

    #[error("No hosts match selector '{0}'")]
    EmptySelection(String),
}

/// Step execution errors
///
/// Cloneable so that a single `once` outcome can be handed to every host
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Command `{command}` failed with exit code {exit_code:?}{}", format_output(.output))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Failed to start `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("Please configure '{0}'")]
    MissingConfig(String),

    #[error("{0}")]
    Interpolation(String),

    #[error("{0}")]
    Action(String),

    #[error("Execution cancelled")]
    Cancelled,
}

/// Variable interpolation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("Variable '{0}' is not defined")]
    UndefinedVariable(String),

    #[error("Recursive interpolation detected: {0}")]
    RecursiveInterpolation(String),
}

impl From<InterpolationError> for ExecutionError {
    fn from(err: InterpolationError) -> Self {
        match err {
            InterpolationError::UndefinedVariable(key) => ExecutionError::MissingConfig(key),
            other => ExecutionError::Interpolation(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ExecutionError>() {
            Ok(inner) => inner,
            Err(err) => ExecutionError::Action(format!("{:#}", err)),
        }
    }
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for interpolation operations
pub type InterpolationResult<T> = std::result::Result<T, InterpolationError>;

/// Whether an error was caused by cancellation rather than a failing step
pub fn is_cancelled(err: &ExecutionError) -> bool {
    matches!(err, ExecutionError::Cancelled)
}
