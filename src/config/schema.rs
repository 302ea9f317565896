//! Recipe validation
//!
//! Structural checks that can be made on a single recipe file. References
//! between tasks are not checked here since they may point into other
//! recipes; the planner resolves them.

use crate::config::types::{HookEntry, RecipeConfig, ScriptEntry, TaskEntry, WhenEntry};
use crate::error::{ConfigError, ConfigResult};

/// Validate a complete recipe
pub fn validate_recipe(config: &RecipeConfig) -> ConfigResult<()> {
    for (name, task) in &config.tasks {
        validate_task(name, task)?;
    }

    for (alias, host) in &config.hosts {
        validate_name("host", alias)?;
        if host.port == Some(0) {
            return Err(ConfigError::Invalid(format!("host '{}' has port 0", alias)));
        }
    }

    for (index, hook) in config.hooks.iter().enumerate() {
        validate_hook(index, hook)?;
    }

    if let Some(interpreter) = &config.interpreter {
        if interpreter.is_empty() {
            return Err(ConfigError::Invalid("interpreter must not be empty".to_string()));
        }
    }

    Ok(())
}

/// Validate a single task
pub fn validate_task(name: &str, task: &TaskEntry) -> ConfigResult<()> {
    validate_name("task", name)?;

    if task.group.is_some() && !task.script.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "task '{}' cannot have both a group and a script",
            name
        )));
    }

    if let Some(members) = &task.group {
        for member in members {
            if member == name {
                return Err(ConfigError::CyclicDependency(format!("{} -> {}", name, name)));
            }
        }
    }

    for entry in &task.script {
        if let ScriptEntry::Step(step) = entry {
            for when in &step.when {
                validate_when(name, when)?;
            }
        }
    }

    Ok(())
}

fn validate_name(kind: &str, name: &str) -> ConfigResult<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!(
            "invalid {} name '{}': names must be non-empty without whitespace",
            kind, name
        )));
    }
    Ok(())
}

/// A hook needs exactly one trigger and at least one task to run
fn validate_hook(index: usize, hook: &HookEntry) -> ConfigResult<()> {
    let triggers = [&hook.before, &hook.after, &hook.fail]
        .iter()
        .filter(|t| t.is_some())
        .count();
    if triggers != 1 {
        return Err(ConfigError::Invalid(format!(
            "hook #{} must have exactly one of before, after, fail",
            index + 1
        )));
    }
    if hook.run.is_empty() {
        return Err(ConfigError::Invalid(format!("hook #{} has nothing to run", index + 1)));
    }
    Ok(())
}

/// A when entry needs exactly one condition
fn validate_when(task: &str, when: &WhenEntry) -> ConfigResult<()> {
    let conditions = [
        when.test.is_some(),
        when.local_test.is_some(),
        when.equal.is_some(),
        when.not_equal.is_some(),
        when.config_set.is_some(),
        when.config_not_set.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();

    if conditions != 1 {
        return Err(ConfigError::Invalid(format!(
            "condition in task '{}' must have exactly one check, found {}",
            task, conditions
        )));
    }
    Ok(())
}
