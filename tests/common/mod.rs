//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use deployer::config::RecipeSource;
use deployer::error::{ExecutionError, ExecutionResult};
use deployer::runner::{
    CommandOutput, CommandRunner, Executor, ExecutorOptions, Location, RunOptions, Verbosity,
};
use deployer::Recipe;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Create a temporary directory with a deploy.yml file
pub fn create_test_recipe(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let recipe_path = temp_dir.path().join("deploy.yml");
    fs::write(&recipe_path, content).unwrap();
    (temp_dir, recipe_path)
}

/// Create a test recipe with a subdirectory to run from
pub fn create_test_recipe_in_subdir(content: &str) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let recipe_path = temp_dir.path().join("deploy.yml");
    let sub_dir = temp_dir.path().join("subdir");

    fs::write(&recipe_path, content).unwrap();
    fs::create_dir(&sub_dir).unwrap();

    (temp_dir, recipe_path, sub_dir)
}

/// Write an extra file next to a test recipe
pub fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Build a recipe from inline YAML
pub fn inline_recipe(yaml: &str) -> Recipe {
    Recipe::from_sources(vec![RecipeSource::inline(yaml).unwrap()]).unwrap()
}

/// Command runner that records commands instead of executing them
///
/// Commands are recorded with the alias of the host they ran on, or
/// `local` for local commands. A command containing one of the failing
/// markers fails with exit code 1.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<(String, String)>>,
    failing: Vec<String>,
    delay: Option<Duration>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.failing.push(marker.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c)
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|(_, c)| c == command).count()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn execute(
        &self,
        location: &Location,
        command: &str,
        _options: &RunOptions,
    ) -> ExecutionResult<CommandOutput> {
        let host = match location {
            Location::Local => "local".to_string(),
            Location::Remote(host) => host.alias.clone(),
        };
        self.calls.lock().unwrap().push((host, command.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.iter().any(|m| command.contains(m.as_str())) {
            return Err(ExecutionError::CommandFailed {
                command: command.to_string(),
                exit_code: Some(1),
                output: String::new(),
            });
        }
        Ok(CommandOutput::default())
    }
}

/// An executor for a recipe that records commands on the given runner
pub fn recording_executor(
    recipe: &Recipe,
    runner: &Arc<RecordingRunner>,
    options: ExecutorOptions,
) -> Executor {
    let runner: Arc<dyn CommandRunner> = runner.clone();
    recipe.executor(
        runner,
        ExecutorOptions {
            verbosity: Verbosity::Silent,
            ..options
        },
    )
}
