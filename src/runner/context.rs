//! Execution context for running a task on one host
//!
//! The context is what an action sees: the host's configuration, the command
//! runner, and per-step state such as the working directory set by `cd`.

use crate::error::{ExecutionError, ExecutionResult};
use crate::host::{value_to_string, ConfigValue, Host, HostConfig};
use crate::runner::{CommandRunner, Location, RunOptions};
use colored::Colorize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    #[default]
    Normal = 2,
    Verbose = 3,
}

/// Execution context handed to actions
pub struct Context {
    /// Configuration view of the current host
    config: Arc<HostConfig>,

    /// Executes commands
    runner: Arc<dyn CommandRunner>,

    /// Environment for every command (from the recipe's dotenv file)
    env: BTreeMap<String, String>,

    /// Directory set by `cd`, applied to remote commands
    working_dir: Option<String>,

    /// Commands are printed, not executed
    dry_run: bool,

    /// Verbosity level
    verbosity: Verbosity,

    /// Name of the task being executed
    task: String,

    /// Stops the step before its next command
    cancel: CancellationToken,
}

impl Context {
    /// Create a new context with default settings
    pub fn new(config: Arc<HostConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Context {
            config,
            runner,
            env: BTreeMap::new(),
            working_dir: None,
            dry_run: false,
            verbosity: Verbosity::Normal,
            task: String::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn host(&self) -> &Host {
        self.config.host()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn task_name(&self) -> &str {
        &self.task
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    /// Get a configuration value
    pub fn get(&self, key: &str) -> ExecutionResult<Value> {
        self.config.get(key)
    }

    /// Get a configuration value as a string
    pub fn get_string(&self, key: &str) -> ExecutionResult<String> {
        self.config.get_string(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.config.has(key)
    }

    /// Set a configuration value for the current host
    pub fn set(&self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.config.set(key, value);
    }

    /// Interpolate `{{key}}` placeholders
    pub fn parse(&self, template: &str) -> ExecutionResult<String> {
        self.config.parse(template)
    }

    /// Change the working directory for subsequent remote commands
    pub fn cd(&mut self, dir: &str) -> ExecutionResult<()> {
        self.working_dir = Some(self.parse(dir)?);
        Ok(())
    }

    /// Run a command on the current host and return its trimmed stdout
    pub async fn run(&self, command: &str) -> ExecutionResult<String> {
        let location = Location::Remote(self.config.host_arc());
        self.execute(location, command, self.working_dir.clone(), false, self.dry_run)
            .await
    }

    /// Run a command on the current host, streaming its output
    pub async fn run_streaming(&self, command: &str) -> ExecutionResult<()> {
        let location = Location::Remote(self.config.host_arc());
        self.execute(location, command, self.working_dir.clone(), true, self.dry_run)
            .await
            .map(|_| ())
    }

    /// Run a command on the machine running `dep`
    pub async fn run_locally(&self, command: &str) -> ExecutionResult<String> {
        self.execute(Location::Local, command, None, false, self.dry_run)
            .await
    }

    /// Run a command locally, streaming its output
    pub async fn run_locally_streaming(&self, command: &str) -> ExecutionResult<()> {
        self.execute(Location::Local, command, None, true, self.dry_run)
            .await
            .map(|_| ())
    }

    /// Check whether a shell condition holds on the current host
    ///
    /// Probes run even in dry-run mode since later steps branch on them.
    pub async fn test(&self, condition: &str) -> ExecutionResult<bool> {
        let location = Location::Remote(self.config.host_arc());
        self.probe(location, condition, self.working_dir.clone()).await
    }

    /// Check whether a shell condition holds locally
    pub async fn test_locally(&self, condition: &str) -> ExecutionResult<bool> {
        self.probe(Location::Local, condition, None).await
    }

    async fn probe(
        &self,
        location: Location,
        condition: &str,
        cwd: Option<String>,
    ) -> ExecutionResult<bool> {
        let command = format!("if {}; then echo +true; fi", condition);
        let output = self.execute(location, &command, cwd, false, false).await?;
        Ok(output.trim() == "+true")
    }

    async fn execute(
        &self,
        location: Location,
        command: &str,
        cwd: Option<String>,
        real_time_output: bool,
        dry_run: bool,
    ) -> ExecutionResult<String> {
        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        let command = self.parse(command)?;
        let options = RunOptions {
            cwd,
            env: self.command_env()?,
            real_time_output,
            dry_run,
        };

        let verb = match location {
            Location::Local => "local",
            Location::Remote(_) => "run",
        };
        if dry_run {
            self.print_info(&format!("{} {} {}", "[dry-run]".yellow(), verb, command));
        } else {
            self.print_debug(&format!("{} {}", verb, command));
        }

        let output = self.runner.execute(&location, &command, &options).await?;
        let text = output.text().to_string();
        if !real_time_output && self.verbosity >= Verbosity::Verbose {
            for line in text.lines() {
                self.print_debug(line);
            }
        }
        Ok(text)
    }

    /// Environment for commands: recipe env plus the `env` config mapping
    fn command_env(&self) -> ExecutionResult<BTreeMap<String, String>> {
        let mut env = self.env.clone();
        if self.config.has("env") {
            match self.config.get("env")? {
                Value::Mapping(map) => {
                    for (key, value) in map {
                        env.insert(value_to_string(&key), value_to_string(&value));
                    }
                }
                Value::Null => {}
                _ => {
                    return Err(ExecutionError::Action(
                        "config 'env' must be a mapping".to_string(),
                    ))
                }
            }
        }
        Ok(env)
    }

    fn prefix(&self) -> String {
        format!("[{}]", self.host().alias).cyan().to_string()
    }

    /// Print info message
    pub fn print_info(&self, message: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{} {}", self.prefix(), message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", self.prefix(), message.red());
        }
    }

    /// Print debug message (only in verbose mode)
    pub fn print_debug(&self, message: &str) {
        if self.verbosity >= Verbosity::Verbose {
            eprintln!("{} {}", self.prefix(), message.dimmed());
        }
    }

    /// Print task start message
    pub fn print_task_start(&self, task_name: &str) {
        self.print_info(&format!("{} {}", "task".green(), task_name));
    }
}
