//! Command execution
//!
//! The [`CommandRunner`] trait is the boundary between the task graph and
//! whatever actually executes shell commands. [`ProcessRunner`] runs them
//! through the local shell, or through the system `ssh` client for remote
//! hosts.

use crate::error::{ExecutionError, ExecutionResult};
use crate::host::Host;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command as ProcessCommand;

/// Where a command runs
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// On the machine running `dep`
    Local,

    /// On a deployment target
    Remote(Arc<Host>),
}

impl Location {
    /// Whether the command ends up on this machine
    pub fn is_local(&self) -> bool {
        match self {
            Location::Local => true,
            Location::Remote(host) => host.local,
        }
    }
}

/// Per-command options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Directory to `cd` into before running
    pub cwd: Option<String>,

    /// Extra environment variables
    pub env: BTreeMap<String, String>,

    /// Stream output to the terminal instead of capturing it
    pub real_time_output: bool,

    /// Print instead of executing
    pub dry_run: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_real_time_output(mut self, enabled: bool) -> Self {
        self.real_time_output = enabled;
        self
    }

    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }
}

/// Captured result of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Stdout without the trailing newline
    pub fn text(&self) -> &str {
        self.stdout.trim_end_matches(['\n', '\r'])
    }
}

/// Executes shell commands on a location
///
/// A non-zero exit status is reported as [`ExecutionError::CommandFailed`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(
        &self,
        location: &Location,
        command: &str,
        options: &RunOptions,
    ) -> ExecutionResult<CommandOutput>;
}

/// Runs commands as child processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Shell used for local commands (e.g. `["sh", "-c"]`)
    interpreter: Vec<String>,

    /// SSH client and its fixed arguments
    ssh: Vec<String>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        ProcessRunner {
            interpreter: vec!["sh".to_string(), "-c".to_string()],
            ssh: vec![
                "ssh".to_string(),
                "-o".to_string(),
                "BatchMode=yes".to_string(),
            ],
        }
    }

    /// Use a different local shell
    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        if !interpreter.is_empty() {
            self.interpreter = interpreter;
        }
        self
    }

    /// Use a different SSH client invocation
    pub fn with_ssh(mut self, ssh: Vec<String>) -> Self {
        if !ssh.is_empty() {
            self.ssh = ssh;
        }
        self
    }

    fn local_command(&self, command: &str, options: &RunOptions) -> ProcessCommand {
        let mut process = ProcessCommand::new(&self.interpreter[0]);
        process.args(&self.interpreter[1..]);
        process.arg(with_cwd(command, options.cwd.as_deref()));
        process.envs(&options.env);
        process
    }

    fn remote_command(&self, host: &Host, command: &str, options: &RunOptions) -> ProcessCommand {
        let mut script = String::new();
        for (key, value) in &options.env {
            script.push_str(&format!("export {}={}; ", key, shell_quote(value)));
        }
        script.push_str(&with_cwd(command, options.cwd.as_deref()));

        let mut process = ProcessCommand::new(&self.ssh[0]);
        process.args(&self.ssh[1..]);
        if let Some(port) = host.port {
            process.arg("-p").arg(port.to_string());
        }
        process.arg(host.connection_string());
        process.arg(script);
        process
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(
        &self,
        location: &Location,
        command: &str,
        options: &RunOptions,
    ) -> ExecutionResult<CommandOutput> {
        if options.dry_run {
            return Ok(CommandOutput::default());
        }

        let mut process = match location {
            Location::Remote(host) if !host.local => self.remote_command(host, command, options),
            _ => self.local_command(command, options),
        };
        process.stdin(Stdio::null()).kill_on_drop(true);

        let spawn_error = |e: std::io::Error| ExecutionError::Spawn {
            command: command.to_string(),
            message: e.to_string(),
        };

        let output = if options.real_time_output {
            let status = process
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(spawn_error)?;
            CommandOutput {
                exit_code: status.code(),
                ..CommandOutput::default()
            }
        } else {
            let output = process.output().await.map_err(spawn_error)?;
            CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
            }
        };

        if output.exit_code != Some(0) {
            let combined = if output.stderr.trim().is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            return Err(ExecutionError::CommandFailed {
                command: command.to_string(),
                exit_code: output.exit_code,
                output: combined,
            });
        }

        Ok(output)
    }
}

/// Prefix a command with `cd <dir> &&`
///
/// The directory is left unquoted so that `~` still expands.
fn with_cwd(command: &str, cwd: Option<&str>) -> String {
    match cwd {
        Some(dir) => format!("cd {} && ({})", dir, command),
        None => command.to_string(),
    }
}

/// Quote a string for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
