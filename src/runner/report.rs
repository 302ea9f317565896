//! Run outcome reporting
//!
//! Collects what happened on every host and decides the overall status and
//! process exit code.

use crate::error::ExecutionError;
use crate::graph::Target;
use colored::Colorize;
use std::fmt;
use std::time::Duration;

/// Final state of one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Succeeded,
    Failed,

    /// Stopped before finishing, without a failing step of its own
    Cancelled,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostStatus::Succeeded => "succeeded",
            HostStatus::Failed => "failed",
            HostStatus::Cancelled => "cancelled",
        })
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed(ExecutionError),
}

/// A step as it was executed on a host
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub task: String,
    pub target: Target,
    pub status: StepStatus,

    /// The outcome came from a `once` step another host executed
    pub shared: bool,

    /// The step ran as a `fail` handler
    pub handler: bool,

    pub duration: Duration,
}

impl StepRecord {
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

/// Everything that happened on one host
#[derive(Debug, Clone)]
pub struct HostReport {
    pub host: String,
    pub status: HostStatus,

    /// Name of the step that failed
    pub failed_step: Option<String>,

    /// Error of the failed step, or the cancellation
    pub error: Option<ExecutionError>,

    /// Steps in execution order, including fail handlers
    pub steps: Vec<StepRecord>,

    /// Errors raised by fail handlers, keyed by handler task
    pub handler_errors: Vec<(String, ExecutionError)>,

    pub duration: Duration,
}

impl HostReport {
    pub fn new(host: impl Into<String>) -> Self {
        HostReport {
            host: host.into(),
            status: HostStatus::Succeeded,
            failed_step: None,
            error: None,
            steps: Vec::new(),
            handler_errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == HostStatus::Succeeded
    }

    /// Names of the steps that ran, in order
    pub fn executed(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.task.as_str()).collect()
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,

    /// Some hosts failed, some succeeded
    PartialFailure,

    /// No host succeeded
    TotalFailure,
}

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub task: String,
    pub hosts: Vec<HostReport>,
    pub dry_run: bool,
    pub duration: Duration,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        let succeeded = self.hosts.iter().filter(|h| h.is_success()).count();
        if succeeded == self.hosts.len() {
            RunStatus::Success
        } else if succeeded == 0 {
            RunStatus::TotalFailure
        } else {
            RunStatus::PartialFailure
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Success
    }

    /// 0 when every host succeeded, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn failed_hosts(&self) -> Vec<&HostReport> {
        self.hosts.iter().filter(|h| !h.is_success()).collect()
    }

    pub fn host(&self, alias: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|h| h.host == alias)
    }

    /// Human readable summary
    pub fn render(&self) -> String {
        let mut out = String::new();

        for host in &self.hosts {
            let status = match host.status {
                HostStatus::Succeeded => host.status.to_string().green(),
                HostStatus::Failed => host.status.to_string().red(),
                HostStatus::Cancelled => host.status.to_string().yellow(),
            };
            out.push_str(&format!(
                "{} {} ({} steps, {:.2}s)\n",
                format!("[{}]", host.host).cyan(),
                status,
                host.steps.len(),
                host.duration.as_secs_f64()
            ));

            if let Some(step) = &host.failed_step {
                out.push_str(&format!("  failed at {}\n", step.bold()));
            }
            if let Some(error) = &host.error {
                out.push_str(&format!("  {}\n", error.to_string().red()));
            }
            for (handler, error) in &host.handler_errors {
                out.push_str(&format!("  fail handler {} also failed: {}\n", handler, error));
            }
        }

        let summary = match self.status() {
            RunStatus::Success => format!("{} succeeded", self.task).green(),
            RunStatus::PartialFailure => format!(
                "{} failed on {} of {} hosts",
                self.task,
                self.failed_hosts().len(),
                self.hosts.len()
            )
            .red(),
            RunStatus::TotalFailure => format!("{} failed on every host", self.task).red(),
        };
        out.push_str(&summary.bold().to_string());
        if self.dry_run {
            out.push_str(&" (dry run)".dimmed().to_string());
        }
        out.push('\n');
        out
    }
}
