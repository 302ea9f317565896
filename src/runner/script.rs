//! Script actions
//!
//! A script is the body recipes give their tasks: a list of steps, each with
//! optional conditions and a single instruction.

use crate::config;
use crate::error::{ConfigError, ConfigResult, ExecutionResult};
use crate::runner::{evaluate_when_list, Action, Condition, Context};
use async_trait::async_trait;
use serde_yaml::Value;

/// What a script step does
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Run a command on the host
    Run { command: String, stream: bool },

    /// Run a command on this machine
    Local { command: String, stream: bool },

    /// Change the working directory for later `run` steps
    Cd(String),

    /// Set configuration values on the host
    Set(Vec<(String, Value)>),

    /// Print a message
    Echo(String),
}

/// A single step of a script
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptItem {
    pub when: Vec<Condition>,
    pub instruction: Instruction,
}

impl ScriptItem {
    pub fn new(instruction: Instruction) -> Self {
        ScriptItem {
            when: Vec::new(),
            instruction,
        }
    }

    /// Remote command step
    pub fn run(command: impl Into<String>) -> Self {
        Self::new(Instruction::Run {
            command: command.into(),
            stream: false,
        })
    }

    /// Local command step
    pub fn local(command: impl Into<String>) -> Self {
        Self::new(Instruction::Local {
            command: command.into(),
            stream: false,
        })
    }

    pub fn cd(dir: impl Into<String>) -> Self {
        Self::new(Instruction::Cd(dir.into()))
    }

    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(Instruction::Set(vec![(key.into(), value.into())]))
    }

    pub fn echo(message: impl Into<String>) -> Self {
        Self::new(Instruction::Echo(message.into()))
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.when.push(condition);
        self
    }

    /// Create from config
    pub fn from_config(task: &str, entry: config::ScriptEntry) -> ConfigResult<Self> {
        let step = match entry {
            config::ScriptEntry::Simple(command) => return Ok(Self::run(command)),
            config::ScriptEntry::Step(step) => step,
        };

        let mut instructions = Vec::new();
        if let Some(command) = step.run {
            instructions.push(Instruction::Run {
                command,
                stream: step.stream,
            });
        }
        if let Some(command) = step.local {
            instructions.push(Instruction::Local {
                command,
                stream: step.stream,
            });
        }
        if let Some(dir) = step.cd {
            instructions.push(Instruction::Cd(dir));
        }
        if let Some(values) = step.set {
            instructions.push(Instruction::Set(values.into_iter().collect()));
        }
        if let Some(message) = step.echo {
            instructions.push(Instruction::Echo(message));
        }

        if instructions.len() != 1 {
            return Err(ConfigError::Invalid(format!(
                "script step in task '{}' must have exactly one of run, local, cd, set, echo",
                task
            )));
        }

        Ok(ScriptItem {
            when: step.when.into_iter().map(Condition::from_config).collect(),
            instruction: instructions.remove(0),
        })
    }

    async fn execute(&self, ctx: &mut Context) -> ExecutionResult<()> {
        if !self.when.is_empty() && !evaluate_when_list(&self.when, ctx).await? {
            ctx.print_debug("condition not met, step skipped");
            return Ok(());
        }

        match &self.instruction {
            Instruction::Run { command, stream } => {
                if *stream {
                    ctx.run_streaming(command).await?;
                } else {
                    ctx.run(command).await?;
                }
            }
            Instruction::Local { command, stream } => {
                if *stream {
                    ctx.run_locally_streaming(command).await?;
                } else {
                    ctx.run_locally(command).await?;
                }
            }
            Instruction::Cd(dir) => ctx.cd(dir)?,
            Instruction::Set(values) => {
                for (key, value) in values {
                    ctx.set(key.clone(), value.clone());
                }
            }
            Instruction::Echo(message) => {
                let message = ctx.parse(message)?;
                ctx.print_info(&message);
            }
        }
        Ok(())
    }
}

/// Action running a list of script steps in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptAction {
    items: Vec<ScriptItem>,
}

impl ScriptAction {
    pub fn new(items: Vec<ScriptItem>) -> Self {
        ScriptAction { items }
    }

    /// Create from config
    pub fn from_config(task: &str, entries: Vec<config::ScriptEntry>) -> ConfigResult<Self> {
        let items = entries
            .into_iter()
            .map(|entry| ScriptItem::from_config(task, entry))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(ScriptAction { items })
    }

    pub fn items(&self) -> &[ScriptItem] {
        &self.items
    }
}

#[async_trait]
impl Action for ScriptAction {
    async fn run(&self, ctx: &mut Context) -> ExecutionResult<()> {
        for item in &self.items {
            item.execute(ctx).await?;
        }
        Ok(())
    }
}
