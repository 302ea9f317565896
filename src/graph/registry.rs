//! Task registry
//!
//! Tasks are stored flat, keyed by name. Registering a name again replaces
//! the previous definition, which is how recipes override or blank out
//! tasks they inherited from an imported recipe.

use crate::error::{ConfigError, ConfigResult};
use crate::runner::Action;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a task does when it runs
#[derive(Clone)]
pub enum TaskBody {
    /// A single action executed on the target host
    Action(Arc<dyn Action>),

    /// An ordered list of other task names
    Group(Vec<String>),
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskBody::Action(_) => f.write_str("Action(..)"),
            TaskBody::Group(members) => f.debug_tuple("Group").field(members).finish(),
        }
    }
}

impl TaskBody {
    pub fn action(action: impl Action + 'static) -> Self {
        TaskBody::Action(Arc::new(action))
    }

    pub fn group<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TaskBody::Group(members.into_iter().map(Into::into).collect())
    }
}

/// Task decorations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Human readable description shown by `dep list`
    pub description: Option<String>,

    /// Execute a single time for the whole run instead of once per host
    pub once: bool,

    /// Do not splice this task's own before/after hooks
    pub shallow: bool,

    /// Hide from task listings
    pub hidden: bool,

    /// Hide from task listings (kept apart from `hidden` for recipe compatibility)
    pub private: bool,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn desc(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn shallow(mut self) -> Self {
        self.shallow = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }
}

/// A registered task
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub body: TaskBody,
    pub options: TaskOptions,
}

impl Task {
    pub fn is_group(&self) -> bool {
        matches!(self.body, TaskBody::Group(_))
    }

    /// Group members, empty for action tasks
    pub fn members(&self) -> &[String] {
        match &self.body {
            TaskBody::Group(members) => members,
            TaskBody::Action(_) => &[],
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.options.description.as_deref()
    }

    pub fn is_once(&self) -> bool {
        self.options.once
    }

    pub fn is_shallow(&self) -> bool {
        self.options.shallow
    }

    /// Whether the task shows up in listings
    pub fn is_visible(&self) -> bool {
        !self.options.hidden && !self.options.private
    }
}

/// Name-keyed task storage
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tasks: HashMap<String, Arc<Task>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a task, returning the definition it replaced
    pub fn register(
        &mut self,
        name: impl Into<String>,
        body: TaskBody,
        options: TaskOptions,
    ) -> Option<Arc<Task>> {
        let name = name.into();
        let task = Task {
            name: name.clone(),
            body,
            options,
        };
        let replaced = self.tasks.insert(name, Arc::new(task));
        if let Some(old) = &replaced {
            tracing::debug!(task = %old.name, "task definition replaced");
        }
        replaced
    }

    /// Look up a task by name
    pub fn lookup(&self, name: &str) -> ConfigResult<Arc<Task>> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::TaskNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Tasks that are neither hidden nor private, sorted by name
    pub fn list_visible(&self) -> Vec<Arc<Task>> {
        let mut tasks: Vec<Arc<Task>> = self
            .tasks
            .values()
            .filter(|t| t.is_visible())
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    /// All tasks, sorted by name
    pub fn all(&self) -> Vec<Arc<Task>> {
        let mut tasks: Vec<Arc<Task>> = self.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
