//! Hook graph
//!
//! Hooks are kept as a plain edge list in registration order. Names are not
//! resolved here: recipes wire hooks to tasks that may be defined later or
//! in another file, so resolution waits until a plan is built.

use crate::error::{ConfigError, ConfigResult};
use crate::graph::Registry;
use std::fmt;

/// When a hooked task runs relative to its trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Before,
    After,
    Fail,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookKind::Before => "before",
            HookKind::After => "after",
            HookKind::Fail => "fail",
        })
    }
}

/// A single hook edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookEdge {
    pub trigger: String,
    pub hooked: String,
    pub kind: HookKind,
}

/// Ordered list of hook edges
#[derive(Debug, Clone, Default)]
pub struct HookGraph {
    edges: Vec<HookEdge>,
}

impl HookGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an edge. Duplicates are kept.
    pub fn add_hook(&mut self, trigger: impl Into<String>, hooked: impl Into<String>, kind: HookKind) {
        self.edges.push(HookEdge {
            trigger: trigger.into(),
            hooked: hooked.into(),
            kind,
        });
    }

    pub fn before(&mut self, trigger: impl Into<String>, hooked: impl Into<String>) {
        self.add_hook(trigger, hooked, HookKind::Before);
    }

    pub fn after(&mut self, trigger: impl Into<String>, hooked: impl Into<String>) {
        self.add_hook(trigger, hooked, HookKind::After);
    }

    pub fn fail(&mut self, trigger: impl Into<String>, hooked: impl Into<String>) {
        self.add_hook(trigger, hooked, HookKind::Fail);
    }

    /// Hooked task names for a trigger, in registration order
    pub fn hooks_for(&self, trigger: &str, kind: HookKind) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.kind == kind && e.trigger == trigger)
            .map(|e| e.hooked.as_str())
            .collect()
    }

    pub fn edges(&self) -> &[HookEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edges whose trigger or hooked task is not registered
    pub fn dangling<'a>(&'a self, registry: &Registry) -> Vec<&'a HookEdge> {
        self.edges
            .iter()
            .filter(|e| !registry.contains(&e.trigger) || !registry.contains(&e.hooked))
            .collect()
    }
}

/// Flatten a group into the action tasks it contains, without hooks
///
/// Nested groups are substituted in place. Non-group tasks expand to
/// themselves.
pub fn expand_group(registry: &Registry, name: &str) -> ConfigResult<Vec<String>> {
    let mut out = Vec::new();
    let mut stack = Vec::new();
    flatten(registry, name, &mut stack, &mut out)?;
    Ok(out)
}

fn flatten(
    registry: &Registry,
    name: &str,
    stack: &mut Vec<String>,
    out: &mut Vec<String>,
) -> ConfigResult<()> {
    if stack.iter().any(|n| n == name) {
        stack.push(name.to_string());
        return Err(ConfigError::CyclicDependency(stack.join(" -> ")));
    }

    let task = registry.lookup(name)?;
    if !task.is_group() {
        out.push(task.name.clone());
        return Ok(());
    }

    stack.push(name.to_string());
    for member in task.members() {
        flatten(registry, member, stack, out)?;
    }
    stack.pop();
    Ok(())
}
