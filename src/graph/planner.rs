//! Execution planner
//!
//! Expands a requested task into the ordered list of action tasks to run:
//! group members are substituted in place, `before` hooks are spliced in
//! front of a task and `after` hooks behind it, recursively. A task that is
//! reachable through several paths is scheduled only at its first position.
//! The host-independent expansion is then bound to hosts: `once` tasks get a
//! single global step, every other task one step per host.

use crate::error::{ConfigError, ConfigResult};
use crate::graph::{HookGraph, HookKind, Registry, Task, TaskBody};
use crate::host::Host;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Where a step runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// On one host, identified by alias
    Host(String),

    /// Once for the whole run
    Global,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Host(alias) => f.write_str(alias),
            Target::Global => f.write_str("GLOBAL"),
        }
    }
}

/// An action task at its position in the expansion
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub task: Arc<Task>,

    /// Enclosing tasks from the outermost (the requested task) inwards
    pub parents: Vec<String>,
}

impl PlannedTask {
    pub fn name(&self) -> &str {
        &self.task.name
    }
}

/// A task bound to a target
#[derive(Debug, Clone)]
pub struct Step {
    pub task: Arc<Task>,
    pub target: Target,
    pub parents: Vec<String>,
}

impl Step {
    pub fn name(&self) -> &str {
        &self.task.name
    }
}

/// The fully expanded plan for one run
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    root: String,
    tasks: Vec<PlannedTask>,
    hosts: Vec<Arc<Host>>,
    fail_handlers: HashMap<String, Vec<PlannedTask>>,
}

impl ExecutionPlan {
    /// The requested task name
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Host-independent expansion in execution order
    pub fn tasks(&self) -> &[PlannedTask] {
        &self.tasks
    }

    pub fn hosts(&self) -> &[Arc<Host>] {
        &self.hosts
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The combined plan: `once` tasks appear a single time bound to
    /// [`Target::Global`], every other task once per host
    pub fn steps(&self) -> Vec<Step> {
        let mut steps = Vec::new();
        let mut seen: HashSet<(String, Target)> = HashSet::new();

        for planned in &self.tasks {
            let targets: Vec<Target> = if planned.task.is_once() {
                vec![Target::Global]
            } else {
                self.hosts
                    .iter()
                    .map(|h| Target::Host(h.alias.clone()))
                    .collect()
            };

            for target in targets {
                if seen.insert((planned.task.name.clone(), target.clone())) {
                    steps.push(Step {
                        task: Arc::clone(&planned.task),
                        target,
                        parents: planned.parents.clone(),
                    });
                }
            }
        }
        steps
    }

    /// The ordered steps one host walks through
    ///
    /// `once` steps are included with [`Target::Global`]; every host that
    /// reaches one shares its single execution.
    pub fn steps_for(&self, alias: &str) -> Vec<Step> {
        self.tasks
            .iter()
            .map(|planned| Step {
                task: Arc::clone(&planned.task),
                target: if planned.task.is_once() {
                    Target::Global
                } else {
                    Target::Host(alias.to_string())
                },
                parents: planned.parents.clone(),
            })
            .collect()
    }

    /// Expanded `fail` handlers to run when `step` fails
    ///
    /// Handlers registered on the failing task come first, then those of each
    /// enclosing task outwards. A handler task appears at most once.
    pub fn fail_handlers_for(&self, step: &Step) -> Vec<PlannedTask> {
        let chain = std::iter::once(step.name()).chain(step.parents.iter().rev().map(String::as_str));

        let mut seen = HashSet::new();
        let mut handlers = Vec::new();
        for trigger in chain {
            if let Some(expansion) = self.fail_handlers.get(trigger) {
                for planned in expansion {
                    if seen.insert(planned.task.name.clone()) {
                        handlers.push(planned.clone());
                    }
                }
            }
        }
        handlers
    }
}

/// Builds execution plans from a registry and hook graph
pub struct Planner<'a> {
    registry: &'a Registry,
    hooks: &'a HookGraph,
}

impl<'a> Planner<'a> {
    pub fn new(registry: &'a Registry, hooks: &'a HookGraph) -> Self {
        Planner { registry, hooks }
    }

    /// Build the plan for a task against a set of hosts
    ///
    /// Fails with `TaskNotFound` or `CyclicDependency` before anything runs.
    /// The expansions of every `fail` hook that could fire are built here as
    /// well, so a broken handler is reported up front.
    pub fn plan(&self, name: &str, hosts: &[Arc<Host>]) -> ConfigResult<ExecutionPlan> {
        let mut expansion = Expansion::default();
        self.visit(name, &mut Vec::new(), &mut expansion)?;

        let mut fail_handlers = HashMap::new();
        for trigger in &expansion.visited_order {
            let hooked = self.hooks.hooks_for(trigger, HookKind::Fail);
            if hooked.is_empty() {
                continue;
            }
            let mut handler = Expansion::default();
            for hooked_name in hooked {
                self.visit(hooked_name, &mut Vec::new(), &mut handler)?;
            }
            fail_handlers.insert(trigger.clone(), handler.tasks);
        }

        tracing::debug!(
            task = %name,
            tasks = expansion.tasks.len(),
            hosts = hosts.len(),
            "execution plan built"
        );

        Ok(ExecutionPlan {
            root: name.to_string(),
            tasks: expansion.tasks,
            hosts: hosts.to_vec(),
            fail_handlers,
        })
    }

    /// Host-independent expansion of a task
    pub fn expand(&self, name: &str) -> ConfigResult<Vec<PlannedTask>> {
        let mut expansion = Expansion::default();
        self.visit(name, &mut Vec::new(), &mut expansion)?;
        Ok(expansion.tasks)
    }

    fn visit(&self, name: &str, stack: &mut Vec<String>, out: &mut Expansion) -> ConfigResult<()> {
        if stack.iter().any(|n| n == name) {
            stack.push(name.to_string());
            return Err(ConfigError::CyclicDependency(stack.join(" -> ")));
        }
        // Everything reachable from a finished task was already scheduled
        if out.done.contains(name) {
            return Ok(());
        }

        let task = self.registry.lookup(name)?;
        stack.push(name.to_string());
        out.visited_order.push(name.to_string());

        if !task.is_shallow() {
            for hooked in self.hooks.hooks_for(name, HookKind::Before) {
                self.visit(hooked, stack, out)?;
            }
        }

        match &task.body {
            TaskBody::Group(members) => {
                for member in members {
                    self.visit(member, stack, out)?;
                }
            }
            TaskBody::Action(_) => {
                out.tasks.push(PlannedTask {
                    task: Arc::clone(&task),
                    parents: stack[..stack.len() - 1].to_vec(),
                });
            }
        }

        if !task.is_shallow() {
            for hooked in self.hooks.hooks_for(name, HookKind::After) {
                self.visit(hooked, stack, out)?;
            }
        }

        stack.pop();
        out.done.insert(name.to_string());
        Ok(())
    }

    /// The hook-expanded tree of a task, without deduplication
    pub fn tree(&self, name: &str) -> ConfigResult<TaskTree> {
        self.tree_node(name, TreeEdge::Root, &mut Vec::new())
    }

    fn tree_node(&self, name: &str, edge: TreeEdge, stack: &mut Vec<String>) -> ConfigResult<TaskTree> {
        if stack.iter().any(|n| n == name) {
            stack.push(name.to_string());
            return Err(ConfigError::CyclicDependency(stack.join(" -> ")));
        }

        let task = self.registry.lookup(name)?;
        stack.push(name.to_string());

        let mut children = Vec::new();
        if !task.is_shallow() {
            for hooked in self.hooks.hooks_for(name, HookKind::Before) {
                children.push(self.tree_node(hooked, TreeEdge::Before, stack)?);
            }
        }
        for member in task.members() {
            children.push(self.tree_node(member, TreeEdge::Member, stack)?);
        }
        if !task.is_shallow() {
            for hooked in self.hooks.hooks_for(name, HookKind::After) {
                children.push(self.tree_node(hooked, TreeEdge::After, stack)?);
            }
        }

        stack.pop();
        Ok(TaskTree {
            task,
            edge,
            children,
        })
    }
}

#[derive(Default)]
struct Expansion {
    tasks: Vec<PlannedTask>,
    done: HashSet<String>,
    visited_order: Vec<String>,
}

/// How a tree node is attached to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEdge {
    Root,
    Before,
    Member,
    After,
}

/// A node of the hook-expanded task tree
#[derive(Debug, Clone)]
pub struct TaskTree {
    pub task: Arc<Task>,
    pub edge: TreeEdge,
    pub children: Vec<TaskTree>,
}

impl TaskTree {
    /// Render as an indented tree
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.label());
        out.push('\n');
        Self::render_children(&self.children, "", &mut out);
        out
    }

    fn render_children(children: &[TaskTree], prefix: &str, out: &mut String) {
        for (i, child) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            out.push_str(prefix);
            out.push_str(if last { "└── " } else { "├── " });
            out.push_str(&child.label());
            out.push('\n');
            let next = format!("{}{}", prefix, if last { "    " } else { "│   " });
            Self::render_children(&child.children, &next, out);
        }
    }

    fn label(&self) -> String {
        let mut label = self.task.name.clone();
        match self.edge {
            TreeEdge::Before => label.push_str("  // before"),
            TreeEdge::After => label.push_str("  // after"),
            TreeEdge::Root | TreeEdge::Member => {}
        }
        if self.task.is_once() {
            label.push_str(" [once]");
        }
        if self.task.is_shallow() {
            label.push_str(" [shallow]");
        }
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskOptions;
    use crate::runner::FnAction;

    fn action() -> TaskBody {
        TaskBody::action(FnAction::new(|_| Ok(())))
    }

    fn register(registry: &mut Registry, names: &[&str]) {
        for name in names {
            registry.register(*name, action(), TaskOptions::new());
        }
    }

    fn names(tasks: &[PlannedTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.name()).collect()
    }

    fn hosts(aliases: &[&str]) -> Vec<Arc<Host>> {
        aliases.iter().map(|a| Arc::new(Host::new(*a))).collect()
    }

    #[test]
    fn test_before_task_after_order() {
        let mut registry = Registry::new();
        register(&mut registry, &["T", "B1", "B2", "A1", "B1pre"]);
        let mut hooks = HookGraph::new();
        hooks.before("T", "B1");
        hooks.before("T", "B2");
        hooks.after("T", "A1");
        hooks.before("B1", "B1pre");

        let planner = Planner::new(&registry, &hooks);
        let expansion = planner.expand("T").unwrap();
        assert_eq!(names(&expansion), vec!["B1pre", "B1", "B2", "T", "A1"]);
    }

    #[test]
    fn test_group_members_with_hooks() {
        let mut registry = Registry::new();
        register(&mut registry, &["deploy:prepare", "deploy:publish", "deploy:info", "deploy:success"]);
        registry.register(
            "deploy",
            TaskBody::group(["deploy:prepare", "deploy:publish"]),
            TaskOptions::new(),
        );
        let mut hooks = HookGraph::new();
        hooks.before("deploy", "deploy:info");
        hooks.after("deploy", "deploy:success");

        let planner = Planner::new(&registry, &hooks);
        let expansion = planner.expand("deploy").unwrap();
        assert_eq!(
            names(&expansion),
            vec!["deploy:info", "deploy:prepare", "deploy:publish", "deploy:success"]
        );
        assert_eq!(expansion[1].parents, vec!["deploy".to_string()]);
    }

    #[test]
    fn test_shallow_dependency_skips_own_hooks() {
        let mut registry = Registry::new();
        register(&mut registry, &["deploy", "deploy:info"]);
        registry.register("slack:notify", action(), TaskOptions::new().shallow());
        let mut hooks = HookGraph::new();
        hooks.after("deploy", "slack:notify");
        hooks.before("slack:notify", "deploy:info");

        let planner = Planner::new(&registry, &hooks);
        assert_eq!(names(&planner.expand("deploy").unwrap()), vec!["deploy", "slack:notify"]);
    }

    #[test]
    fn test_once_task_appears_once_for_many_hosts() {
        let mut registry = Registry::new();
        register(&mut registry, &["deploy"]);
        registry.register("git:tag", action(), TaskOptions::new().once());
        let mut hooks = HookGraph::new();
        hooks.after("deploy", "git:tag");

        let planner = Planner::new(&registry, &hooks);
        for n in 1..=4 {
            let aliases: Vec<String> = (0..n).map(|i| format!("web{}", i)).collect();
            let refs: Vec<&str> = aliases.iter().map(String::as_str).collect();
            let plan = planner.plan("deploy", &hosts(&refs)).unwrap();
            let steps = plan.steps();

            let tags: Vec<&Step> = steps.iter().filter(|s| s.name() == "git:tag").collect();
            assert_eq!(tags.len(), 1);
            assert_eq!(tags[0].target, Target::Global);
            assert_eq!(steps.iter().filter(|s| s.name() == "deploy").count(), n);
        }
    }

    #[test]
    fn test_reregistration_keeps_hooks() {
        let mut registry = Registry::new();
        register(&mut registry, &["build", "notify"]);
        let mut hooks = HookGraph::new();
        hooks.after("build", "notify");

        registry.register("build", TaskBody::group(["notify"]), TaskOptions::new());

        let planner = Planner::new(&registry, &hooks);
        // The new body schedules notify first; the after hook is then a no-op
        assert_eq!(names(&planner.expand("build").unwrap()), vec!["notify"]);

        registry.register("build", action(), TaskOptions::new());
        let planner = Planner::new(&registry, &hooks);
        assert_eq!(names(&planner.expand("build").unwrap()), vec!["build", "notify"]);
    }

    #[test]
    fn test_diamond_is_deduplicated() {
        let mut registry = Registry::new();
        register(&mut registry, &["deploy:info", "deploy:prepare", "deploy:publish"]);
        registry.register(
            "deploy",
            TaskBody::group(["deploy:prepare", "deploy:publish"]),
            TaskOptions::new(),
        );
        let mut hooks = HookGraph::new();
        hooks.before("deploy:prepare", "deploy:info");
        hooks.before("deploy:publish", "deploy:info");

        let planner = Planner::new(&registry, &hooks);
        let plan = planner.plan("deploy", &hosts(&["h1", "h2"])).unwrap();
        assert_eq!(
            names(plan.tasks()),
            vec!["deploy:info", "deploy:prepare", "deploy:publish"]
        );

        let h1: Vec<String> = plan
            .steps()
            .iter()
            .filter(|s| s.target == Target::Host("h1".into()))
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(h1.iter().filter(|n| *n == "deploy:info").count(), 1);
    }

    #[test]
    fn test_cycle_detected() {
        let mut registry = Registry::new();
        register(&mut registry, &["A", "B"]);
        let mut hooks = HookGraph::new();
        hooks.before("A", "B");
        hooks.before("B", "A");

        let planner = Planner::new(&registry, &hooks);
        assert_eq!(
            planner.plan("A", &hosts(&["h1"])).unwrap_err(),
            ConfigError::CyclicDependency("A -> B -> A".to_string())
        );
    }

    #[test]
    fn test_cycle_through_group() {
        let mut registry = Registry::new();
        registry.register("deploy", TaskBody::group(["deploy:prepare"]), TaskOptions::new());
        registry.register("deploy:prepare", TaskBody::group(["deploy"]), TaskOptions::new());
        let hooks = HookGraph::new();

        let planner = Planner::new(&registry, &hooks);
        assert!(matches!(
            planner.expand("deploy"),
            Err(ConfigError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_missing_task_in_hook() {
        let mut registry = Registry::new();
        register(&mut registry, &["deploy"]);
        let mut hooks = HookGraph::new();
        hooks.after("deploy", "slack:notify");

        let planner = Planner::new(&registry, &hooks);
        assert_eq!(
            planner.plan("deploy", &hosts(&["h1"])).unwrap_err(),
            ConfigError::TaskNotFound("slack:notify".to_string())
        );
    }

    #[test]
    fn test_missing_fail_handler_reported_at_plan_time() {
        let mut registry = Registry::new();
        register(&mut registry, &["deploy"]);
        let mut hooks = HookGraph::new();
        hooks.fail("deploy", "deploy:failed");

        let planner = Planner::new(&registry, &hooks);
        assert_eq!(
            planner.plan("deploy", &hosts(&["h1"])).unwrap_err(),
            ConfigError::TaskNotFound("deploy:failed".to_string())
        );
    }

    #[test]
    fn test_fail_handlers_innermost_first() {
        let mut registry = Registry::new();
        register(&mut registry, &["deploy:publish", "deploy:unlock", "deploy:failed"]);
        registry.register("deploy", TaskBody::group(["deploy:publish"]), TaskOptions::new());
        let mut hooks = HookGraph::new();
        hooks.fail("deploy", "deploy:failed");
        hooks.fail("deploy", "deploy:unlock");
        hooks.fail("deploy:publish", "deploy:unlock");

        let planner = Planner::new(&registry, &hooks);
        let plan = planner.plan("deploy", &hosts(&["h1"])).unwrap();
        let step = &plan.steps_for("h1")[0];
        assert_eq!(step.name(), "deploy:publish");

        let handlers = plan.fail_handlers_for(step);
        assert_eq!(names(&handlers), vec!["deploy:unlock", "deploy:failed"]);
    }

    #[test]
    fn test_steps_for_host() {
        let mut registry = Registry::new();
        register(&mut registry, &["deploy"]);
        registry.register("git:tag", action(), TaskOptions::new().once());
        let mut hooks = HookGraph::new();
        hooks.after("deploy", "git:tag");

        let planner = Planner::new(&registry, &hooks);
        let plan = planner.plan("deploy", &hosts(&["h1", "h2"])).unwrap();
        let targets: Vec<Target> = plan.steps_for("h2").into_iter().map(|s| s.target).collect();
        assert_eq!(targets, vec![Target::Host("h2".into()), Target::Global]);
    }

    #[test]
    fn test_tree_render() {
        let mut registry = Registry::new();
        register(&mut registry, &["deploy:prepare", "deploy:info", "deploy:success"]);
        registry.register("git:tag", action(), TaskOptions::new().once());
        registry.register("deploy", TaskBody::group(["deploy:prepare"]), TaskOptions::new());
        let mut hooks = HookGraph::new();
        hooks.before("deploy", "deploy:info");
        hooks.after("deploy", "deploy:success");
        hooks.after("deploy:success", "git:tag");

        let planner = Planner::new(&registry, &hooks);
        let rendered = planner.tree("deploy").unwrap().render();
        assert_eq!(
            rendered,
            "deploy\n\
             ├── deploy:info  // before\n\
             ├── deploy:prepare\n\
             └── deploy:success  // after\n    \
             └── git:tag  // after [once]\n"
        );
    }
}
