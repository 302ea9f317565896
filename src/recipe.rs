//! Recipes
//!
//! A [`Recipe`] is everything a run needs before planning: the task
//! registry, the hook graph, the host inventory, the global configuration
//! layer and the command environment. It is built once, either from recipe
//! files or through its builder methods, and is read-only while a plan runs.

use crate::config::{parse_recipe_auto, parse_recipe_file, RecipeSource};
use crate::error::{ConfigError, ConfigResult, DeployerError};
use crate::graph::{
    expand_group, ExecutionPlan, HookGraph, HookKind, Planner, Registry, TaskBody, TaskOptions,
};
use crate::host::{ConfigValue, Host, Selector, Store};
use crate::runner::{CommandRunner, Executor, ExecutorOptions, ProcessRunner, ScriptAction};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Tasks, hooks, hosts and configuration of one project
#[derive(Debug, Default)]
pub struct Recipe {
    /// Project name from the recipe file
    pub name: Option<String>,

    registry: Registry,
    hooks: HookGraph,
    hosts: Vec<Arc<Host>>,
    store: Arc<Store>,

    /// Command-line overrides, above host values
    overrides: Arc<Store>,

    /// Environment exported to every command
    env: BTreeMap<String, String>,

    /// Shell for local commands
    interpreter: Option<Vec<String>>,
}

impl Recipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a recipe file and its imports
    pub fn load(path: &Path) -> Result<Self, DeployerError> {
        Self::from_sources(parse_recipe_file(path)?)
    }

    /// Find deploy.yml in the current directory or its parents and load it
    pub fn discover() -> Result<(Self, PathBuf), DeployerError> {
        let (sources, path) = parse_recipe_auto()?;
        Ok((Self::from_sources(sources)?, path))
    }

    /// Build a recipe from parsed sources, applied in order
    pub fn from_sources(sources: Vec<RecipeSource>) -> Result<Self, DeployerError> {
        let mut recipe = Recipe::new();
        for source in sources {
            recipe.apply(source)?;
        }
        recipe.check_references();
        Ok(recipe)
    }

    /// Apply one recipe on top of what is already defined
    fn apply(&mut self, source: RecipeSource) -> Result<(), DeployerError> {
        if let Some(dotenv) = &source.config.dotenv {
            self.load_dotenv(&source.resolve(dotenv))?;
        }

        let config = source.config;
        if config.name.is_some() {
            self.name = config.name;
        }
        if config.interpreter.is_some() {
            self.interpreter = config.interpreter;
        }

        for (key, value) in config.config {
            self.store.set(key, value);
        }

        for (alias, entry) in config.hosts {
            let mut host = Host::new(alias);
            host.hostname = entry.hostname;
            host.remote_user = entry.remote_user;
            host.port = entry.port;
            host.local = entry.local;
            host.labels = entry.labels;
            host.config = entry.config;
            self.add_host(host);
        }

        for (name, entry) in config.tasks {
            let mut options = TaskOptions::new();
            options.description = entry.desc;
            options.once = entry.once;
            options.shallow = entry.shallow;
            options.hidden = entry.hidden;
            options.private = entry.private;

            let body = match entry.group {
                Some(members) => TaskBody::Group(members),
                None => TaskBody::action(ScriptAction::from_config(&name, entry.script)?),
            };
            self.registry.register(name, body, options);
        }

        for hook in config.hooks {
            let (trigger, kind) = match (hook.before, hook.after, hook.fail) {
                (Some(t), None, None) => (t, HookKind::Before),
                (None, Some(t), None) => (t, HookKind::After),
                (None, None, Some(t)) => (t, HookKind::Fail),
                _ => {
                    return Err(ConfigError::Invalid(
                        "hook must have exactly one of before, after, fail".to_string(),
                    )
                    .into())
                }
            };
            for hooked in hook.run {
                self.hooks.add_hook(trigger.clone(), hooked, kind);
            }
        }

        Ok(())
    }

    fn load_dotenv(&mut self, path: &Path) -> ConfigResult<()> {
        let invalid = |e: dotenvy::Error| {
            ConfigError::Invalid(format!("failed to load {}: {}", path.display(), e))
        };
        for item in dotenvy::from_path_iter(path).map_err(invalid)? {
            let (key, value) = item.map_err(invalid)?;
            self.env.insert(key, value);
        }
        tracing::debug!(path = %path.display(), vars = self.env.len(), "dotenv loaded");
        Ok(())
    }

    /// Register or replace a task
    pub fn task(&mut self, name: impl Into<String>, body: TaskBody, options: TaskOptions) -> &mut Self {
        self.registry.register(name, body, options);
        self
    }

    /// Run `hooked` before `trigger`
    pub fn before(&mut self, trigger: impl Into<String>, hooked: impl Into<String>) -> &mut Self {
        self.hooks.before(trigger, hooked);
        self
    }

    /// Run `hooked` after `trigger`
    pub fn after(&mut self, trigger: impl Into<String>, hooked: impl Into<String>) -> &mut Self {
        self.hooks.after(trigger, hooked);
        self
    }

    /// Run `hooked` when `trigger` or anything inside it fails
    pub fn fail(&mut self, trigger: impl Into<String>, hooked: impl Into<String>) -> &mut Self {
        self.hooks.fail(trigger, hooked);
        self
    }

    /// Set a global configuration value
    pub fn set(&self, key: impl Into<String>, value: impl Into<ConfigValue>) -> &Self {
        self.store.set(key, value);
        self
    }

    /// Override a value for every host, including hosts that set it themselves
    pub fn set_override(&self, key: impl Into<String>, value: impl Into<ConfigValue>) -> &Self {
        self.overrides.set(key, value);
        self
    }

    /// Add a host, replacing any host with the same alias
    pub fn add_host(&mut self, host: Host) -> &mut Self {
        let host = Arc::new(host);
        match self.hosts.iter_mut().find(|h| h.alias == host.alias) {
            Some(existing) => *existing = host,
            None => self.hosts.push(host),
        }
        self
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn hooks(&self) -> &HookGraph {
        &self.hooks
    }

    pub fn hosts(&self) -> &[Arc<Host>] {
        &self.hosts
    }

    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn interpreter(&self) -> Option<&[String]> {
        self.interpreter.as_deref()
    }

    pub fn host(&self, alias: &str) -> ConfigResult<Arc<Host>> {
        self.hosts
            .iter()
            .find(|h| h.alias == alias)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownHost(alias.to_string()))
    }

    /// Hosts matched by a selector, ordered by alias
    ///
    /// A recipe without hosts deploys to an implicit local host.
    pub fn select_hosts(&self, selector: &str) -> ConfigResult<Vec<Arc<Host>>> {
        if self.hosts.is_empty() {
            return Ok(vec![Arc::new(Host::localhost("localhost"))]);
        }

        let selector = Selector::parse(selector)?;
        let selected = selector.select(self.hosts.iter().map(Arc::as_ref))?;
        selected
            .into_iter()
            .map(|host| self.host(&host.alias))
            .collect()
    }

    pub fn planner(&self) -> Planner<'_> {
        Planner::new(&self.registry, &self.hooks)
    }

    /// Plan a task for the hosts matched by a selector
    pub fn plan(&self, task: &str, selector: &str) -> ConfigResult<ExecutionPlan> {
        let hosts = self.select_hosts(selector)?;
        self.planner().plan(task, &hosts)
    }

    /// The command runner configured by this recipe
    pub fn runner(&self) -> ProcessRunner {
        let runner = ProcessRunner::new();
        match &self.interpreter {
            Some(interpreter) => runner.with_interpreter(interpreter.clone()),
            None => runner,
        }
    }

    /// An executor over this recipe's configuration and environment
    pub fn executor(&self, runner: Arc<dyn CommandRunner>, mut options: ExecutorOptions) -> Executor {
        for (key, value) in &self.env {
            options.env.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Executor::new(runner, self.store())
            .with_overrides(Arc::clone(&self.overrides))
            .with_options(options)
    }

    /// Report references to undefined tasks
    ///
    /// Recipes may reference tasks that a later import never defines; this
    /// is only an error once such a task is planned, so here it is a warning.
    pub fn check_references(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for edge in self.hooks.dangling(&self.registry) {
            warnings.push(format!(
                "{} hook '{}' -> '{}' references an undefined task",
                edge.kind, edge.trigger, edge.hooked
            ));
        }

        for task in self.registry.all() {
            if task.is_group() {
                if let Err(e) = expand_group(&self.registry, &task.name) {
                    warnings.push(format!("group '{}': {}", task.name, e));
                }
            }
        }

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        warnings
    }
}
