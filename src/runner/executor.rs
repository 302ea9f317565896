//! Plan executor
//!
//! Every host walks its steps on its own tokio task, so hosts run in
//! parallel while steps for one host stay strictly sequential. `once` steps
//! go through a shared barrier: the first host to reach one executes it and
//! every other host awaits the same outcome.

use crate::error::{is_cancelled, ExecutionError, ExecutionResult};
use crate::graph::{ExecutionPlan, Step, Target, Task, TaskBody};
use crate::host::{Host, HostConfig, Store};
use crate::runner::{
    CommandRunner, Context, HostReport, HostStatus, RunReport, StepRecord, StepStatus, Verbosity,
};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// What to do with the other hosts when one host fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Other hosts keep going
    #[default]
    Continue,

    /// Other hosts stop before their next step
    AbortFleet,
}

/// Executor settings
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Print commands instead of executing them
    pub dry_run: bool,

    /// Maximum number of hosts running at the same time
    pub limit: Option<usize>,

    pub failure_policy: FailurePolicy,

    pub verbosity: Verbosity,

    /// Environment exported to every command
    pub env: BTreeMap<String, String>,
}

type OnceSlot = Arc<OnceCell<ExecutionResult<()>>>;

/// Single-result slots for `once` steps, keyed by task name
#[derive(Default)]
struct OnceBarrier {
    slots: Mutex<HashMap<String, OnceSlot>>,
}

impl OnceBarrier {
    fn slot(&self, task: &str) -> OnceSlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(task.to_string()).or_default())
    }
}

/// State shared by all host workers of one run
struct Shared {
    runner: Arc<dyn CommandRunner>,
    global: Arc<Store>,
    overrides: Arc<Store>,
    options: ExecutorOptions,
    barrier: OnceBarrier,

    /// Cancelled by the caller (e.g. on Ctrl-C); also stops started steps
    /// before their next command
    user_cancel: CancellationToken,

    /// Cancelled by the caller or by the fleet failure policy; checked only
    /// between steps
    run_cancel: CancellationToken,
}

/// Runs execution plans against their hosts
pub struct Executor {
    runner: Arc<dyn CommandRunner>,
    global: Arc<Store>,
    overrides: Arc<Store>,
    options: ExecutorOptions,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(runner: Arc<dyn CommandRunner>, global: Arc<Store>) -> Self {
        Executor {
            runner,
            global,
            overrides: Arc::new(Store::new()),
            options: ExecutorOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Values that win over every host's own configuration
    pub fn with_overrides(mut self, overrides: Arc<Store>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Use an externally controlled cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a plan on all of its hosts
    pub async fn run(&self, plan: &ExecutionPlan) -> RunReport {
        let started = Instant::now();
        let hosts = plan.hosts().to_vec();
        let plan = Arc::new(plan.clone());
        let shared = Arc::new(Shared {
            runner: Arc::clone(&self.runner),
            global: Arc::clone(&self.global),
            overrides: Arc::clone(&self.overrides),
            options: self.options.clone(),
            barrier: OnceBarrier::default(),
            user_cancel: self.cancel.clone(),
            run_cancel: self.cancel.child_token(),
        });

        let limit = self.options.limit.unwrap_or(hosts.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        tracing::info!(
            task = %plan.root(),
            hosts = hosts.len(),
            limit,
            dry_run = self.options.dry_run,
            "starting run"
        );

        let handles: Vec<_> = hosts
            .iter()
            .map(|host| {
                let worker = HostWorker {
                    host: Arc::clone(host),
                    plan: Arc::clone(&plan),
                    shared: Arc::clone(&shared),
                };
                let semaphore = Arc::clone(&semaphore);
                let span = tracing::info_span!("host", host = %host.alias);
                tokio::spawn(
                    async move {
                        let _permit = semaphore.acquire_owned().await.ok();
                        worker.run().await
                    }
                    .instrument(span),
                )
            })
            .collect();

        let results = join_all(handles).await;
        let reports = results
            .into_iter()
            .zip(hosts.iter())
            .map(|(result, host)| match result {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(host = %host.alias, error = %e, "host worker aborted");
                    let mut report = HostReport::new(host.alias.clone());
                    report.status = HostStatus::Failed;
                    report.error = Some(ExecutionError::Action(format!("host worker aborted: {}", e)));
                    report
                }
            })
            .collect();

        RunReport {
            task: plan.root().to_string(),
            hosts: reports,
            dry_run: self.options.dry_run,
            duration: started.elapsed(),
        }
    }
}

/// Walks one host's steps
struct HostWorker {
    host: Arc<Host>,
    plan: Arc<ExecutionPlan>,
    shared: Arc<Shared>,
}

impl HostWorker {
    async fn run(self) -> HostReport {
        let started = Instant::now();
        let mut report = HostReport::new(self.host.alias.clone());
        let config = Arc::new(
            HostConfig::new(Arc::clone(&self.host), Arc::clone(&self.shared.global))
                .with_overrides(Arc::clone(&self.shared.overrides)),
        );

        for step in self.plan.steps_for(&self.host.alias) {
            if self.shared.run_cancel.is_cancelled() {
                tracing::info!(task = %step.name(), "cancelled before step");
                report.status = HostStatus::Cancelled;
                report.error = Some(ExecutionError::Cancelled);
                break;
            }

            let step_started = Instant::now();
            let (result, shared) = match &step.target {
                Target::Global => self.run_once(&step, &config).await,
                Target::Host(_) => (self.run_step(&step.task, &config).await, false),
            };

            report.steps.push(StepRecord {
                task: step.name().to_string(),
                target: step.target.clone(),
                status: match &result {
                    Ok(()) => StepStatus::Succeeded,
                    Err(e) => StepStatus::Failed(e.clone()),
                },
                shared,
                handler: false,
                duration: step_started.elapsed(),
            });

            if let Err(err) = result {
                if is_cancelled(&err) {
                    report.status = HostStatus::Cancelled;
                    report.error = Some(err);
                    break;
                }

                tracing::error!(task = %step.name(), error = %err, "step failed");
                report.status = HostStatus::Failed;
                report.failed_step = Some(step.name().to_string());
                report.error = Some(err.clone());

                if self.shared.options.failure_policy == FailurePolicy::AbortFleet {
                    tracing::warn!("aborting remaining hosts");
                    self.shared.run_cancel.cancel();
                }

                self.run_fail_handlers(&step, &err, &config, &mut report).await;
                break;
            }
        }

        report.duration = started.elapsed();
        tracing::info!(status = %report.status, "host finished");
        report
    }

    /// Execute a `once` step, or wait for the host that does
    async fn run_once(&self, step: &Step, config: &Arc<HostConfig>) -> (ExecutionResult<()>, bool) {
        self.through_barrier(step.name(), self.run_step(&step.task, config))
            .await
    }

    /// Resolve `execute` through the once barrier slot named `key`
    ///
    /// Returns the outcome and whether it was produced by another host.
    async fn through_barrier<F>(&self, key: &str, execute: F) -> (ExecutionResult<()>, bool)
    where
        F: Future<Output = ExecutionResult<()>>,
    {
        let slot = self.shared.barrier.slot(key);
        let executed = AtomicBool::new(false);
        let executed_ref = &executed;

        let result = slot
            .get_or_init(|| async move {
                executed_ref.store(true, Ordering::SeqCst);
                execute.await
            })
            .await
            .clone();

        let shared = !executed.load(Ordering::SeqCst);
        if shared {
            tracing::debug!(task = %key, "reusing once outcome");
        }
        (result, shared)
    }

    /// Build a step context; only the caller's token interrupts a started step
    fn context(&self, task: &Task, config: &Arc<HostConfig>) -> Context {
        let options = &self.shared.options;
        Context::new(Arc::clone(config), Arc::clone(&self.shared.runner))
            .with_env(options.env.clone())
            .with_dry_run(options.dry_run)
            .with_verbosity(options.verbosity)
            .with_task(task.name.clone())
            .with_cancellation(self.shared.user_cancel.clone())
    }

    async fn run_step(&self, task: &Task, config: &Arc<HostConfig>) -> ExecutionResult<()> {
        let mut ctx = self.context(task, config);
        Self::execute(task, &mut ctx).await
    }

    async fn execute(task: &Task, ctx: &mut Context) -> ExecutionResult<()> {
        ctx.print_task_start(&task.name);
        tracing::debug!(task = %task.name, "step started");
        let result = match &task.body {
            TaskBody::Action(action) => action.run(ctx).await,
            TaskBody::Group(_) => Ok(()),
        };
        if let Err(e) = &result {
            ctx.print_error(&e.to_string());
        } else {
            tracing::debug!(task = %task.name, "step finished");
        }
        result
    }

    /// Run the `fail` handlers for a failed step on this host
    ///
    /// The failing task and error are exposed to handlers as the
    /// `failed_task` and `error` configuration keys.
    async fn run_fail_handlers(
        &self,
        step: &Step,
        err: &ExecutionError,
        config: &Arc<HostConfig>,
        report: &mut HostReport,
    ) {
        let handlers = self.plan.fail_handlers_for(step);
        if handlers.is_empty() {
            return;
        }

        config.set("failed_task", step.name());
        config.set("error", err.to_string());

        for handler in handlers {
            if self.shared.user_cancel.is_cancelled() {
                break;
            }

            let started = Instant::now();
            let (result, shared) = if handler.task.is_once() {
                let key = format!("fail:{}", handler.name());
                self.through_barrier(&key, self.run_step(&handler.task, config))
                    .await
            } else {
                (self.run_step(&handler.task, config).await, false)
            };

            report.steps.push(StepRecord {
                task: handler.name().to_string(),
                target: Target::Host(self.host.alias.clone()),
                status: match &result {
                    Ok(()) => StepStatus::Succeeded,
                    Err(e) => StepStatus::Failed(e.clone()),
                },
                shared,
                handler: true,
                duration: started.elapsed(),
            });

            if let Err(handler_err) = result {
                tracing::warn!(task = %handler.name(), error = %handler_err, "fail handler failed");
                report
                    .handler_errors
                    .push((handler.name().to_string(), handler_err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{HookGraph, Planner, Registry, TaskOptions};
    use crate::runner::{CommandOutput, Location, RunOptions, ScriptAction, ScriptItem};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Records commands instead of running them; commands containing
    /// "fail" exit non-zero and commands containing "slow" take 50ms
    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<(String, String)>>,
        delay: Option<Duration>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl RecordingRunner {
        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn commands_for(&self, host: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|(h, _)| h == host)
                .map(|(_, c)| c)
                .collect()
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

            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if command.contains("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if command.contains("fail") {
                return Err(ExecutionError::CommandFailed {
                    command: command.to_string(),
                    exit_code: Some(1),
                    output: String::new(),
                });
            }
            Ok(CommandOutput::default())
        }
    }

    fn task(registry: &mut Registry, name: &str, command: &str, options: TaskOptions) {
        let action = ScriptAction::new(vec![ScriptItem::run(command)]);
        registry.register(name, TaskBody::action(action), options);
    }

    fn hosts(aliases: &[&str]) -> Vec<Arc<Host>> {
        aliases.iter().map(|a| Arc::new(Host::new(*a))).collect()
    }

    fn executor(runner: &Arc<RecordingRunner>, options: ExecutorOptions) -> Executor {
        let runner: Arc<dyn CommandRunner> = runner.clone();
        Executor::new(runner, Arc::new(Store::new())).with_options(ExecutorOptions {
            verbosity: Verbosity::Silent,
            ..options
        })
    }

    fn deploy_registry() -> (Registry, HookGraph) {
        let mut registry = Registry::new();
        task(&mut registry, "deploy:prepare", "prepare {{alias}}", TaskOptions::new());
        task(&mut registry, "deploy:publish", "publish {{alias}}", TaskOptions::new());
        task(&mut registry, "git:tag", "git tag", TaskOptions::new().once());
        registry.register(
            "deploy",
            TaskBody::group(["deploy:prepare", "deploy:publish"]),
            TaskOptions::new(),
        );
        let mut hooks = HookGraph::new();
        hooks.after("deploy", "git:tag");
        (registry, hooks)
    }

    #[tokio::test]
    async fn test_steps_run_in_order_per_host() {
        let (registry, hooks) = deploy_registry();
        let plan = Planner::new(&registry, &hooks)
            .plan("deploy", &hosts(&["h1"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());

        let report = executor(&runner, ExecutorOptions::default()).run(&plan).await;

        assert!(report.is_success());
        assert_eq!(
            runner.commands_for("h1"),
            vec!["prepare h1", "publish h1", "git tag"]
        );
        assert_eq!(
            report.host("h1").unwrap().executed(),
            vec!["deploy:prepare", "deploy:publish", "git:tag"]
        );
    }

    #[tokio::test]
    async fn test_once_step_runs_a_single_time() {
        let (registry, hooks) = deploy_registry();
        let plan = Planner::new(&registry, &hooks)
            .plan("deploy", &hosts(&["h1", "h2"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());

        let report = executor(&runner, ExecutorOptions::default()).run(&plan).await;

        assert!(report.is_success());
        let tags = runner.calls().iter().filter(|(_, c)| c == "git tag").count();
        assert_eq!(tags, 1);

        let shared: Vec<bool> = report
            .hosts
            .iter()
            .map(|h| h.steps.iter().find(|s| s.task == "git:tag").unwrap().shared)
            .collect();
        assert_eq!(shared.iter().filter(|s| !**s).count(), 1);
        assert_eq!(shared.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_once_step_fails_every_host() {
        let mut registry = Registry::new();
        task(&mut registry, "build", "fail build", TaskOptions::new().once());
        let hooks = HookGraph::new();
        let plan = Planner::new(&registry, &hooks)
            .plan("build", &hosts(&["h1", "h2"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());

        let report = executor(&runner, ExecutorOptions::default()).run(&plan).await;

        assert_eq!(runner.calls().len(), 1);
        assert_eq!(report.failed_hosts().len(), 2);
        for host in &report.hosts {
            assert_eq!(host.failed_step.as_deref(), Some("build"));
        }
    }

    #[tokio::test]
    async fn test_failure_runs_fail_handlers_and_halts_host() {
        let mut registry = Registry::new();
        task(&mut registry, "deploy:prepare", "prepare", TaskOptions::new());
        task(&mut registry, "deploy:publish", "fail publish", TaskOptions::new());
        task(&mut registry, "deploy:cleanup", "cleanup", TaskOptions::new());
        task(&mut registry, "deploy:failed", "rollback {{failed_task}}", TaskOptions::new());
        registry.register(
            "deploy",
            TaskBody::group(["deploy:prepare", "deploy:publish", "deploy:cleanup"]),
            TaskOptions::new(),
        );
        let mut hooks = HookGraph::new();
        hooks.fail("deploy", "deploy:failed");

        let plan = Planner::new(&registry, &hooks)
            .plan("deploy", &hosts(&["h1"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let report = executor(&runner, ExecutorOptions::default()).run(&plan).await;

        assert_eq!(
            runner.commands_for("h1"),
            vec!["prepare", "fail publish", "rollback deploy:publish"]
        );
        let h1 = report.host("h1").unwrap();
        assert_eq!(h1.status, HostStatus::Failed);
        assert_eq!(h1.failed_step.as_deref(), Some("deploy:publish"));
        assert!(h1.steps.last().unwrap().handler);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_handler_error_keeps_original_failure() {
        let mut registry = Registry::new();
        task(&mut registry, "deploy", "fail deploy", TaskOptions::new());
        task(&mut registry, "unlock", "fail unlock", TaskOptions::new());
        let mut hooks = HookGraph::new();
        hooks.fail("deploy", "unlock");

        let plan = Planner::new(&registry, &hooks)
            .plan("deploy", &hosts(&["h1"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let report = executor(&runner, ExecutorOptions::default()).run(&plan).await;

        let h1 = report.host("h1").unwrap();
        assert_eq!(h1.failed_step.as_deref(), Some("deploy"));
        assert!(matches!(
            &h1.error,
            Some(ExecutionError::CommandFailed { command, .. }) if command == "fail deploy"
        ));
        assert_eq!(h1.handler_errors.len(), 1);
        assert_eq!(h1.handler_errors[0].0, "unlock");
    }

    #[tokio::test]
    async fn test_other_hosts_continue_by_default() {
        let mut registry = Registry::new();
        task(&mut registry, "check", "test {{alias}}", TaskOptions::new());
        task(&mut registry, "publish", "publish {{alias}}", TaskOptions::new());
        registry.register("deploy", TaskBody::group(["check", "publish"]), TaskOptions::new());
        let hooks = HookGraph::new();

        let plan = Planner::new(&registry, &hooks)
            .plan("deploy", &hosts(&["fail1", "ok1"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let report = executor(&runner, ExecutorOptions::default()).run(&plan).await;

        assert_eq!(report.host("fail1").unwrap().status, HostStatus::Failed);
        assert_eq!(report.host("ok1").unwrap().status, HostStatus::Succeeded);
        assert_eq!(runner.commands_for("ok1"), vec!["test ok1", "publish ok1"]);
    }

    #[tokio::test]
    async fn test_abort_fleet_stops_other_hosts() {
        let mut registry = Registry::new();
        task(&mut registry, "check", "test {{alias}}", TaskOptions::new());
        task(&mut registry, "publish", "publish {{alias}}", TaskOptions::new());
        registry.register("deploy", TaskBody::group(["check", "publish"]), TaskOptions::new());
        let hooks = HookGraph::new();

        let plan = Planner::new(&registry, &hooks)
            .plan("deploy", &hosts(&["fail1", "ok1"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());
        // One host at a time, so the failing host finishes before the other starts
        let options = ExecutorOptions {
            limit: Some(1),
            failure_policy: FailurePolicy::AbortFleet,
            ..Default::default()
        };
        let report = executor(&runner, options).run(&plan).await;

        assert_eq!(report.host("fail1").unwrap().status, HostStatus::Failed);
        assert_eq!(report.host("ok1").unwrap().status, HostStatus::Cancelled);
        assert!(runner.commands_for("ok1").is_empty());
    }

    #[tokio::test]
    async fn test_abort_fleet_lets_started_steps_finish() {
        let mut registry = Registry::new();
        let action = ScriptAction::new(vec![
            ScriptItem::run("start {{alias}}"),
            ScriptItem::run("finish {{alias}}"),
        ]);
        registry.register("release", TaskBody::action(action), TaskOptions::new());
        task(&mut registry, "publish", "publish {{alias}}", TaskOptions::new());
        registry.register("deploy", TaskBody::group(["release", "publish"]), TaskOptions::new());
        let hooks = HookGraph::new();

        // slow1 is mid-way through `release` when fail1 fails
        let plan = Planner::new(&registry, &hooks)
            .plan("deploy", &hosts(&["slow1", "fail1"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let options = ExecutorOptions {
            failure_policy: FailurePolicy::AbortFleet,
            ..Default::default()
        };
        let report = executor(&runner, options).run(&plan).await;

        assert_eq!(report.host("fail1").unwrap().status, HostStatus::Failed);
        assert_eq!(
            runner.commands_for("slow1"),
            vec!["start slow1", "finish slow1"]
        );
        let slow1 = report.host("slow1").unwrap();
        assert_eq!(slow1.executed(), vec!["release"]);
        assert_eq!(slow1.steps[0].status, StepStatus::Succeeded);
        assert_eq!(slow1.status, HostStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_once_fail_handler_runs_a_single_time() {
        let mut registry = Registry::new();
        task(&mut registry, "deploy", "fail {{alias}}", TaskOptions::new());
        task(&mut registry, "unlock", "unlock {{alias}}", TaskOptions::new());
        task(&mut registry, "notify:failed", "notify", TaskOptions::new().once());
        let mut hooks = HookGraph::new();
        hooks.fail("deploy", "unlock");
        hooks.fail("deploy", "notify:failed");

        let plan = Planner::new(&registry, &hooks)
            .plan("deploy", &hosts(&["h1", "h2"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let report = executor(&runner, ExecutorOptions::default()).run(&plan).await;

        let notified = runner.calls().iter().filter(|(_, c)| c == "notify").count();
        assert_eq!(notified, 1);
        assert_eq!(runner.commands_for("h1")[1], "unlock h1");
        assert_eq!(runner.commands_for("h2")[1], "unlock h2");

        let records: Vec<_> = report
            .hosts
            .iter()
            .map(|h| h.steps.iter().find(|s| s.task == "notify:failed").unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.handler && r.status == StepStatus::Succeeded));
        assert_eq!(records.iter().filter(|r| r.shared).count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let (registry, hooks) = deploy_registry();
        let plan = Planner::new(&registry, &hooks)
            .plan("deploy", &hosts(&["h1", "h2"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let token = CancellationToken::new();
        token.cancel();

        let report = executor(&runner, ExecutorOptions::default())
            .with_cancellation(token)
            .run(&plan)
            .await;

        assert!(runner.calls().is_empty());
        assert!(report.hosts.iter().all(|h| h.status == HostStatus::Cancelled));
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_limit_bounds_parallel_hosts() {
        let mut registry = Registry::new();
        task(&mut registry, "deploy", "deploy {{alias}}", TaskOptions::new());
        let hooks = HookGraph::new();
        let plan = Planner::new(&registry, &hooks)
            .plan("deploy", &hosts(&["h1", "h2", "h3", "h4"]))
            .unwrap();

        let runner = Arc::new(RecordingRunner {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let options = ExecutorOptions {
            limit: Some(2),
            ..Default::default()
        };
        let report = executor(&runner, options).run(&plan).await;

        assert!(report.is_success());
        assert_eq!(runner.calls().len(), 4);
        assert!(runner.max_running.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_plan_succeeds() {
        let mut registry = Registry::new();
        registry.register("noop", TaskBody::group(Vec::<String>::new()), TaskOptions::new());
        let hooks = HookGraph::new();
        let plan = Planner::new(&registry, &hooks)
            .plan("noop", &hosts(&["h1"]))
            .unwrap();
        let runner = Arc::new(RecordingRunner::default());

        let report = executor(&runner, ExecutorOptions::default()).run(&plan).await;
        assert!(report.is_success());
        assert!(report.host("h1").unwrap().steps.is_empty());
    }
}
