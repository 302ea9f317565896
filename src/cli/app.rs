//! Main CLI application

use crate::error::{ConfigError, ConfigResult, DeployerError};
use crate::recipe::Recipe;
use crate::runner::{CommandRunner, ExecutorOptions, FailurePolicy, Verbosity};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use colored::Colorize;
use globset::Glob;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Subcommands that are not tasks; they win over tasks with the same name
const BUILTIN_COMMANDS: &[&str] = &["list", "tree", "plan", "completion", "help"];

/// CLI application
pub struct App {
    /// The clap command
    command: Command,
    /// Loaded recipe
    recipe: Recipe,
    /// Recipe file path
    recipe_path: Option<PathBuf>,
}

impl App {
    /// Create a new app from the recipe found in the current directory or its parents
    pub fn new() -> Result<Self, DeployerError> {
        let (recipe, path) = Recipe::discover()?;
        Ok(App::from_recipe(recipe, Some(path)))
    }

    /// Create app with a specific recipe file
    pub fn with_recipe_file(path: PathBuf) -> Result<Self, DeployerError> {
        let recipe = Recipe::load(&path)?;
        Ok(App::from_recipe(recipe, Some(path)))
    }

    /// Create app around an already built recipe
    pub fn from_recipe(recipe: Recipe, recipe_path: Option<PathBuf>) -> Self {
        let command = build_command(&recipe);
        App {
            command,
            recipe,
            recipe_path,
        }
    }

    pub fn recipe_path(&self) -> Option<&PathBuf> {
        self.recipe_path.as_ref()
    }

    /// Run the application with the process arguments, returning the exit code
    pub async fn run(self) -> Result<i32, DeployerError> {
        let matches = self.command.clone().get_matches();
        self.dispatch(matches).await
    }

    /// Run the application with explicit arguments
    pub async fn run_from<I, T>(self, args: I) -> Result<i32, DeployerError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = self.command.clone().get_matches_from(args);
        self.dispatch(matches).await
    }

    async fn dispatch(mut self, matches: ArgMatches) -> Result<i32, DeployerError> {
        let verbosity = get_verbosity(&matches);

        let (name, sub_matches) = match matches.subcommand() {
            Some((name, sub_matches)) => (name.to_string(), sub_matches.clone()),
            None => {
                self.command.print_help()?;
                println!();
                return Ok(0);
            }
        };

        match name.as_str() {
            "list" => {
                self.list(sub_matches.get_one::<String>("pattern").map(String::as_str))?;
                Ok(0)
            }
            "tree" => {
                let task = required_arg(&sub_matches, "task")?;
                print!("{}", self.recipe.planner().tree(task)?.render());
                Ok(0)
            }
            "plan" => {
                let task = required_arg(&sub_matches, "task")?;
                let selector = sub_matches
                    .get_one::<String>("selector")
                    .map(String::as_str)
                    .unwrap_or("");
                self.print_plan(task, selector)?;
                Ok(0)
            }
            "completion" => {
                if let Some(shell) = sub_matches.get_one::<Shell>("shell") {
                    let bin_name = self.command.get_name().to_string();
                    clap_complete::generate(*shell, &mut self.command, bin_name, &mut io::stdout());
                }
                Ok(0)
            }
            task => self.run_task(task, &sub_matches, verbosity).await,
        }
    }

    /// Print visible tasks, optionally filtered by a glob
    fn list(&self, pattern: Option<&str>) -> Result<(), DeployerError> {
        let matcher = match pattern {
            Some(pattern) => Some(
                Glob::new(pattern)
                    .map_err(|e| ConfigError::Invalid(format!("invalid pattern '{}': {}", pattern, e)))?
                    .compile_matcher(),
            ),
            None => None,
        };

        let tasks: Vec<_> = self
            .recipe
            .registry()
            .list_visible()
            .into_iter()
            .filter(|t| matcher.as_ref().map_or(true, |m| m.is_match(&t.name)))
            .collect();
        let width = tasks.iter().map(|t| t.name.len()).max().unwrap_or(0);

        println!("{}", "Available tasks:".bold());
        for task in &tasks {
            let name = format!("{:width$}", task.name, width = width);
            println!("  {}  {}", name.green(), task.description().unwrap_or(""));
        }
        Ok(())
    }

    fn print_plan(&self, task: &str, selector: &str) -> Result<(), DeployerError> {
        let plan = self.recipe.plan(task, selector)?;
        let steps = plan.steps();
        let width = steps.len().to_string().len();

        for (i, step) in steps.iter().enumerate() {
            println!(
                "{:>width$}. {} {}",
                i + 1,
                step.name(),
                format!("[{}]", step.target).cyan(),
                width = width
            );
        }
        Ok(())
    }

    async fn run_task(
        &self,
        task: &str,
        matches: &ArgMatches,
        verbosity: Verbosity,
    ) -> Result<i32, DeployerError> {
        if let Some(raw) = matches.get_many::<String>("option") {
            for raw in raw {
                let (key, value) = parse_override(raw)?;
                self.recipe.set_override(key, value);
            }
        }

        let selector = matches
            .get_one::<String>("selector")
            .map(String::as_str)
            .unwrap_or("");
        let plan = self.recipe.plan(task, selector)?;

        let options = ExecutorOptions {
            dry_run: matches.get_flag("dry-run"),
            limit: matches.get_one::<usize>("limit").copied(),
            failure_policy: if matches.get_flag("fail-fast") {
                FailurePolicy::AbortFleet
            } else {
                FailurePolicy::Continue
            },
            verbosity,
            env: BTreeMap::new(),
        };
        let runner: Arc<dyn CommandRunner> = Arc::new(self.recipe.runner());
        let executor = self.recipe.executor(runner, options);

        let cancel = executor.cancellation_token();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping before the next command");
                cancel.cancel();
            }
        });

        let report = executor.run(&plan).await;
        interrupt.abort();

        if verbosity > Verbosity::Silent {
            print!("{}", report.render());
        }
        Ok(report.exit_code())
    }
}

/// Build the clap command from the recipe
fn build_command(recipe: &Recipe) -> Command {
    let mut cmd = Command::new("dep")
        .version(env!("CARGO_PKG_VERSION"))
        .about(match &recipe.name {
            Some(name) => format!("Deploy {}", name),
            None => "A task graph executor for multi-host deployments".to_string(),
        })
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to deploy.yml recipe")
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("list")
                .about("List available tasks")
                .arg(Arg::new("pattern").value_name("PATTERN").help("Only tasks matching this glob")),
        )
        .subcommand(
            Command::new("tree")
                .about("Show the task tree with its hooks")
                .arg(Arg::new("task").value_name("TASK").required(true)),
        )
        .subcommand(
            Command::new("plan")
                .about("Show the execution plan of a task")
                .arg(Arg::new("task").value_name("TASK").required(true))
                .arg(selector_arg()),
        )
        .subcommand(
            Command::new("completion")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .value_name("SHELL")
                        .required(true)
                        .value_parser(value_parser!(Shell)),
                ),
        );

    for task in recipe.registry().all() {
        if BUILTIN_COMMANDS.contains(&task.name.as_str()) {
            tracing::warn!(task = %task.name, "task shadowed by a built-in command");
            continue;
        }

        let mut task_cmd = Command::new(task.name.clone())
            .about(task.description().unwrap_or_default().to_string())
            .hide(!task.is_visible())
            .arg(selector_arg())
            .arg(
                Arg::new("dry-run")
                    .long("dry-run")
                    .help("Print commands instead of executing them")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("limit")
                    .long("limit")
                    .value_name("N")
                    .help("Run on at most N hosts at a time")
                    .value_parser(value_parser!(usize)),
            )
            .arg(
                Arg::new("fail-fast")
                    .long("fail-fast")
                    .help("Stop every host once one host fails")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("option")
                    .short('o')
                    .long("option")
                    .value_name("KEY=VALUE")
                    .help("Set a configuration value on every host, over host config")
                    .action(ArgAction::Append),
            );

        if task.is_group() {
            task_cmd = task_cmd.long_about(format!(
                "{}\n\nRuns: {}",
                task.description().unwrap_or_default(),
                task.members().join(", ")
            ));
        }

        cmd = cmd.subcommand(task_cmd);
    }

    cmd
}

fn selector_arg() -> Arg {
    Arg::new("selector")
        .value_name("SELECTOR")
        .help("Hosts to run on: aliases, globs or label=value, comma separated")
}

fn required_arg<'a>(matches: &'a ArgMatches, name: &str) -> ConfigResult<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::Invalid(format!("missing argument '{}'", name)))
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Parse a `key=value` override; the value is read as YAML
fn parse_override(raw: &str) -> ConfigResult<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ConfigError::Invalid(format!("option '{}' must be key=value", raw)))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::Invalid(format!("option '{}' has an empty key", raw)));
    }

    let value = match serde_yaml::from_str::<Value>(value) {
        Ok(Value::Null) if value.trim().is_empty() => Value::String(String::new()),
        Ok(parsed) => parsed,
        Err(_) => Value::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}

/// Install the tracing subscriber; `RUST_LOG` wins over the CLI flags
fn init_tracing(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Silent | Verbosity::Quiet => "error",
        Verbosity::Normal => "warn",
        Verbosity::Verbose => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Run the CLI application, returning the process exit code
pub async fn run() -> Result<i32, DeployerError> {
    // Logging and the recipe file are needed before clap can parse,
    // since tasks become subcommands
    let args: Vec<String> = std::env::args().collect();
    init_tracing(extract_verbosity(&args));

    let app = if let Some(path) = extract_file_arg(&args) {
        App::with_recipe_file(path)?
    } else {
        App::new()?
    };

    app.run().await
}

/// Extract --file argument before clap parsing
fn extract_file_arg(args: &[String]) -> Option<PathBuf> {
    for i in 0..args.len() {
        if let Some(path) = args[i].strip_prefix("--file=") {
            return Some(PathBuf::from(path));
        }
        if (args[i] == "--file" || args[i] == "-f") && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
    }
    None
}

/// Extract the verbosity flags before clap parsing
fn extract_verbosity(args: &[String]) -> Verbosity {
    let has = |short: &str, long: &str| args.iter().any(|a| a == short || a == long);
    if has("-s", "--silent") {
        Verbosity::Silent
    } else if has("-q", "--quiet") {
        Verbosity::Quiet
    } else if has("-v", "--verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}
