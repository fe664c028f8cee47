//! automate-me - local task launcher
//!
//! Thin command-line front end over the `automate_me` library.

use anyhow::{bail, Context};
use automate_me::config::{self, AppConfig, OutputFormat};
use automate_me::discovery::Warning;
use automate_me::dispatch;
use automate_me::inputs;
use automate_me::paths::{self, PathConfig, Scope};
use automate_me::plugins::{self, TaskRecord};
use automate_me::specs;
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "automate-me")]
#[command(author, version, about = "Discover plugin tasks and run them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List all tasks as `<pluginId:taskName>  <title>  <description>`
    List {
        /// Output format (overrides config)
        #[arg(long, value_parser = ["text", "json"])]
        format: Option<String>,
    },

    /// List resolved plugins with their scope and executable
    Plugins {
        /// Output format (overrides config)
        #[arg(long, value_parser = ["text", "json"])]
        format: Option<String>,
    },

    /// Run a task by its identifier
    Run {
        /// Task identifier, e.g. `greet:hello`
        task_id: String,

        /// Input value as name=value (repeatable)
        #[arg(short = 'a', long = "arg", value_name = "NAME=VALUE")]
        args: Vec<String>,

        /// Base arguments as a JSON object
        #[arg(long, value_name = "JSON")]
        args_json: Option<String>,
    },

    /// Import a spec file into the local or global specs directory
    Import {
        /// Path to the spec JSON file
        spec: PathBuf,

        /// Store in the repository's specs directory
        #[arg(long, conflicts_with = "global")]
        local: bool,

        /// Store in the user's global specs directory
        #[arg(long)]
        global: bool,
    },

    /// Show configuration and scope directories
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries listings and plugin output
    let filter = if cli.verbose {
        "automate_me=debug"
    } else {
        "automate_me=error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cwd = std::env::current_dir().context("resolve working directory")?;
    let repo_root = paths::find_repo_root(&cwd);
    debug!(cwd = ?cwd, repo_root = ?repo_root, "Resolved repository");
    let paths = PathConfig::new(repo_root)?;
    let config = config::load_config(paths.config_base()).context("load configuration")?;

    match cli.command {
        Commands::List { format } => cmd_list(&paths, output_format(&config, format)),
        Commands::Plugins { format } => cmd_plugins(&paths, output_format(&config, format)),
        Commands::Run {
            task_id,
            args,
            args_json,
        } => cmd_run(&paths, &cwd, &task_id, &args, args_json.as_deref()),
        Commands::Import {
            spec,
            local,
            global,
        } => cmd_import(&paths, &config, &spec, local, global),
        Commands::Config => cmd_config(&paths, &config),
    }
}

fn output_format(config: &AppConfig, flag: Option<String>) -> OutputFormat {
    match flag.as_deref() {
        Some("json") => OutputFormat::Json,
        Some(_) => OutputFormat::Text,
        None => config.output.format,
    }
}

fn report_warnings(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
}

/// Resolve plugins and return their tasks sorted by identifier.
fn load_tasks(paths: &PathConfig) -> anyhow::Result<Vec<TaskRecord>> {
    let resolution = plugins::load_plugins(paths)?;
    report_warnings(&resolution.warnings);
    let mut tasks = plugins::build_tasks(&resolution.plugins);
    if tasks.is_empty() {
        bail!("no tasks found");
    }
    plugins::sort_tasks(&mut tasks);
    Ok(tasks)
}

fn cmd_list(paths: &PathConfig, format: OutputFormat) -> anyhow::Result<()> {
    let tasks = load_tasks(paths)?;
    match format {
        OutputFormat::Text => {
            for task in &tasks {
                println!(
                    "{}\t{}\t{}",
                    task.id(),
                    task.task.title,
                    task.task.description.as_deref().unwrap_or_default()
                );
            }
        }
        OutputFormat::Json => {
            let entries: Vec<Value> = tasks
                .iter()
                .map(|task| {
                    let mut entry = serde_json::to_value(task)?;
                    entry["id"] = Value::String(task.id());
                    Ok(entry)
                })
                .collect::<Result<_, serde_json::Error>>()?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}

fn cmd_plugins(paths: &PathConfig, format: OutputFormat) -> anyhow::Result<()> {
    let resolution = plugins::load_plugins(paths)?;
    report_warnings(&resolution.warnings);
    let mut plugins = resolution.plugins;
    plugins.sort_by(|a, b| a.id().cmp(b.id()));

    match format {
        OutputFormat::Text => {
            if plugins.is_empty() {
                println!("no plugins found");
                return Ok(());
            }
            for plugin in &plugins {
                println!("{}\t{}\t{}", plugin.id(), plugin.scope, plugin.path.display());
            }
        }
        OutputFormat::Json => {
            let entries: Vec<Value> = plugins
                .iter()
                .map(|plugin| {
                    json!({
                        "id": plugin.id(),
                        "title": plugin.manifest.plugin.title,
                        "version": plugin.manifest.plugin.version,
                        "scope": plugin.scope,
                        "path": plugin.path,
                        "execMode": plugin.exec_mode,
                        "tasks": plugin.manifest.tasks.len(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}

fn cmd_run(
    paths: &PathConfig,
    cwd: &Path,
    task_id: &str,
    assignments: &[String],
    args_json: Option<&str>,
) -> anyhow::Result<()> {
    let tasks = load_tasks(paths)?;
    let Some(task) = plugins::find_task(&tasks, task_id) else {
        bail!("task not found: {}", task_id);
    };

    let base: Map<String, Value> = match args_json {
        Some(raw) => serde_json::from_str(raw).context("--args-json must be a JSON object")?,
        None => Map::new(),
    };
    let args = inputs::collect_args(&task.task, base, assignments)?;

    dispatch::run_task(task, paths.repo_root(), cwd, args)?;
    Ok(())
}

fn cmd_import(
    paths: &PathConfig,
    config: &AppConfig,
    spec: &Path,
    local: bool,
    global: bool,
) -> anyhow::Result<()> {
    let scope = if local {
        Scope::Local
    } else if global {
        Scope::Global
    } else {
        config
            .import
            .default_scope
            .resolve(paths.repo_root().is_some())
    };
    let stored = specs::import_spec(spec, paths, scope)?;
    let name = spec
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| spec.display().to_string());
    println!("imported {} -> {}", name, stored.display());
    Ok(())
}

fn cmd_config(paths: &PathConfig, config: &AppConfig) -> anyhow::Result<()> {
    println!("automate-me Configuration\n");
    println!(
        "Config file: {}",
        config::config_file_path(paths.config_base()).display()
    );
    println!("Output format: {:?}", config.output.format);
    println!("Import default scope: {:?}", config.import.default_scope);
    println!();
    println!(
        "Repo root: {}",
        paths
            .repo_root()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    for scope in [Scope::Local, Scope::Global] {
        match (paths.bin_dir(scope), paths.specs_dir(scope)) {
            (Ok(bin), Ok(specs)) => {
                println!("{}:", scope);
                println!("  bin:   {}", bin.display());
                println!("  specs: {}", specs.display());
            }
            _ => println!("{}: unavailable (no repo root)", scope),
        }
    }
    Ok(())
}
