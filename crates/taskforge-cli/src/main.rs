use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use taskforge_core::TaskforgeError;
use taskforge_orchestrator::{
    load_config, DecompositionContext, DecompositionStats, Orchestrator, OrchestratorConfig,
    TaskPlan, ValidationReport,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskforge", about = "Taskforge — Multi-Agent Task Scheduler")]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "TASKFORGE_CONFIG", default_value = "taskforge.toml")]
    config: PathBuf,

    /// Human-readable logs and indented JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a request and print the plan without executing it
    Plan {
        request: String,
        /// Constraint hints, e.g. "紧急"
        #[arg(short = 'C', long = "constraint")]
        constraints: Vec<String>,
    },
    /// Decompose a request and execute it with the simulated agents
    Run {
        request: String,
        #[arg(short = 'C', long = "constraint")]
        constraints: Vec<String>,
        /// Print every engine event as it happens
        #[arg(long)]
        watch: bool,
    },
    /// List the agent roster
    Agents,
    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct PlanReport<'a> {
    plan: &'a TaskPlan,
    stats: DecompositionStats,
    validation: ValidationReport,
}

/// Load the config file, or fall back to defaults when it does not exist.
fn resolve_config(path: &Path) -> anyhow::Result<OrchestratorConfig> {
    match load_config(path) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded configuration");
            Ok(config)
        }
        Err(TaskforgeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(OrchestratorConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load config '{}'", path.display())),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.pretty {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    }

    let config = resolve_config(&cli.config)?;

    match cli.command {
        Commands::Plan {
            request,
            constraints,
        } => {
            let orch = Orchestrator::new(config)?;
            let plan = orch.decompose(&request, &DecompositionContext::with_constraints(constraints));
            let report = PlanReport {
                stats: orch.decomposer().stats(&plan.tasks),
                validation: orch.decomposer().validate(&plan.tasks),
                plan: &plan,
            };
            print_json(&report, cli.pretty)?;
        }
        Commands::Run {
            request,
            constraints,
            watch,
        } => {
            let orch = Orchestrator::new(config)?;

            let watcher = watch.then(|| {
                let mut rx = orch.subscribe();
                let pretty = cli.pretty;
                tokio::spawn(async move {
                    while let Ok(event) = rx.recv().await {
                        if let Err(e) = print_json(&event, pretty) {
                            warn!(error = %e, "Could not print event");
                        }
                    }
                })
            });

            let result = orch
                .run(&request, constraints)
                .await
                .context("Orchestration failed")?;
            info!(summary = %result.summary, "Run finished");

            if let Some(watcher) = watcher {
                watcher.abort();
            }
            print_json(&result, cli.pretty)?;
        }
        Commands::Agents => {
            let orch = Orchestrator::new(config)?;
            print_json(&orch.agents().await, cli.pretty)?;
        }
        Commands::Config => {
            print_json(&config, cli.pretty)?;
        }
    }

    Ok(())
}
