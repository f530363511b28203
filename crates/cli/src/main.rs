//! `flowmark` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — validate a workflow JSON file.
//! - `run`      — execute a workflow JSON file against provided input.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use engine::{Scheduler, Workflow, default_registry, validate_dag};

#[derive(Parser)]
#[command(name = "flowmark", about = "Workflow execution engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
    },
    /// Run a workflow definition JSON file.
    Run {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
        /// Initial input as a JSON object.
        #[arg(long, default_value = "{}")]
        input: String,
    },
}

fn load_workflow(path: &std::path::Path) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).context("invalid workflow JSON")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let workflow = load_workflow(&path)?;
            match validate_dag(&workflow) {
                Ok(order) => {
                    println!("workflow is valid; execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run { path, input } => {
            let workflow = load_workflow(&path)?;
            let initial_data: serde_json::Value =
                serde_json::from_str(&input).context("invalid --input JSON")?;

            info!("running workflow '{}'", workflow.name);
            let scheduler = Scheduler::new(default_registry());
            let record = scheduler.run(&workflow, initial_data).await?;

            println!("{}", serde_json::to_string_pretty(&record)?);
            if record.status.is_aborted() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
