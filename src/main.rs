//! menv: graph-aware curriculum learning
//!
//! Provides subcommands around a curriculum configuration:
//!
//! - `simulate`     -- Run the curriculum against simulated learners and save a report
//! - `graph`        -- Print the task graph of a configuration
//! - `init-config`  -- Write the default configuration as JSON
//! - `inspect`      -- Summarize a saved run report

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use menv::config::CurriculumConfig;
use menv::env::{Environment, RenderMode};
use menv::graph::TaskGraph;
use menv::training::{RunReport, TrainingPipeline};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// menv: graph-aware curriculum learning
#[derive(Parser)]
#[command(name = "menv", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the curriculum loop with a simulated learner.
    Simulate {
        /// Override the number of rounds from the configuration.
        #[arg(long)]
        rounds: Option<usize>,

        /// Override the random seed from the configuration.
        #[arg(long)]
        seed: Option<u64>,

        /// Path to save the run report.
        #[arg(long, default_value = "runs/report.json")]
        output: PathBuf,

        /// Render the last active task when the run ends.
        #[arg(long)]
        render: Option<RenderMode>,
    },

    /// Print the task graph: topological order, roots, leaves, ancestors.
    Graph {
        /// Print the summary as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Write the default configuration to a file.
    InitConfig {
        /// Destination path.
        #[arg(default_value = "menv.json")]
        output: PathBuf,
    },

    /// Summarize a saved run report.
    Inspect {
        /// Path to the run report JSON file.
        #[arg(default_value = "runs/report.json")]
        path: PathBuf,

        /// Number of trailing rounds to list.
        #[arg(long, default_value_t = 10)]
        last: usize,
    },
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CurriculumConfig::default(),
    };

    match cli.command {
        Commands::Simulate {
            rounds,
            seed,
            output,
            render,
        } => cmd_simulate(config, rounds, seed, &output, render).await,
        Commands::Graph { json } => cmd_graph(&config, json),
        Commands::InitConfig { output } => cmd_init_config(&output),
        Commands::Inspect { path, last } => cmd_inspect(&path, last),
    }
}

fn load_config(path: &Path) -> Result<CurriculumConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config = serde_json::from_str::<CurriculumConfig>(&text)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config in {}", path.display()))?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_simulate(
    mut config: CurriculumConfig,
    rounds: Option<usize>,
    seed: Option<u64>,
    output: &Path,
    render: Option<RenderMode>,
) -> Result<()> {
    if let Some(rounds) = rounds {
        config.training.rounds = rounds;
    }
    if let Some(seed) = seed {
        config.training.seed = seed;
    }

    let pipeline = TrainingPipeline::new(config)?;
    let mut env = pipeline.build_env()?;
    let mut learner = pipeline.build_learner()?;
    let report = pipeline.run_with(&mut env, &mut learner).await?;

    report.save_to_file(output)?;

    if let Some(mode) = render {
        if let Some(frame) = env.render(mode)? {
            println!("{frame}");
        }
    }

    print_final_state(&report);
    Ok(())
}

fn cmd_graph(config: &CurriculumConfig, json: bool) -> Result<()> {
    let graph = TaskGraph::new(config.graph.num_tasks, &config.graph.edges)
        .context("Invalid task graph")?;
    let summary = graph.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Task graph: {} tasks, {} edges", summary.num_tasks, summary.edges.len());
    println!("  Topological order: {:?}", summary.topological_order);
    println!("  Roots: {:?}", summary.roots);
    println!("  Leaves: {:?}", summary.leaves);
    println!();
    for task in graph.nodes() {
        println!(
            "  task {task}: predecessors {:?}, successors {:?}, ancestors {:?}",
            graph.predecessors(task),
            graph.successors(task),
            graph.ancestors(task)
        );
    }
    Ok(())
}

fn cmd_init_config(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&CurriculumConfig::default())?;
    std::fs::write(output, json)
        .with_context(|| format!("Failed to write config to {}", output.display()))?;
    tracing::info!(path = %output.display(), "Wrote default configuration");
    Ok(())
}

fn cmd_inspect(path: &Path, last: usize) -> Result<()> {
    let report = RunReport::load_from_file(path)?;

    println!("Run report: {}", path.display());
    println!("  Run id: {}", report.run_id);
    println!(
        "  Started: {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(finished) = report.finished_at {
        println!("  Finished: {}", finished.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  Computer: {}", report.computer);
    println!(
        "  Tasks: {} (order {:?})",
        report.graph.num_tasks, report.graph.topological_order
    );
    println!("  Rounds: {}", report.rounds.len());
    println!();

    let skip = report.rounds.len().saturating_sub(last);
    println!("Last {} rounds:", report.rounds.len() - skip);
    for round in report.rounds.iter().skip(skip) {
        let mean = round
            .overall_return()
            .map_or_else(|| "-".to_string(), |m| format!("{m:.3}"));
        println!(
            "  round {:>4}  mean return {:>6}  dist {}",
            round.round,
            mean,
            format_vec(&round.dist)
        );
    }
    println!();

    print_final_state(&report);
    Ok(())
}

fn print_final_state(report: &RunReport) {
    if let Some(learner) = &report.learner {
        println!("Final learner state:");
        for (task, (c, n)) in learner.competence.iter().zip(&learner.episodes).enumerate() {
            println!("  task {task}: competence {c:.3} over {n} episodes");
        }
    }
}

fn format_vec(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.3}")).collect();
    format!("[{}]", parts.join(", "))
}
