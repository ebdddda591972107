use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use cascade_bench::arena::ArenaRunner;
use cascade_bench::config::{BenchmarkConfig, ResolvedOutputs};
use cascade_bench::logging::init_logging;

/// Self-play harness for the cascade decision core.
#[derive(Debug, Parser)]
#[command(
    name = "cascade-bench",
    author,
    version,
    about = "Deterministic self-play harness for cascade agents"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "bench/cascade.yaml")]
    config: PathBuf,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the number of games to play.
    #[arg(long, value_name = "GAMES")]
    games: Option<usize>,

    /// Override the RNG seed for deals.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Exit after validating the configuration (no games are played).
    #[arg(long)]
    validate_only: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = BenchmarkConfig::from_path(&cli.config)?;

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(games) = cli.games {
        config.games.count = games;
    }

    if let Some(seed) = cli.seed {
        config.games.seed = Some(seed);
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let agent_count = config.agents.len();
    let run_id = config.run_id.clone();
    let games = config.games.count;
    let table = config.games.agents_per_table;

    println!(
        "Loaded configuration '{run_id}' with {agent_count} agent{} ({games} games, {table} seats)",
        if agent_count == 1 { "" } else { "s" }
    );

    let logging_guard = init_logging(&config.logging, &outputs, &run_id)?;
    let runner = ArenaRunner::new(config, outputs).context("building arena")?;

    if cli.validate_only {
        println!("Validation-only mode: self-play skipped.");
        return Ok(());
    }

    let summary = runner.run().context("running self-play")?;
    println!(
        "Self-play complete for '{run_id}': {} games → {} rows at {}",
        summary.games_played,
        summary.rows_written,
        summary.jsonl_path.display()
    );
    println!("Summary: {}", summary.summary_path.display());
    for agent in &summary.summary.agents {
        println!(
            "  {:<12} {:>6} win {:>5.1}%  score {:>6.2} ± {:.2}  calls {} ({:.0}% won)  {:.2} ms/decision",
            agent.name,
            agent.difficulty,
            agent.win_rate * 100.0,
            agent.mean_score,
            agent.stddev_score,
            agent.calls,
            agent.call_success * 100.0,
            agent.average_ms_per_decision,
        );
    }
    if let Some(guard) = logging_guard.as_ref() {
        println!("Telemetry log: {}", guard.telemetry_path.display());
    }

    Ok(())
}
