use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use knowledge::{RewardLedger, TokenCounter};
use runtime::{
    build_participants, Generator, PromptLibrary, RoundCoordinator, RunConfig, RunReport,
    StubGenerator,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orchestra")]
#[command(about = "Round-based collaboration runner - turns, budgets, contribution scores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run collaboration rounds with the offline participants
    Run {
        /// Directory containing config/, memory/, output/ and rewards/
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,
        /// Override the number of rounds from settings.json
        #[arg(long)]
        rounds: Option<u32>,
    },
    /// Print the reward ledger
    Scores {
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { base_dir, rounds } => {
            let config = RunConfig::load(&base_dir)
                .with_context(|| format!("Failed to load configuration from {}", base_dir.display()))?;
            init_logging(&config.settings.log_level);
            tracing::info!(base_dir = %base_dir.display(), "Initialising orchestra");

            match run(&config, rounds) {
                Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                Err(e) => {
                    tracing::error!("Run halted: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Scores { base_dir } => {
            let config = RunConfig::load(&base_dir)
                .with_context(|| format!("Failed to load configuration from {}", base_dir.display()))?;
            let ledger = RewardLedger::load(config.paths().ledger_file)?;
            println!("{}", serde_json::to_string_pretty(ledger.snapshot())?);
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn run(config: &RunConfig, rounds_override: Option<u32>) -> Result<RunReport> {
    let prompts = Arc::new(PromptLibrary::load(config, tracing::info_span!("prompts")));
    let counter = Arc::new(TokenCounter::new()?);
    let participants = build_participants(&config.roster, prompts, |_| {
        Box::new(StubGenerator::new(Arc::clone(&counter))) as Box<dyn Generator>
    });

    let mut coordinator = RoundCoordinator::new(config, participants)?;
    let rounds = rounds_override.unwrap_or(config.settings.rounds);
    Ok(coordinator.run(rounds)?)
}
