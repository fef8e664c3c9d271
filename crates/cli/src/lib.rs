pub mod commands;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use harvest_core::config::{AppConfig, LoadOptions, LogFormat};

use commands::features::FeaturesArgs;
use commands::recommend::RecommendArgs;
use commands::train::TrainArgs;

#[derive(Debug, Parser)]
#[command(
    name = "harvest",
    about = "HarvestIQ repeat-purchase recommender",
    long_about = "Train repeat-purchase models from a transaction export, rank product recommendations for a customer, and inspect the feature pipeline.",
    after_help = "Examples:\n  harvest train --data data/transactions.csv --cutoff 2024-11-01\n  harvest recommend CUST_0001 --top-n 5\n  harvest features --window 7 > training_7d.csv\n  harvest config"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Config file (defaults to harvest.toml or config/harvest.toml)"
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Build features and labels, fit the models, and save the model bundle")]
    Train(TrainArgs),
    #[command(about = "Rank repeat-purchase recommendations for one customer")]
    Recommend(RecommendArgs),
    #[command(about = "Export the labeled training set for one window as CSV")]
    Features(FeaturesArgs),
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

/// Install the fmt subscriber on stderr so stdout only carries command payloads.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if let Ok(config) =
        AppConfig::load(LoadOptions { config_path: cli.config.clone(), ..LoadOptions::default() })
    {
        init_logging(&config);
    }

    let result = match &cli.command {
        Command::Train(args) => commands::train::run(cli.config.clone(), args),
        Command::Recommend(args) => commands::recommend::run(cli.config.clone(), args),
        Command::Features(args) => commands::features::run(cli.config.clone(), args),
        Command::Config => commands::config::run(cli.config.clone()),
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", result.output).context("failed to write command output")?;
    stdout.flush().context("failed to flush command output")?;
    Ok(ExitCode::from(result.exit_code))
}
