use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Args;
use harvest_core::config::ConfigOverrides;
use harvest_core::{load_csv_path, ApplicationError, TrainingPipeline, TrainingReport};
use serde::Serialize;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Clone, Default, Args)]
pub struct TrainArgs {
    #[arg(long, help = "Transaction CSV export (defaults to data.transactions_path)")]
    pub data: Option<PathBuf>,
    #[arg(long, help = "Training cutoff date, YYYY-MM-DD (defaults to pipeline.cutoff_date)")]
    pub cutoff: Option<NaiveDate>,
    #[arg(long, help = "Where to write the model bundle (defaults to model.artifact_path)")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct TrainOutput {
    artifact_path: String,
    transactions: usize,
    training: TrainingReport,
}

pub fn run(config_path: Option<PathBuf>, args: &TrainArgs) -> CommandResult {
    let overrides = ConfigOverrides {
        transactions_path: args.data.clone(),
        cutoff_date: args.cutoff,
        artifact_path: args.output.clone(),
        ..ConfigOverrides::default()
    };
    let config = match load_config("train", config_path, overrides) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = (|| -> Result<TrainOutput, ApplicationError> {
        let snapshot = load_csv_path(&config.data.transactions_path)?;
        let pipeline = TrainingPipeline::new(config.model.training_options());
        let (bundle, training) = pipeline.train(&snapshot, config.pipeline.cutoff_date)?;
        bundle.save(&config.model.artifact_path)?;

        Ok(TrainOutput {
            artifact_path: config.model.artifact_path.display().to_string(),
            transactions: snapshot.len(),
            training,
        })
    })();

    match result {
        Ok(output) => CommandResult::report("train", &output),
        Err(error) => CommandResult::from_error("train", &error),
    }
}
