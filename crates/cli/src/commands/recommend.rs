use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Args;
use harvest_core::config::ConfigOverrides;
use harvest_core::{
    load_csv_path, ApplicationError, CustomerId, FeatureSchema, ModelBundle, Recommender,
};

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct RecommendArgs {
    #[arg(help = "Customer to recommend products for")]
    pub customer_id: String,
    #[arg(long, help = "Transaction CSV export (defaults to data.transactions_path)")]
    pub data: Option<PathBuf>,
    #[arg(long, help = "Prediction date, YYYY-MM-DD (defaults to pipeline.cutoff_date)")]
    pub date: Option<NaiveDate>,
    #[arg(long = "top-n", help = "Number of recommendations (defaults to ranking.top_n)")]
    pub top_n: Option<usize>,
    #[arg(long, help = "Trained model bundle (defaults to model.artifact_path)")]
    pub model: Option<PathBuf>,
}

pub fn run(config_path: Option<PathBuf>, args: &RecommendArgs) -> CommandResult {
    let overrides = ConfigOverrides {
        transactions_path: args.data.clone(),
        cutoff_date: args.date,
        artifact_path: args.model.clone(),
        top_n: args.top_n,
        ..ConfigOverrides::default()
    };
    let config = match load_config("recommend", config_path, overrides) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let customer_id = CustomerId::new(args.customer_id.trim());
    let result = (|| -> Result<_, ApplicationError> {
        let schema = FeatureSchema::standard();
        let bundle = ModelBundle::load(&config.model.artifact_path, &schema)?;
        let snapshot = load_csv_path(&config.data.transactions_path)?;

        Recommender::new(bundle).with_schema(schema).recommend(
            &snapshot,
            &customer_id,
            config.pipeline.cutoff_date,
            config.ranking.top_n,
        )
    })();

    match result {
        Ok(set) => CommandResult::report("recommend", &set),
        Err(error) => CommandResult::from_error("recommend", &error),
    }
}
