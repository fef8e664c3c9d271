use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Args;
use harvest_core::config::ConfigOverrides;
use harvest_core::{
    build_training_set, load_csv_path, ApplicationError, FeatureSchema, TrainingExample,
};

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct FeaturesArgs {
    #[arg(long, help = "Forward label window in days")]
    pub window: u32,
    #[arg(long, help = "Transaction CSV export (defaults to data.transactions_path)")]
    pub data: Option<PathBuf>,
    #[arg(long, help = "Feature cutoff date, YYYY-MM-DD (defaults to pipeline.cutoff_date)")]
    pub cutoff: Option<NaiveDate>,
}

/// Labeled training set as CSV: identifiers, every schema column, then the label columns.
pub fn run(config_path: Option<PathBuf>, args: &FeaturesArgs) -> CommandResult {
    let overrides = ConfigOverrides {
        transactions_path: args.data.clone(),
        cutoff_date: args.cutoff,
        ..ConfigOverrides::default()
    };
    let config = match load_config("features", config_path, overrides) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = (|| -> Result<String, ApplicationError> {
        let snapshot = load_csv_path(&config.data.transactions_path)?;
        let examples = build_training_set(&snapshot, config.pipeline.cutoff_date, args.window)?;
        render_csv(&FeatureSchema::standard(), &examples)
    })();

    match result {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::from_error("features", &error),
    }
}

fn render_csv(
    schema: &FeatureSchema,
    examples: &[TrainingExample],
) -> Result<String, ApplicationError> {
    let export_error = |error: csv::Error| {
        ApplicationError::Persistence(format!("failed to render feature export: {error}"))
    };
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["customer_id", "product_id"];
    header.extend(schema.column_names());
    header.extend(["future_quantity", "future_purchase_count", "will_buy"]);
    writer.write_record(&header).map_err(export_error)?;

    for example in examples {
        let mut record = vec![
            example.features.customer_id().to_string(),
            example.features.product_id().to_string(),
        ];
        record.extend(schema.row(&example.features).iter().map(f64::to_string));
        record.push(example.label.future_quantity.to_string());
        record.push(example.label.future_purchase_count.to_string());
        record.push(u8::from(example.label.will_buy).to_string());
        writer.write_record(&record).map_err(export_error)?;
    }

    let bytes = writer.into_inner().map_err(|error| {
        ApplicationError::Persistence(format!("failed to flush feature export: {error}"))
    })?;
    let mut output = String::from_utf8(bytes).map_err(|error| {
        ApplicationError::Persistence(format!("feature export is not valid UTF-8: {error}"))
    })?;
    if output.ends_with('\n') {
        output.pop();
    }
    Ok(output)
}
