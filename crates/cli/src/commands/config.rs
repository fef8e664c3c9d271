use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use harvest_core::config::{resolve_config_path, AppConfig, LoadOptions};
use serde::Serialize;
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

/// One effective setting and where its value came from.
#[derive(Debug, Serialize)]
struct ConfigField {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    precedence: &'static str,
    fields: Vec<ConfigField>,
}

pub fn run(config_path: Option<PathBuf>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path: config_path.clone(),
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_path = resolve_config_path(config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut fields = Vec::new();

    fields.push(render_line(
        "data.transactions_path",
        &config.data.transactions_path.display().to_string(),
        source("data.transactions_path", &["HARVEST_DATA_TRANSACTIONS_PATH"]),
    ));
    fields.push(render_line(
        "pipeline.cutoff_date",
        &config.pipeline.cutoff_date.to_string(),
        source("pipeline.cutoff_date", &["HARVEST_PIPELINE_CUTOFF_DATE"]),
    ));

    fields.push(render_line(
        "model.artifact_path",
        &config.model.artifact_path.display().to_string(),
        source("model.artifact_path", &["HARVEST_MODEL_ARTIFACT_PATH"]),
    ));
    fields.push(render_line(
        "model.seed",
        &config.model.seed.to_string(),
        source("model.seed", &["HARVEST_MODEL_SEED"]),
    ));
    fields.push(render_line(
        "model.test_fraction",
        &config.model.test_fraction.to_string(),
        source("model.test_fraction", &["HARVEST_MODEL_TEST_FRACTION"]),
    ));
    fields.push(render_line(
        "model.epochs",
        &config.model.epochs.to_string(),
        source("model.epochs", &["HARVEST_MODEL_EPOCHS"]),
    ));
    fields.push(render_line(
        "model.learning_rate",
        &config.model.learning_rate.to_string(),
        source("model.learning_rate", &["HARVEST_MODEL_LEARNING_RATE"]),
    ));
    fields.push(render_line(
        "model.l2_penalty",
        &config.model.l2_penalty.to_string(),
        source("model.l2_penalty", &["HARVEST_MODEL_L2_PENALTY"]),
    ));

    fields.push(render_line(
        "ranking.top_n",
        &config.ranking.top_n.to_string(),
        source("ranking.top_n", &["HARVEST_RANKING_TOP_N"]),
    ));

    fields.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["HARVEST_LOGGING_LEVEL", "HARVEST_LOG_LEVEL"]),
    ));
    fields.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["HARVEST_LOGGING_FORMAT", "HARVEST_LOG_FORMAT"]),
    ));

    CommandResult::report(
        "config",
        &ConfigReport { precedence: "env > file > default", fields },
    )
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &'static str, value: &str, source: String) -> ConfigField {
    ConfigField { key, value: value.to_owned(), source }
}
