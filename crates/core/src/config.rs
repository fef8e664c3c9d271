use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ml::GradientParams;
use crate::pipeline::TrainingOptions;

pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["harvest.toml", "config/harvest.toml"];

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub data: DataConfig,
    pub pipeline: PipelineConfig,
    pub model: ModelConfig,
    pub ranking: RankingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataConfig {
    pub transactions_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Default training cutoff and prediction date.
    pub cutoff_date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelConfig {
    pub artifact_path: PathBuf,
    pub seed: u64,
    pub test_fraction: f64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2_penalty: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankingConfig {
    pub top_n: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub transactions_path: Option<PathBuf>,
    pub cutoff_date: Option<NaiveDate>,
    pub artifact_path: Option<PathBuf>,
    pub top_n: Option<usize>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig { transactions_path: PathBuf::from("data/transactions.csv") },
            pipeline: PipelineConfig { cutoff_date: default_cutoff_date() },
            model: ModelConfig {
                artifact_path: PathBuf::from("models/harvest-model.json"),
                seed: 42,
                test_fraction: 0.2,
                epochs: 1000,
                learning_rate: 0.1,
                l2_penalty: 0.01,
            },
            ranking: RankingConfig { top_n: crate::ranking::DEFAULT_TOP_N },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn default_cutoff_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, 1).unwrap_or(NaiveDate::MIN)
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl ModelConfig {
    pub fn training_options(&self) -> TrainingOptions {
        TrainingOptions {
            seed: self.seed,
            test_fraction: self.test_fraction,
            params: GradientParams {
                epochs: self.epochs,
                learning_rate: self.learning_rate,
                l2_penalty: self.l2_penalty,
            },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(data) = patch.data {
            if let Some(transactions_path) = data.transactions_path {
                self.data.transactions_path = transactions_path;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(cutoff_date) = pipeline.cutoff_date {
                self.pipeline.cutoff_date = parse_date("pipeline.cutoff_date", &cutoff_date)
                    .map_err(|_| {
                        ConfigError::Validation(format!(
                            "pipeline.cutoff_date must be a YYYY-MM-DD date, got `{cutoff_date}`"
                        ))
                    })?;
            }
        }

        if let Some(model) = patch.model {
            if let Some(artifact_path) = model.artifact_path {
                self.model.artifact_path = artifact_path;
            }
            if let Some(seed) = model.seed {
                self.model.seed = seed;
            }
            if let Some(test_fraction) = model.test_fraction {
                self.model.test_fraction = test_fraction;
            }
            if let Some(epochs) = model.epochs {
                self.model.epochs = epochs;
            }
            if let Some(learning_rate) = model.learning_rate {
                self.model.learning_rate = learning_rate;
            }
            if let Some(l2_penalty) = model.l2_penalty {
                self.model.l2_penalty = l2_penalty;
            }
        }

        if let Some(ranking) = patch.ranking {
            if let Some(top_n) = ranking.top_n {
                self.ranking.top_n = top_n;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HARVEST_DATA_TRANSACTIONS_PATH") {
            self.data.transactions_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("HARVEST_PIPELINE_CUTOFF_DATE") {
            self.pipeline.cutoff_date = parse_date("HARVEST_PIPELINE_CUTOFF_DATE", &value)?;
        }

        if let Some(value) = read_env("HARVEST_MODEL_ARTIFACT_PATH") {
            self.model.artifact_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("HARVEST_MODEL_SEED") {
            self.model.seed = parse_u64("HARVEST_MODEL_SEED", &value)?;
        }
        if let Some(value) = read_env("HARVEST_MODEL_TEST_FRACTION") {
            self.model.test_fraction = parse_f64("HARVEST_MODEL_TEST_FRACTION", &value)?;
        }
        if let Some(value) = read_env("HARVEST_MODEL_EPOCHS") {
            self.model.epochs = parse_usize("HARVEST_MODEL_EPOCHS", &value)?;
        }
        if let Some(value) = read_env("HARVEST_MODEL_LEARNING_RATE") {
            self.model.learning_rate = parse_f64("HARVEST_MODEL_LEARNING_RATE", &value)?;
        }
        if let Some(value) = read_env("HARVEST_MODEL_L2_PENALTY") {
            self.model.l2_penalty = parse_f64("HARVEST_MODEL_L2_PENALTY", &value)?;
        }

        if let Some(value) = read_env("HARVEST_RANKING_TOP_N") {
            self.ranking.top_n = parse_usize("HARVEST_RANKING_TOP_N", &value)?;
        }

        let log_level =
            read_env("HARVEST_LOGGING_LEVEL").or_else(|| read_env("HARVEST_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HARVEST_LOGGING_FORMAT").or_else(|| read_env("HARVEST_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(transactions_path) = overrides.transactions_path {
            self.data.transactions_path = transactions_path;
        }
        if let Some(cutoff_date) = overrides.cutoff_date {
            self.pipeline.cutoff_date = cutoff_date;
        }
        if let Some(artifact_path) = overrides.artifact_path {
            self.model.artifact_path = artifact_path;
        }
        if let Some(top_n) = overrides.top_n {
            self.ranking.top_n = top_n;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_data(&self.data)?;
        validate_model(&self.model)?;
        validate_ranking(&self.ranking)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// First existing config file: the explicit path if given, otherwise the default locations.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_data(data: &DataConfig) -> Result<(), ConfigError> {
    if data.transactions_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data.transactions_path must point at a transaction CSV export".to_string(),
        ));
    }
    Ok(())
}

fn validate_model(model: &ModelConfig) -> Result<(), ConfigError> {
    if model.artifact_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "model.artifact_path must be a file path for the trained model bundle".to_string(),
        ));
    }

    if !(model.test_fraction > 0.0 && model.test_fraction < 1.0) {
        return Err(ConfigError::Validation(
            "model.test_fraction must be in the open range (0, 1), e.g. 0.2".to_string(),
        ));
    }

    if model.epochs == 0 || model.epochs > 100_000 {
        return Err(ConfigError::Validation(
            "model.epochs must be in range 1..=100000".to_string(),
        ));
    }

    if !(model.learning_rate.is_finite() && model.learning_rate > 0.0) {
        return Err(ConfigError::Validation(
            "model.learning_rate must be a positive number".to_string(),
        ));
    }

    if !(model.l2_penalty.is_finite() && model.l2_penalty >= 0.0) {
        return Err(ConfigError::Validation(
            "model.l2_penalty must be zero or a positive number".to_string(),
        ));
    }

    Ok(())
}

fn validate_ranking(ranking: &RankingConfig) -> Result<(), ConfigError> {
    if ranking.top_n == 0 || ranking.top_n > 1000 {
        return Err(ConfigError::Validation(
            "ranking.top_n must be in range 1..=1000".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| invalid_override(key, value))
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    data: Option<DataPatch>,
    pipeline: Option<PipelinePatch>,
    model: Option<ModelPatch>,
    ranking: Option<RankingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DataPatch {
    transactions_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    cutoff_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelPatch {
    artifact_path: Option<PathBuf>,
    seed: Option<u64>,
    test_fraction: Option<f64>,
    epochs: Option<usize>,
    learning_rate: Option<f64>,
    l2_penalty: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RankingPatch {
    top_n: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
