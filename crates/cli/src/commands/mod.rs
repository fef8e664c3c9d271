pub mod config;
pub mod features;
pub mod recommend;
pub mod train;

use std::path::PathBuf;

use harvest_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use harvest_core::ApplicationError;
use serde::Serialize;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_INGESTION: u8 = 3;
pub const EXIT_PIPELINE: u8 = 4;
pub const EXIT_PERSISTENCE: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct CommandReport<'a, T: Serialize> {
    command: &'a str,
    status: &'a str,
    report: &'a T,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    /// Successful run carrying a structured report instead of a message.
    pub fn report<T: Serialize>(command: &str, report: &T) -> Self {
        let payload = CommandReport { command, status: "ok", report };
        match serde_json::to_string_pretty(&payload) {
            Ok(output) => Self { exit_code: 0, output },
            Err(error) => Self::failure(
                command,
                "serialization",
                format!("failed to serialize report: {error}"),
                EXIT_PIPELINE,
            ),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_error(command: &str, error: &ApplicationError) -> Self {
        let error_class = error.error_class();
        Self::failure(command, error_class, error.to_string(), exit_code_for(error_class))
    }
}

pub fn exit_code_for(error_class: &str) -> u8 {
    match error_class {
        "config_validation" => EXIT_CONFIG,
        "ingestion" => EXIT_INGESTION,
        "persistence" => EXIT_PERSISTENCE,
        _ => EXIT_PIPELINE,
    }
}

/// Load configuration for a command, mapping failures to the config exit code.
pub(crate) fn load_config(
    command: &str,
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions { config_path, overrides, ..LoadOptions::default() }).map_err(
        |error| {
            CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            )
        },
    )
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
