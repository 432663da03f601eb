pub mod adjust;
pub mod approve;
pub mod config;
pub mod ping;
pub mod rank;
pub mod watch;

use haggl_client::CommandError;
use haggl_core::preferences::PreferenceWeights;
use serde::Serialize;
use serde_json::Value;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_INVALID_INPUT: u8 = 4;
pub const EXIT_BACKEND: u8 = 5;
pub const EXIT_REJECTED: u8 = 6;
pub const EXIT_ORDER_FAILED: u8 = 7;

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
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
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
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Structured failure for a gateway error.
    pub fn command_error(command: &str, error: &CommandError) -> Self {
        let (error_class, exit_code) = match error {
            CommandError::MissingOrderId => ("invalid_input", EXIT_INVALID_INPUT),
            CommandError::AlreadyInFlight(_) => ("command_in_flight", EXIT_REJECTED),
            CommandError::Rejected { .. } => ("command_rejected", EXIT_REJECTED),
            CommandError::Disposed => ("session_closed", EXIT_RUNTIME),
            CommandError::Transport(_) => ("backend_error", EXIT_BACKEND),
        };
        Self::failure(command, error_class, error.to_string(), exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// Parse `quality,affordability,shipping,reliability`.
pub fn parse_weights(raw: &str) -> Result<PreferenceWeights, String> {
    let values = raw
        .split(',')
        .map(|part| {
            part.trim().parse::<f64>().map_err(|_| format!("`{}` is not a number", part.trim()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let [quality, affordability, shipping, reliability] = values.as_slice() else {
        return Err(format!("expected 4 comma-separated weights, got {}", values.len()));
    };
    PreferenceWeights::new(*quality, *affordability, *shipping, *reliability)
        .map_err(|error| error.to_string())
}
