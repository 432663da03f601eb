use haggl_core::preferences::{Direction, Parameter, PreferenceEngine, PreferenceWeights};
use serde_json::json;

use crate::commands::CommandResult;

const COMMAND: &str = "adjust";

pub fn run(
    parameter: Parameter,
    direction: Direction,
    weights: Option<PreferenceWeights>,
    vendor_id: Option<String>,
) -> CommandResult {
    let mut engine = PreferenceEngine::new(weights.unwrap_or_default());
    let record = engine.apply_feedback(parameter, direction, vendor_id);

    let message = format!(
        "{parameter} {}: {:.4} -> {:.4}",
        match direction {
            Direction::Up => "up",
            Direction::Down => "down",
        },
        record.weights_before.get(parameter),
        record.weights_after.get(parameter),
    );

    CommandResult::success_with_data(
        COMMAND,
        message,
        Some(json!({ "weights": record.weights_after, "feedback": record })),
    )
}
