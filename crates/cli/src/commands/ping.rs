use serde_json::Value;

use crate::commands::approve::http_gateway;
use crate::commands::{build_runtime, CommandResult};

const COMMAND: &str = "ping";

pub fn run(config: &haggl_core::config::AppConfig) -> CommandResult {
    let gateway = match http_gateway(COMMAND, config) {
        Ok(gateway) => gateway,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    match runtime.block_on(gateway.trigger_test_event()) {
        Ok(body) => {
            let data = (!body.is_null()).then_some(body);
            let status = data.as_ref().and_then(|body| body.get("status")).and_then(Value::as_str);
            let message = match status {
                Some(status) => format!("test event requested ({status})"),
                None => "test event requested".to_string(),
            };
            CommandResult::success_with_data(COMMAND, message, data)
        }
        Err(error) => CommandResult::command_error(COMMAND, &error),
    }
}
