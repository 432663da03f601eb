use std::sync::Arc;

use haggl_client::{CommandGateway, HttpFeedClient};
use haggl_core::config::{AppConfig, FeedMode};
use haggl_core::store::{OrderStore, StoreSettings};
use serde_json::json;

use crate::commands::{build_runtime, CommandResult, EXIT_BACKEND, EXIT_INVALID_INPUT};

const COMMAND: &str = "approve";

pub fn run(config: &AppConfig, order_id: &str) -> CommandResult {
    let gateway = match http_gateway(COMMAND, config) {
        Ok(gateway) => gateway,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    match runtime.block_on(gateway.approve(order_id)) {
        Ok(receipt) => {
            let message = receipt
                .message
                .clone()
                .unwrap_or_else(|| format!("order {} approved", receipt.order_id));
            CommandResult::success_with_data(
                COMMAND,
                message,
                Some(json!({
                    "order_id": receipt.order_id,
                    "correlation_id": receipt.correlation_id,
                })),
            )
        }
        Err(error) => CommandResult::command_error(COMMAND, &error),
    }
}

/// Gateway over the HTTP backend with a throwaway store. One-shot commands
/// have no view to update; the store only satisfies the gateway contract.
pub(crate) fn http_gateway(
    command: &str,
    config: &AppConfig,
) -> Result<CommandGateway, CommandResult> {
    if config.feed.mode == FeedMode::Synthetic {
        return Err(CommandResult::failure(
            command,
            "unsupported_mode",
            "synthetic orders live inside `haggl watch --synthetic --auto-approve`",
            EXIT_INVALID_INPUT,
        ));
    }

    let client = HttpFeedClient::new(&config.feed).map_err(|error| {
        CommandResult::failure(command, "transport_init", error.to_string(), EXIT_BACKEND)
    })?;
    let (store, _terminal) = OrderStore::init(StoreSettings::from(&config.view));
    Ok(CommandGateway::new(Arc::new(client), store))
}
