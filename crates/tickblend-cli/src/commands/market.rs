use serde_json::Value;
use tickblend_core::MarketDataService;

use crate::error::CliError;

use super::CommandOutput;

pub async fn run(service: &MarketDataService) -> Result<CommandOutput, CliError> {
    match service.get_market_snapshot().await {
        Some(snapshot) => Ok(CommandOutput::found(serde_json::to_value(snapshot)?)),
        None => Ok(CommandOutput::missing(Value::Null, "market snapshot")),
    }
}
