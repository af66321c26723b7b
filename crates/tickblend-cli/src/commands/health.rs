use tickblend_core::MarketDataService;

use crate::error::CliError;

use super::CommandOutput;

/// Reports health; a degraded status is data, not a failure.
pub async fn run(service: &MarketDataService) -> Result<CommandOutput, CliError> {
    let report = service.get_health().await;
    Ok(CommandOutput::found(serde_json::to_value(report)?))
}
