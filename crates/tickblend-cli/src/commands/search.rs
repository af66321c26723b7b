use serde_json::json;
use tickblend_core::MarketDataService;

use crate::cli::SearchArgs;
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(args: &SearchArgs, service: &MarketDataService) -> Result<CommandOutput, CliError> {
    let results = service.search_symbols(&args.query).await?;
    let data = json!({
        "query": args.query.trim(),
        "count": results.len(),
        "results": results,
    });

    if results.is_empty() {
        Ok(CommandOutput::missing(data, format!("query '{}'", args.query.trim())))
    } else {
        Ok(CommandOutput::found(data))
    }
}
