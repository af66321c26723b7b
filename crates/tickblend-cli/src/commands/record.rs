use serde_json::json;
use tickblend_core::{MarketDataService, RecordOptions};

use crate::cli::RecordArgs;
use crate::error::CliError;

use super::{parse_symbol, CommandOutput};

pub async fn run(args: &RecordArgs, service: &MarketDataService) -> Result<CommandOutput, CliError> {
    let symbol = parse_symbol(&args.symbol)?;
    let options = RecordOptions {
        force_refresh: args.refresh,
        preferred_source: args.source.map(Into::into),
    };

    let outcome = service.lookup(&symbol, options).await;
    let data = json!({
        "symbol": outcome.symbol,
        "from_cache": outcome.from_cache,
        "skipped": outcome.skipped,
        "record": outcome.record,
    });

    if outcome.is_found() {
        Ok(CommandOutput::found(data))
    } else {
        Ok(CommandOutput::missing(data, symbol.as_str()))
    }
}
