use serde_json::json;
use tickblend_core::{MarketDataService, RecordOptions};

use crate::cli::QualityArgs;
use crate::error::CliError;

use super::{parse_symbol, CommandOutput};

pub async fn run(args: &QualityArgs, service: &MarketDataService) -> Result<CommandOutput, CliError> {
    let symbol = parse_symbol(&args.symbol)?;
    let options = RecordOptions {
        force_refresh: args.refresh,
        preferred_source: None,
    };

    let summary = service
        .get_record(&symbol, options)
        .await
        .and_then(|record| record.quality)
        .map(|report| report.summary());

    match summary {
        Some(summary) => Ok(CommandOutput::found(serde_json::to_value(summary)?)),
        None => Ok(CommandOutput::missing(
            json!({ "symbol": symbol, "quality": null }),
            symbol.as_str(),
        )),
    }
}
