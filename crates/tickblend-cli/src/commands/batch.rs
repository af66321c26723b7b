use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use serde_json::json;
use tickblend_core::MarketDataService;

use crate::cli::BatchArgs;
use crate::error::CliError;

use super::{parse_symbol, CommandOutput};

pub async fn run(args: &BatchArgs, service: &MarketDataService) -> Result<CommandOutput, CliError> {
    let symbols = args
        .symbols
        .iter()
        .map(|raw| parse_symbol(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let records = service
        .get_batch(&symbols, args.concurrency.map(NonZeroUsize::get))
        .await;
    let missing = records
        .iter()
        .filter(|(_, record)| record.is_none())
        .map(|(symbol, _)| symbol.to_string())
        .collect::<Vec<_>>();
    let records = records
        .into_iter()
        .map(|(symbol, record)| (symbol.to_string(), record))
        .collect::<BTreeMap<_, _>>();

    let data = json!({
        "requested": symbols.len(),
        "found": records.len() - missing.len(),
        "missing": missing,
        "records": records,
    });

    // Partial batches still succeed; only an all-empty batch is "no data".
    if missing.len() == records.len() {
        Ok(CommandOutput::missing(data, missing.join(", ")))
    } else {
        Ok(CommandOutput::found(data))
    }
}
