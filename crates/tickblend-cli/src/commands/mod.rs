mod batch;
mod health;
mod market;
mod quality;
mod record;
mod search;

use serde_json::Value;
use tickblend_core::{MarketDataService, MarketDataServiceBuilder, ServiceConfig, Symbol};
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Rendered command payload.
pub struct CommandOutput {
    pub data: Value,
    /// `false` turns into the no-data exit code after rendering.
    pub found: bool,
    pub subject: String,
}

impl CommandOutput {
    pub fn found(data: Value) -> Self {
        Self {
            data,
            found: true,
            subject: String::new(),
        }
    }

    pub fn missing(data: Value, subject: impl Into<String>) -> Self {
        Self {
            data,
            found: false,
            subject: subject.into(),
        }
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let service = build_service(cli);
    debug!(
        offline = cli.offline,
        caching = service.cache().is_some(),
        sources = ?service.sources(),
        "service ready"
    );

    match &cli.command {
        Command::Record(args) => record::run(args, &service).await,
        Command::Batch(args) => batch::run(args, &service).await,
        Command::Search(args) => search::run(args, &service).await,
        Command::Market => market::run(&service).await,
        Command::Health => health::run(&service).await,
        Command::Quality(args) => quality::run(args, &service).await,
    }
}

fn build_service(cli: &Cli) -> MarketDataService {
    let mut config = ServiceConfig::default();
    if cli.no_cache {
        config = config.without_caching();
    }

    let builder = MarketDataServiceBuilder::new().with_config(config);
    if cli.offline {
        builder.with_mock_mode().build()
    } else {
        builder.build()
    }
}

fn parse_symbol(raw: &str) -> Result<Symbol, CliError> {
    Ok(Symbol::parse(raw)?)
}
