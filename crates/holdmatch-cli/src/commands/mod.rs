mod confirm;
mod steps;

use std::sync::Arc;

use holdmatch_core::config::api_token_from_env;
use holdmatch_core::{
    CacheStore, EodhdProvider, FileCacheStore, FileSessionStore, FixtureHttpClient, HttpClient,
    Pipeline, PipelineConfig, PortfolioScraper, ReqwestHttpClient, SessionLocks,
};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Token EODHD accepts for its public sample data.
const DEMO_API_TOKEN: &str = "demo";

pub struct Runtime {
    pub pipeline: Pipeline,
    pub locks: SessionLocks,
    pub use_cache: bool,
}

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let config = resolve_config(cli)?;
    let runtime = Runtime {
        pipeline: build_pipeline(cli, &config).await?,
        locks: SessionLocks::new(),
        use_cache: !cli.no_cache,
    };

    match &cli.command {
        Command::Start(args) => steps::start(&runtime, args).await,
        Command::Universe(args) => steps::universe(&runtime, args).await,
        Command::Match(args) => steps::match_holdings(&runtime, args).await,
        Command::Validate(args) => steps::validate(&runtime, args).await,
        Command::Review(args) => steps::review(&runtime, args).await,
        Command::Show(args) => steps::show(&runtime, args).await,
        Command::Confirm(args) => confirm::run(&runtime, args).await,
    }
}

fn resolve_config(cli: &Cli) -> Result<PipelineConfig, CliError> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(home) = &cli.home {
        config.home = home.clone();
    }
    if let Command::Universe(args) = &cli.command {
        if let Some(max) = args.max_exchanges {
            config.max_exchanges = (max > 0).then_some(max);
        }
    }
    Ok(config)
}

async fn build_pipeline(cli: &Cli, config: &PipelineConfig) -> Result<Pipeline, CliError> {
    let http_client: Arc<dyn HttpClient> = match &cli.fixtures {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "serving http from fixtures");
            Arc::new(FixtureHttpClient::from_dir(dir).await?)
        }
        None => Arc::new(ReqwestHttpClient::new()),
    };

    let api_token = api_token_from_env().unwrap_or_else(|| {
        if cli.fixtures.is_none() {
            tracing::warn!("no EODHD API key configured; using the demo token");
        }
        String::from(DEMO_API_TOKEN)
    });

    let cache: Arc<dyn CacheStore> = Arc::new(FileCacheStore::new(config.cache_dir()));
    let scraper = PortfolioScraper::new(Arc::clone(&http_client)).with_cache(Arc::clone(&cache));
    let provider = EodhdProvider::new(http_client, api_token)
        .with_cache(Arc::clone(&cache))
        .with_ttls(config.exchange_ttl, config.symbol_ttl);
    let store = FileSessionStore::new(config.sessions_dir());

    Ok(
        Pipeline::from_config(Arc::new(scraper), Arc::new(provider), Arc::new(store), config)
            .with_match_cache(cache),
    )
}
