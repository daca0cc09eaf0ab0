//! In-process collaborators shared by the behaviour tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use holdmatch_core::data_source::SourceFuture;
use holdmatch_core::session::StoreFuture;
use holdmatch_core::{
    CacheDescriptor, CacheScope, CachedPayload, ExchangeSummary, HoldingEntry, MemorySessionStore,
    Origin, Pipeline, PipelineConfig, Provider, ProviderOptions, ScrapeOptions, ScrapeResult,
    Scraper, SecurityRecord, Session, SessionStore, SourceError,
};

pub fn holding(symbol: &str, name: &str) -> HoldingEntry {
    HoldingEntry::new(symbol, name).expect("valid holding")
}

pub fn exchange(code: &str) -> ExchangeSummary {
    ExchangeSummary {
        code: code.to_owned(),
        name: format!("{code} exchange"),
        country: String::new(),
        currency: String::new(),
        operating_mic: String::new(),
    }
}

/// Scraper returning a fixed list, or failing when `error` is set.
#[derive(Default)]
pub struct FakeScraper {
    pub entries: Vec<HoldingEntry>,
    pub error: Option<SourceError>,
    pub calls: AtomicUsize,
}

impl FakeScraper {
    pub fn with_entries(entries: Vec<HoldingEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn failing(error: SourceError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

impl Scraper for FakeScraper {
    fn fetch<'a>(&'a self, _options: &'a ScrapeOptions) -> SourceFuture<'a, ScrapeResult> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = &self.error {
                return Err(error.clone());
            }
            Ok(ScrapeResult {
                entries: self.entries.clone(),
                origin: Origin::Live,
                cached: None,
            })
        })
    }
}

/// Provider over a fixed exchange list and per-exchange records.
#[derive(Default)]
pub struct FakeProvider {
    pub exchanges: Vec<ExchangeSummary>,
    pub symbols: HashMap<String, Vec<SecurityRecord>>,
    pub failing_exchange: Option<String>,
    pub symbol_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn with_exchange(mut self, code: &str, records: Vec<SecurityRecord>) -> Self {
        self.exchanges.push(exchange(code));
        self.symbols.insert(code.to_owned(), records);
        self
    }

    pub fn failing_on(mut self, code: &str) -> Self {
        self.failing_exchange = Some(code.to_owned());
        self
    }
}

impl Provider for FakeProvider {
    fn id(&self) -> &str {
        "fake"
    }

    fn list_exchanges<'a>(
        &'a self,
        _options: ProviderOptions,
    ) -> SourceFuture<'a, CachedPayload<Vec<ExchangeSummary>>> {
        Box::pin(async move {
            Ok(CachedPayload::uncached(
                CacheDescriptor::new(CacheScope::ExchangeList, "fake", "all"),
                self.exchanges.clone(),
            ))
        })
    }

    fn list_symbols<'a>(
        &'a self,
        exchange_code: &'a str,
        options: ProviderOptions,
    ) -> SourceFuture<'a, CachedPayload<Vec<SecurityRecord>>> {
        Box::pin(async move {
            self.symbol_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_exchange.as_deref() == Some(exchange_code) {
                return Err(SourceError::rate_limited(format!("quota exhausted for {exchange_code}")));
            }
            let records: Vec<SecurityRecord> = self
                .symbols
                .get(exchange_code)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|record| !options.common_stock_only || record.is_common_stock())
                .collect();
            Ok(CachedPayload::uncached(
                CacheDescriptor::new(CacheScope::ExchangeSymbols, "fake", exchange_code),
                records,
            ))
        })
    }
}

/// US and LSE listings used across the pipeline tests.
pub fn standard_provider() -> FakeProvider {
    FakeProvider::default()
        .with_exchange(
            "US",
            vec![
                SecurityRecord::new("AAPL", "Apple Inc", "US").with_security_type("Common Stock"),
                SecurityRecord::new("BRK-B", "Berkshire Hathaway Inc", "US")
                    .with_security_type("Common Stock"),
                SecurityRecord::new("SPY", "SPDR S&P 500 ETF Trust", "US").with_security_type("ETF"),
            ],
        )
        .with_exchange(
            "LSE",
            vec![SecurityRecord::new("SHEL", "Shell Plc", "LSE").with_security_type("Common Stock")],
        )
}

pub fn standard_holdings() -> Vec<HoldingEntry> {
    vec![
        holding("AAPL", "Apple Inc"),
        holding("BRK.B", "Berkshire Hathaway"),
        holding("XYZ.HK", "Xyz Holdings"),
    ]
}

/// Session store that keeps a snapshot of every save.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemorySessionStore,
    saves: Mutex<Vec<Session>>,
}

impl RecordingStore {
    pub fn saves(&self) -> Vec<Session> {
        self.saves.lock().expect("saves lock").clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().expect("saves lock").len()
    }

    /// The most recently saved session.
    pub fn last(&self) -> Session {
        self.saves().pop().expect("at least one save")
    }
}

impl SessionStore for RecordingStore {
    fn load<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<Session>> {
        self.inner.load(session_id)
    }

    fn save<'a>(&'a self, session: &'a Session) -> StoreFuture<'a, ()> {
        self.saves.lock().expect("saves lock").push(session.clone());
        self.inner.save(session)
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub scraper: Arc<FakeScraper>,
    pub provider: Arc<FakeProvider>,
    pub store: Arc<RecordingStore>,
}

pub fn harness(scraper: FakeScraper, provider: FakeProvider) -> Harness {
    harness_with_config(scraper, provider, &PipelineConfig::default())
}

pub fn harness_with_config(scraper: FakeScraper, provider: FakeProvider, config: &PipelineConfig) -> Harness {
    let scraper = Arc::new(scraper);
    let provider = Arc::new(provider);
    let store = Arc::new(RecordingStore::default());
    let pipeline = Pipeline::from_config(scraper.clone(), provider.clone(), store.clone(), config);
    Harness {
        pipeline,
        scraper,
        provider,
        store,
    }
}

pub fn standard_harness() -> Harness {
    harness(
        FakeScraper::with_entries(standard_holdings()),
        standard_provider(),
    )
}
