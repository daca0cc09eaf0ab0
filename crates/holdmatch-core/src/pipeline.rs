//! # Pipeline
//!
//! Step state machine over a [`Session`]:
//!
//! ```text
//! scrape ──▶ universe ──▶ match ──▶ validate ──▶ review
//! ```
//!
//! Each step moves `pending → running → {complete | blocked}`. A step may
//! only start once every earlier step is `complete`. Every transition is
//! applied in memory first and then persisted, so a loaded session always
//! shows the last real state, including a `running` step whose caller went
//! away. Re-running a completed step resets it to `running`; later steps are
//! left as they are.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Value};

use crate::cache::CacheStore;
use crate::config::PipelineConfig;
use crate::data_source::{
    first_per_symbol, Provider, ProviderOptions, ScrapeOptions, Scraper, SourceError,
};
use crate::error::PipelineError;
use crate::matching::{MatchOptions, MatchingCoordinator, MatchingEngine};
use crate::session::{ExchangeSymbols, Session, SessionStore, Step, StepContext, Universe};
use crate::{MatchCandidate, SecurityRecord, UtcDateTime};

/// Cache behaviour for the scrape step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePreferences {
    pub use_cache: bool,
    /// Caller-chosen cache key for the scrape result.
    pub source_token: Option<String>,
}

impl Default for CachePreferences {
    fn default() -> Self {
        Self {
            use_cache: true,
            source_token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrapeFilter {
    /// Minimum portfolio weight, in percent.
    pub min_percent: Option<f64>,
    /// Cap on scraped rows.
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniverseStepOptions {
    pub use_cache: bool,
    pub common_stock_only: bool,
}

impl Default for UniverseStepOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            common_stock_only: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchStepOptions {
    pub use_cache: bool,
    /// `None` follows the universe's own filter.
    pub common_stock_only: Option<bool>,
}

impl Default for MatchStepOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            common_stock_only: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidateStepOptions {
    /// Matched candidates below this confidence are flagged for review.
    pub min_confidence: f64,
}

impl Default for ValidateStepOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.9,
        }
    }
}

/// Human decision for one holding.
#[derive(Debug, Clone, PartialEq)]
pub enum Override {
    Record(SecurityRecord),
    Unavailable,
}

/// Drives sessions through the reconciliation steps.
#[derive(Clone)]
pub struct Pipeline {
    scraper: Arc<dyn Scraper>,
    provider: Arc<dyn Provider>,
    store: Arc<dyn SessionStore>,
    coordinator: MatchingCoordinator,
    max_exchanges: Option<usize>,
    universe_concurrency: usize,
}

impl Pipeline {
    pub fn new(scraper: Arc<dyn Scraper>, provider: Arc<dyn Provider>, store: Arc<dyn SessionStore>) -> Self {
        Self::from_config(scraper, provider, store, &PipelineConfig::default())
    }

    pub fn from_config(
        scraper: Arc<dyn Scraper>,
        provider: Arc<dyn Provider>,
        store: Arc<dyn SessionStore>,
        config: &PipelineConfig,
    ) -> Self {
        let coordinator = MatchingCoordinator::new(MatchingEngine::new(config.fuzzy_threshold))
            .with_workers(config.match_workers)
            .with_priority(config.exchange_priority.clone());

        Self {
            scraper,
            provider,
            store,
            coordinator,
            max_exchanges: config.max_exchanges,
            universe_concurrency: config.universe_concurrency.max(1),
        }
    }

    /// Caches coordinator results under the `derived` scope.
    pub fn with_match_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.coordinator = self.coordinator.with_cache(cache);
        self
    }

    pub async fn load_session(&self, session_id: &str) -> Result<Option<Session>, PipelineError> {
        Ok(self.store.load(session_id).await?)
    }

    pub async fn start_session(
        &self,
        cache: CachePreferences,
        filter: ScrapeFilter,
    ) -> Result<Session, PipelineError> {
        let mut session = Session::new();
        let min_percent = filter.min_percent.unwrap_or(0.0);
        session.begin_step(Step::Scrape, Some(context(json!({ "minPercent": min_percent }))));
        self.store.save(&session).await?;
        tracing::info!(session_id = %session.id, min_percent, "scrape step started");

        let options = ScrapeOptions {
            use_cache: cache.use_cache,
            source_token: cache.source_token,
            min_percent: filter.min_percent,
            max_entries: filter.max_entries,
        };

        match self.scraper.fetch(&options).await {
            Ok(mut result) => {
                let (entries, repeated) = first_per_symbol(std::mem::take(&mut result.entries));
                for entry in &repeated {
                    tracing::warn!(
                        session_id = %session.id,
                        symbol = %entry.symbol,
                        company = %entry.company_name,
                        "dropping holding that repeats an earlier symbol"
                    );
                }
                result.entries = entries;

                let summary = json!({
                    "origin": result.origin,
                    "entryCount": result.entries.len(),
                    "repeatedSymbolCount": repeated.len(),
                });
                session.holdings = Some(result);
                self.complete(&mut session, Step::Scrape, summary).await?;
                Ok(session)
            }
            Err(source) => Err(self.collaborator_failure(&mut session, Step::Scrape, source).await),
        }
    }

    pub async fn run_universe_step(
        &self,
        session_id: &str,
        options: UniverseStepOptions,
    ) -> Result<Session, PipelineError> {
        let mut session = self.begin(session_id, Step::Universe).await?;

        match self.build_universe(options).await {
            Ok(universe) => {
                let summary = json!({
                    "exchangeCount": universe.exchanges.payload.len(),
                    "symbolBatchCount": universe.batch_count(),
                    "symbolCount": universe.symbol_count(),
                });
                session.universe = Some(universe);
                self.complete(&mut session, Step::Universe, summary).await?;
                Ok(session)
            }
            Err(source) => Err(self.collaborator_failure(&mut session, Step::Universe, source).await),
        }
    }

    pub async fn run_match_step(
        &self,
        session_id: &str,
        options: MatchStepOptions,
    ) -> Result<Session, PipelineError> {
        let mut session = self.begin(session_id, Step::Match).await?;

        let outcome = match (&session.holdings, &session.universe) {
            (Some(holdings), Some(universe)) => {
                let match_options = MatchOptions {
                    use_cache: options.use_cache,
                    common_stock_only: options
                        .common_stock_only
                        .unwrap_or(universe.common_stock_only),
                };
                self.coordinator
                    .run(&holdings.entries, universe, match_options)
                    .await
            }
            _ => Err(SourceError::internal("session has no holdings or universe")),
        };

        match outcome {
            Ok(outcome) => {
                let summary = json!({
                    "matchCount": outcome.candidates.len(),
                    "matchedCount": outcome.matched_count(),
                    "unmatchedCount": outcome.candidates.len() - outcome.matched_count(),
                    "origin": outcome.origin,
                });
                session.matches = Some(outcome.candidates);
                self.complete(&mut session, Step::Match, summary).await?;
                Ok(session)
            }
            Err(source) => Err(self.collaborator_failure(&mut session, Step::Match, source).await),
        }
    }

    pub async fn run_validate_step(
        &self,
        session_id: &str,
        options: ValidateStepOptions,
    ) -> Result<Session, PipelineError> {
        let mut session = self.begin(session_id, Step::Validate).await?;
        let min_confidence = options.min_confidence.clamp(0.0, 1.0);

        match validate_matches(&session) {
            Ok(()) => {
                let matches = session.matches.as_deref().unwrap_or_default();
                let low_confidence: Vec<&str> = matches
                    .iter()
                    .filter(|c| c.is_matched() && !c.manually_resolved && c.confidence < min_confidence)
                    .map(|c| c.holding_symbol.as_str())
                    .collect();
                let summary = json!({
                    "matched": matches.iter().filter(|c| c.is_matched()).count(),
                    "unmatched": matches.iter().filter(|c| !c.is_matched()).count(),
                    "manuallyResolved": matches.iter().filter(|c| c.manually_resolved).count(),
                    "lowConfidence": low_confidence.len(),
                    "lowConfidenceSymbols": low_confidence,
                });
                self.complete(&mut session, Step::Validate, summary).await?;
                Ok(session)
            }
            Err(message) => {
                session.block_step(Step::Validate, &message);
                self.store.save(&session).await?;
                tracing::warn!(session_id = %session.id, %message, "validate step blocked");
                Err(PipelineError::Validation {
                    step: Step::Validate,
                    message,
                })
            }
        }
    }

    pub async fn complete_review(&self, session_id: &str) -> Result<Session, PipelineError> {
        let mut session = self.begin(session_id, Step::Review).await?;
        let summary = json!({
            "reviewedAt": UtcDateTime::now(),
            "matchCount": session.matches.as_ref().map(Vec::len).unwrap_or(0),
        });
        self.complete(&mut session, Step::Review, summary).await?;
        Ok(session)
    }

    /// Applies a human override to one candidate. Step states are untouched.
    pub async fn confirm_match(
        &self,
        session_id: &str,
        holding_symbol: &str,
        decision: Override,
    ) -> Result<MatchCandidate, PipelineError> {
        let mut session = self.require(session_id).await?;
        let holding_symbol = holding_symbol.trim().to_ascii_uppercase();
        if session.matches.is_none() {
            return Err(PipelineError::PreconditionNotMet {
                step: Step::Review,
                required: Step::Match,
            });
        }

        let record = match decision {
            Override::Unavailable => None,
            Override::Record(record) => {
                let stored = session
                    .universe
                    .as_ref()
                    .and_then(|universe| universe.find_record(&record.exchange_code, &record.code))
                    .cloned()
                    .ok_or_else(|| PipelineError::InvalidOverride {
                        holding_symbol: holding_symbol.clone(),
                        reason: format!("record {} is not in the session universe", record.key()),
                    })?;
                Some(stored)
            }
        };

        let candidate = session
            .matches
            .iter_mut()
            .flatten()
            .find(|candidate| candidate.holding_symbol == holding_symbol)
            .ok_or_else(|| PipelineError::InvalidOverride {
                holding_symbol: holding_symbol.clone(),
                reason: String::from("no candidate for this holding"),
            })?;

        *candidate = MatchingEngine::confirm_match(candidate, record);
        let confirmed = candidate.clone();

        self.store.save(&session).await?;
        tracing::info!(
            session_id = %session.id,
            holding = %holding_symbol,
            matched = confirmed.is_matched(),
            "match confirmed"
        );
        Ok(confirmed)
    }

    async fn require(&self, session_id: &str) -> Result<Session, PipelineError> {
        self.store
            .load(session_id)
            .await?
            .ok_or_else(|| PipelineError::SessionNotFound {
                session_id: session_id.to_owned(),
            })
    }

    /// Loads the session, checks every earlier step is complete, and marks
    /// `step` running. A failed check leaves the stored session untouched.
    async fn begin(&self, session_id: &str, step: Step) -> Result<Session, PipelineError> {
        let mut session = self.require(session_id).await?;

        if let Some(required) = Step::ALL
            .into_iter()
            .take_while(|earlier| *earlier < step)
            .find(|earlier| !session.is_complete(*earlier))
        {
            return Err(PipelineError::PreconditionNotMet { step, required });
        }

        session.begin_step(step, None);
        self.store.save(&session).await?;
        tracing::info!(session_id = %session.id, %step, "step started");
        Ok(session)
    }

    async fn complete(&self, session: &mut Session, step: Step, summary: Value) -> Result<(), PipelineError> {
        session.complete_step(step, context(summary));
        self.store.save(session).await?;
        tracing::info!(session_id = %session.id, %step, "step complete");
        Ok(())
    }

    /// Records the failure as `blocked`, persists, and returns the error to
    /// surface. A failing store takes precedence.
    async fn collaborator_failure(&self, session: &mut Session, step: Step, source: SourceError) -> PipelineError {
        session.block_step(step, &source);
        tracing::warn!(session_id = %session.id, %step, error = %source, "step blocked");

        match self.store.save(session).await {
            Ok(()) => PipelineError::CollaboratorFailure { step, source },
            Err(store_error) => PipelineError::Store(store_error),
        }
    }

    async fn build_universe(&self, options: UniverseStepOptions) -> Result<Universe, SourceError> {
        let provider_options = ProviderOptions {
            use_cache: options.use_cache,
            common_stock_only: options.common_stock_only,
        };

        let exchanges = self.provider.list_exchanges(provider_options).await?;
        let selected: Vec<String> = exchanges
            .payload
            .iter()
            .take(self.max_exchanges.unwrap_or(usize::MAX))
            .map(|exchange| exchange.code.clone())
            .collect();
        tracing::debug!(
            available = exchanges.payload.len(),
            selected = selected.len(),
            "fetching exchange symbols"
        );

        let provider = &self.provider;
        let symbols: Vec<ExchangeSymbols> = stream::iter(selected)
            .map(|exchange_code| async move {
                let symbols = provider.list_symbols(&exchange_code, provider_options).await?;
                Ok::<_, SourceError>(ExchangeSymbols {
                    exchange_code,
                    symbols,
                })
            })
            .buffered(self.universe_concurrency)
            .try_collect()
            .await?;

        Ok(Universe {
            exchanges,
            symbols,
            common_stock_only: options.common_stock_only,
        })
    }
}

/// Coverage and referential checks over a matched session.
fn validate_matches(session: &Session) -> Result<(), String> {
    let holdings = session
        .holdings
        .as_ref()
        .map(|result| result.entries.as_slice())
        .unwrap_or_default();
    let matches = session.matches.as_deref().unwrap_or_default();

    if matches.len() != holdings.len() {
        return Err(format!(
            "{} candidates for {} holdings",
            matches.len(),
            holdings.len()
        ));
    }

    let mut seen = HashSet::with_capacity(matches.len());
    for candidate in matches {
        if !seen.insert(candidate.holding_symbol.as_str()) {
            return Err(format!("duplicate candidate for holding {}", candidate.holding_symbol));
        }
    }
    if let Some(missing) = holdings.iter().find(|holding| !seen.contains(holding.symbol.as_str())) {
        return Err(format!("no candidate for holding {}", missing.symbol));
    }

    for candidate in matches {
        let Some(record) = &candidate.matched_record else {
            continue;
        };
        let known = session
            .universe
            .as_ref()
            .and_then(|universe| universe.find_record(&record.exchange_code, &record.code))
            .is_some();
        if !known {
            return Err(format!(
                "holding {} matched {} which is not in the universe",
                candidate.holding_symbol,
                record.key()
            ));
        }
    }

    Ok(())
}

fn context(value: Value) -> StepContext {
    match value {
        Value::Object(map) => map,
        _ => StepContext::new(),
    }
}
