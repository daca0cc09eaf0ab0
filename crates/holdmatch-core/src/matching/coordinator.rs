use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use super::engine::{ExchangeIndex, MatchingEngine};
use crate::cache::{CacheDescriptor, CacheScope, CacheStore};
use crate::data_source::{Origin, SourceError};
use crate::session::Universe;
use crate::{HoldingEntry, MatchCandidate, SecurityRecord};

pub const MATCHING_SOURCE_ID: &str = "matching";

/// Exchanges tried first, most likely listing venue first.
pub const DEFAULT_EXCHANGE_PRIORITY: [&str; 10] =
    ["US", "LSE", "TO", "XETRA", "V", "HK", "T", "KO", "SHG", "SHE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchOptions {
    pub use_cache: bool,
    pub common_stock_only: bool,
}

/// Coordinator result: one candidate per holding, in holding order.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub candidates: Vec<MatchCandidate>,
    pub origin: Origin,
}

impl MatchOutcome {
    pub fn matched_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.is_matched()).count()
    }
}

/// Runs the engine across every exchange of a universe.
///
/// Exchanges are ordered by priority and dispatched in waves of at most
/// `workers` blocking tasks. All batches of a wave see the unmatched pool as
/// it stood when the wave began; results merge in priority order and the
/// first exchange to match a holding claims it.
#[derive(Clone)]
pub struct MatchingCoordinator {
    engine: MatchingEngine,
    workers: usize,
    priority: Vec<String>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl Default for MatchingCoordinator {
    fn default() -> Self {
        Self::new(MatchingEngine::default())
    }
}

struct Batch {
    exchange_code: String,
    records: Vec<SecurityRecord>,
}

impl MatchingCoordinator {
    pub fn new(engine: MatchingEngine) -> Self {
        Self {
            engine,
            workers: 4,
            priority: DEFAULT_EXCHANGE_PRIORITY.iter().map(|code| (*code).to_owned()).collect(),
            cache: None,
        }
    }

    /// Values below 1 are treated as 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_priority(mut self, priority: Vec<String>) -> Self {
        self.priority = priority
            .into_iter()
            .map(|code| code.trim().to_ascii_uppercase())
            .collect();
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn engine(&self) -> &MatchingEngine {
        &self.engine
    }

    pub fn descriptor(holding_count: usize, batch_count: usize, common_stock_only: bool) -> CacheDescriptor {
        let mode = if common_stock_only { "common" } else { "all" };
        CacheDescriptor::new(
            CacheScope::Derived,
            MATCHING_SOURCE_ID,
            format!("matches:{holding_count}:{batch_count}:{mode}"),
        )
    }

    pub async fn run(
        &self,
        holdings: &[HoldingEntry],
        universe: &Universe,
        options: MatchOptions,
    ) -> Result<MatchOutcome, SourceError> {
        let descriptor = Self::descriptor(holdings.len(), universe.batch_count(), options.common_stock_only);

        if options.use_cache {
            if let Some(cached) = self.read_cached(&descriptor, holdings, universe).await {
                return Ok(MatchOutcome {
                    candidates: cached,
                    origin: Origin::Cache,
                });
            }
        }

        let candidates = self.match_all(holdings, universe, options.common_stock_only).await?;

        if let Some(cache) = &self.cache {
            cache.write_or_wrap(&descriptor, &candidates).await;
        }

        Ok(MatchOutcome {
            candidates,
            origin: Origin::Live,
        })
    }

    /// A cached result only counts if it covers exactly these holdings and
    /// every matched record is still listed in `universe`.
    async fn read_cached(
        &self,
        descriptor: &CacheDescriptor,
        holdings: &[HoldingEntry],
        universe: &Universe,
    ) -> Option<Vec<MatchCandidate>> {
        let cached = self
            .cache
            .as_ref()?
            .read_or_miss::<Vec<MatchCandidate>>(descriptor)
            .await?
            .payload;

        let covers = cached.len() == holdings.len()
            && cached
                .iter()
                .zip(holdings)
                .all(|(candidate, holding)| candidate.holding_symbol == holding.symbol);
        if !covers {
            tracing::debug!(key = %descriptor.cache_key(), "cached matches do not cover holdings; recomputing");
            return None;
        }

        let listed = cached
            .iter()
            .filter_map(|candidate| candidate.matched_record.as_ref())
            .all(|record| universe.find_record(&record.exchange_code, &record.code) == Some(record));
        if !listed {
            tracing::debug!(key = %descriptor.cache_key(), "cached matches reference records outside the universe; recomputing");
            return None;
        }
        Some(cached)
    }

    async fn match_all(
        &self,
        holdings: &[HoldingEntry],
        universe: &Universe,
        common_stock_only: bool,
    ) -> Result<Vec<MatchCandidate>, SourceError> {
        let batches = self.ordered_batches(universe, common_stock_only);
        let available: HashSet<String> = batches.iter().map(|batch| batch.exchange_code.clone()).collect();

        let mut claimed: Vec<Option<MatchCandidate>> = vec![None; holdings.len()];
        let mut batches = batches.into_iter().peekable();

        while batches.peek().is_some() {
            let pool: Arc<Vec<(usize, HoldingEntry)>> = Arc::new(
                holdings
                    .iter()
                    .enumerate()
                    .filter(|(position, _)| claimed[*position].is_none())
                    .map(|(position, holding)| (position, holding.clone()))
                    .collect(),
            );
            if pool.is_empty() {
                break;
            }

            let wave: Vec<Batch> = batches.by_ref().take(self.workers).collect();
            let tasks = wave.into_iter().map(|batch| {
                let pool = Arc::clone(&pool);
                let engine = self.engine;
                tokio::task::spawn_blocking(move || match_batch(engine, batch, &pool))
            });

            for joined in join_all(tasks).await {
                let (exchange_code, results) = joined
                    .map_err(|error| SourceError::internal(format!("matching task failed: {error}")))?;

                let mut newly_claimed = 0_usize;
                for (position, candidate) in results {
                    if claimed[position].is_none() {
                        claimed[position] = Some(candidate);
                        newly_claimed += 1;
                    }
                }
                tracing::debug!(exchange = %exchange_code, newly_claimed, "merged exchange batch");
            }
        }

        Ok(holdings
            .iter()
            .zip(claimed)
            .map(|(holding, candidate)| {
                candidate.unwrap_or_else(|| {
                    let target = holding.parsed_symbol().target_exchange;
                    self.engine.unmatched(holding, available.contains(&target))
                })
            })
            .collect())
    }

    /// Non-empty batches, priority list first, then by descending size, then code.
    fn ordered_batches(&self, universe: &Universe, common_stock_only: bool) -> Vec<Batch> {
        let mut batches: Vec<Batch> = universe
            .symbols
            .iter()
            .map(|batch| Batch {
                exchange_code: batch.exchange_code.clone(),
                records: batch
                    .symbols
                    .payload
                    .iter()
                    .filter(|record| !common_stock_only || record.is_common_stock())
                    .cloned()
                    .collect(),
            })
            .filter(|batch| !batch.records.is_empty())
            .collect();

        let rank = |code: &str| {
            self.priority
                .iter()
                .position(|candidate| candidate == code)
                .unwrap_or(usize::MAX)
        };
        batches.sort_by(|left, right| {
            rank(&left.exchange_code)
                .cmp(&rank(&right.exchange_code))
                .then_with(|| right.records.len().cmp(&left.records.len()))
                .then_with(|| left.exchange_code.cmp(&right.exchange_code))
        });
        batches
    }
}

fn match_batch(
    engine: MatchingEngine,
    batch: Batch,
    pool: &[(usize, HoldingEntry)],
) -> (String, Vec<(usize, MatchCandidate)>) {
    let index = ExchangeIndex::build(batch.exchange_code, &batch.records);
    let results = pool
        .iter()
        .filter_map(|(position, holding)| {
            engine
                .match_indexed(holding, &index)
                .map(|candidate| (*position, candidate))
        })
        .collect();
    (index.exchange_code().to_owned(), results)
}
