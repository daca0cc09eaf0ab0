//! # Sessions
//!
//! A [`Session`] is the persisted record of one reconciliation run: the state
//! of each [`Step`], the scraped holdings, the fetched [`Universe`], and the
//! produced matches. The pipeline owns and mutates it; a [`SessionStore`]
//! only persists it.

mod locks;
mod store;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::CachedPayload;
use crate::data_source::ScrapeResult;
use crate::{ExchangeSummary, MatchCandidate, SecurityRecord, UtcDateTime, ValidationError};

pub use locks::SessionLocks;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, SessionStoreError, StoreFuture};

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Scrape,
    Universe,
    Match,
    Validate,
    Review,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Self::Scrape,
        Self::Universe,
        Self::Match,
        Self::Validate,
        Self::Review,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Universe => "universe",
            Self::Match => "match",
            Self::Validate => "validate",
            Self::Review => "review",
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ValidationError::InvalidStep {
                value: value.to_owned(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Complete,
    Blocked,
}

impl StepStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Blocked => "blocked",
        }
    }
}

impl Display for StepStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type StepContext = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub step: Step,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<StepContext>,
    pub updated_at: UtcDateTime,
}

/// Symbols fetched for one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSymbols {
    pub exchange_code: String,
    pub symbols: CachedPayload<Vec<SecurityRecord>>,
}

/// Exchange list plus per-exchange symbol batches, in fetch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Universe {
    pub exchanges: CachedPayload<Vec<ExchangeSummary>>,
    pub symbols: Vec<ExchangeSymbols>,
    #[serde(default)]
    pub common_stock_only: bool,
}

impl Universe {
    pub fn symbols_for(&self, exchange_code: &str) -> Option<&[SecurityRecord]> {
        self.symbols
            .iter()
            .find(|batch| batch.exchange_code == exchange_code)
            .map(|batch| batch.symbols.payload.as_slice())
    }

    /// The universe's stored copy of `(exchange_code, code)`.
    pub fn find_record(&self, exchange_code: &str, code: &str) -> Option<&SecurityRecord> {
        self.symbols_for(exchange_code)?
            .iter()
            .find(|record| record.code == code)
    }

    pub fn batch_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols
            .iter()
            .map(|batch| batch.symbols.payload.len())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub created_at: UtcDateTime,
    pub steps: Vec<StepState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holdings: Option<ScrapeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universe: Option<Universe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<MatchCandidate>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: UtcDateTime::now(),
            steps: Vec::new(),
            holdings: None,
            universe: None,
            matches: None,
        }
    }

    pub fn step(&self, step: Step) -> Option<&StepState> {
        self.steps.iter().find(|state| state.step == step)
    }

    /// `Pending` for steps never started.
    pub fn status(&self, step: Step) -> StepStatus {
        self.step(step)
            .map(|state| state.status)
            .unwrap_or(StepStatus::Pending)
    }

    pub fn is_complete(&self, step: Step) -> bool {
        self.status(step) == StepStatus::Complete
    }

    /// Creates the step or resets an existing one to `running`, replacing
    /// its context.
    pub fn begin_step(&mut self, step: Step, context: Option<StepContext>) {
        self.set_step(step, StepStatus::Running, context);
    }

    pub fn complete_step(&mut self, step: Step, context: StepContext) {
        self.set_step(step, StepStatus::Complete, Some(context));
    }

    pub fn block_step(&mut self, step: Step, error: impl Display) {
        let mut context = StepContext::new();
        context.insert(String::from("error"), Value::String(error.to_string()));
        self.set_step(step, StepStatus::Blocked, Some(context));
    }

    fn set_step(&mut self, step: Step, status: StepStatus, context: Option<StepContext>) {
        let updated_at = UtcDateTime::now();
        match self.steps.iter_mut().find(|state| state.step == step) {
            Some(state) => {
                state.status = status;
                state.context = context;
                state.updated_at = updated_at;
            }
            None => {
                self.steps.push(StepState {
                    step,
                    status,
                    context,
                    updated_at,
                });
                self.steps.sort_by_key(|state| state.step);
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
