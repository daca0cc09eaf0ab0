//! Collaborator contracts for external data.
//!
//! The pipeline consumes two collaborators:
//!
//! | Trait | Operation | Result |
//! |-------|-----------|--------|
//! | [`Scraper`] | [`fetch`](Scraper::fetch) | deduplicated [`HoldingEntry`] list + [`Origin`] |
//! | [`Provider`] | [`list_exchanges`](Provider::list_exchanges) | cached [`ExchangeSummary`] list |
//! | [`Provider`] | [`list_symbols`](Provider::list_symbols) | cached [`SecurityRecord`] list for one exchange |
//!
//! Both consult a [`CacheStore`](crate::cache::CacheStore) internally and
//! report whether the result came from the cache or a live fetch.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::cache::CachedPayload;
use crate::{ExchangeSummary, HoldingEntry, SecurityRecord};

/// Where a collaborator result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Cache,
    Live,
}

impl Origin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Live => "live",
        }
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborator error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    InvalidResponse,
    InvalidRequest,
    Internal,
}

/// Structured collaborator error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidResponse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidResponse => "source.invalid_response",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Options for [`Scraper::fetch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOptions {
    pub use_cache: bool,
    /// Caller-chosen cache key overriding the derived one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_token: Option<String>,
    /// Minimum portfolio weight filter; `None` or `0` disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_percent: Option<f64>,
    /// Stops pagination once this many rows are collected; `None` or `0`
    /// fetches every page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

impl ScrapeOptions {
    pub fn entry_cap(&self) -> Option<usize> {
        self.max_entries.filter(|cap| *cap > 0)
    }
}

/// Holdings returned by a scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub entries: Vec<HoldingEntry>,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<CachedPayload<Vec<HoldingEntry>>>,
}

/// Options for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOptions {
    pub use_cache: bool,
    #[serde(default)]
    pub common_stock_only: bool,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            common_stock_only: false,
        }
    }
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Portfolio holdings source.
pub trait Scraper: Send + Sync {
    /// Returns holdings deduplicated by `(symbol, company_name)`, first
    /// occurrence kept.
    fn fetch<'a>(&'a self, options: &'a ScrapeOptions) -> SourceFuture<'a, ScrapeResult>;
}

/// Exchange universe source.
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    fn list_exchanges<'a>(
        &'a self,
        options: ProviderOptions,
    ) -> SourceFuture<'a, CachedPayload<Vec<ExchangeSummary>>>;

    fn list_symbols<'a>(
        &'a self,
        exchange_code: &'a str,
        options: ProviderOptions,
    ) -> SourceFuture<'a, CachedPayload<Vec<SecurityRecord>>>;
}

/// Drops repeated `(symbol, company_name)` pairs, compared case-insensitively.
pub fn deduplicate_entries(entries: Vec<HoldingEntry>) -> Vec<HoldingEntry> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.dedup_key()))
        .collect()
}

/// Splits entries into the first one seen per symbol and the later repeats.
pub fn first_per_symbol(entries: Vec<HoldingEntry>) -> (Vec<HoldingEntry>, Vec<HoldingEntry>) {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .partition(|entry| seen.insert(entry.symbol.to_ascii_uppercase()))
}
