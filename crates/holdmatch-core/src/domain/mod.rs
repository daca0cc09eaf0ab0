//! # Domain Models
//!
//! Canonical types shared by the scraper, provider, matching engine, and
//! pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`HoldingEntry`] | Scraped portfolio row (symbol + company name) |
//! | [`HoldingSymbol`] | Holding symbol split into base code and target exchange |
//! | [`ExchangeSummary`] | Provider exchange metadata |
//! | [`SecurityRecord`] | Exchange-listed security from the provider universe |
//! | [`MatchCandidate`] | Proposed holding → security linkage |
//! | [`UtcDateTime`] | UTC timestamp with RFC3339 serialization |

mod candidate;
mod holding;
mod security;
mod timestamp;

pub use candidate::{MatchCandidate, MatchStrategy};
pub use holding::{exchange_for_suffix, HoldingEntry, HoldingSymbol, PRIMARY_EXCHANGE};
pub use security::{ExchangeSummary, SecurityKey, SecurityRecord, COMMON_STOCK};
pub use timestamp::UtcDateTime;
