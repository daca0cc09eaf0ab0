//! # Matching
//!
//! [`MatchingEngine`] runs the strategy cascade for one holding against one
//! exchange:
//!
//! | Order | Strategy | Confidence |
//! |-------|----------|------------|
//! | 1 | direct code on the target exchange | 1.0 |
//! | 2 | code with `.` → `-` | 1.0 |
//! | 3 | exact normalized name | 0.9 |
//! | 4 | token-sort fuzzy name above threshold | score / 100 |
//!
//! [`MatchingCoordinator`] scales the engine across a [`Universe`](crate::session::Universe)
//! and guarantees exactly one candidate per holding.

mod coordinator;
mod engine;
mod normalize;
mod similarity;

pub use coordinator::{
    MatchOptions, MatchOutcome, MatchingCoordinator, DEFAULT_EXCHANGE_PRIORITY, MATCHING_SOURCE_ID,
};
pub use engine::{
    ExchangeIndex, MatchingEngine, DEFAULT_FUZZY_THRESHOLD, REASON_CONFIRMED, REASON_DIRECT,
    REASON_EXACT_NAME, REASON_HYPHENATED, REASON_NO_MATCH, REASON_UNAVAILABLE,
};
pub use normalize::normalize_name;
pub use similarity::token_sort_ratio;
