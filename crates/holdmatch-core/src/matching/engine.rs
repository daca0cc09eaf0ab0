use std::collections::HashMap;

use super::normalize::normalize_name;
use super::similarity::{sort_tokens, SortedPattern};
use crate::{HoldingEntry, MatchCandidate, MatchStrategy, SecurityRecord};

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 85.0;

const NAME_MATCH_CONFIDENCE: f64 = 0.9;

pub const REASON_DIRECT: &str = "Direct symbol match";
pub const REASON_HYPHENATED: &str = "Symbol match with dot-to-hyphen substitution";
pub const REASON_EXACT_NAME: &str = "Exact normalized name match";
pub const REASON_NO_MATCH: &str = "No match found";
pub const REASON_CONFIRMED: &str = "Manually confirmed";
pub const REASON_UNAVAILABLE: &str = "Manually marked as not available";

/// Lookup structures for one exchange's records, built once per batch.
#[derive(Debug, Clone)]
pub struct ExchangeIndex {
    exchange_code: String,
    records: Vec<SecurityRecord>,
    by_code: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    /// Distinct normalized names in first-seen order, token-sorted.
    names: Vec<IndexedName>,
}

#[derive(Debug, Clone)]
struct IndexedName {
    sorted: String,
    len: usize,
    record: usize,
}

impl ExchangeIndex {
    /// Unmatchable records (empty code or name) are dropped.
    pub fn build(exchange_code: impl Into<String>, records: &[SecurityRecord]) -> Self {
        let records: Vec<SecurityRecord> = records
            .iter()
            .filter(|record| record.is_matchable())
            .cloned()
            .collect();

        let mut by_code = HashMap::with_capacity(records.len());
        let mut by_name = HashMap::with_capacity(records.len());
        let mut names = Vec::new();

        for (position, record) in records.iter().enumerate() {
            by_code.entry(record.code.clone()).or_insert(position);

            let normalized = normalize_name(&record.name);
            if normalized.is_empty() || by_name.contains_key(&normalized) {
                continue;
            }
            let sorted = sort_tokens(&normalized);
            names.push(IndexedName {
                len: sorted.chars().count(),
                sorted,
                record: position,
            });
            by_name.insert(normalized, position);
        }

        Self {
            exchange_code: exchange_code.into(),
            records,
            by_code,
            by_name,
            names,
        }
    }

    pub fn exchange_code(&self) -> &str {
        &self.exchange_code
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn by_code(&self, code: &str) -> Option<&SecurityRecord> {
        self.by_code.get(code).map(|position| &self.records[*position])
    }
}

/// Strategy cascade over one holding and one exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingEngine {
    fuzzy_threshold: f64,
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZY_THRESHOLD)
    }
}

impl MatchingEngine {
    /// `fuzzy_threshold` is on the 0–100 scale and clamped into it.
    pub fn new(fuzzy_threshold: f64) -> Self {
        Self {
            fuzzy_threshold: fuzzy_threshold.clamp(0.0, 100.0),
        }
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold
    }

    /// Convenience over [`match_indexed`](Self::match_indexed) for a single call.
    pub fn match_holding(
        &self,
        holding: &HoldingEntry,
        exchange_code: &str,
        records: &[SecurityRecord],
    ) -> Option<MatchCandidate> {
        self.match_indexed(holding, &ExchangeIndex::build(exchange_code, records))
    }

    /// First accepting strategy wins; `None` when none accepts.
    pub fn match_indexed(&self, holding: &HoldingEntry, index: &ExchangeIndex) -> Option<MatchCandidate> {
        let symbol = holding.parsed_symbol();

        if symbol.target_exchange == index.exchange_code {
            if let Some(record) = index.by_code(&symbol.base) {
                return Some(MatchCandidate::matched(
                    holding,
                    record.clone(),
                    1.0,
                    MatchStrategy::Code,
                    REASON_DIRECT,
                ));
            }

            if let Some(record) = symbol.hyphenated().and_then(|code| index.by_code(&code)) {
                return Some(MatchCandidate::matched(
                    holding,
                    record.clone(),
                    1.0,
                    MatchStrategy::HyphenatedCode,
                    REASON_HYPHENATED,
                ));
            }
        }

        let normalized = normalize_name(&holding.company_name);
        if normalized.is_empty() {
            return None;
        }

        if let Some(position) = index.by_name.get(&normalized) {
            return Some(MatchCandidate::matched(
                holding,
                index.records[*position].clone(),
                NAME_MATCH_CONFIDENCE,
                MatchStrategy::ExactName,
                REASON_EXACT_NAME,
            ));
        }

        self.fuzzy(holding, &normalized, index)
    }

    fn fuzzy(&self, holding: &HoldingEntry, normalized: &str, index: &ExchangeIndex) -> Option<MatchCandidate> {
        let pattern = SortedPattern::new(normalized);
        let mut best: Option<(f64, usize)> = None;

        for name in &index.names {
            let floor = best.map(|(score, _)| score).unwrap_or(self.fuzzy_threshold);
            if pattern.ratio_upper_bound(name.len) < floor {
                continue;
            }
            let score = pattern.ratio(&name.sorted);
            let improves = match best {
                Some((current, _)) => score > current,
                None => score >= self.fuzzy_threshold,
            };
            if improves {
                best = Some((score, name.record));
            }
        }

        let (score, position) = best?;
        Some(MatchCandidate::matched(
            holding,
            index.records[position].clone(),
            score / 100.0,
            MatchStrategy::FuzzyName,
            format!("Fuzzy name match (score: {score:.1})"),
        ))
    }

    /// Explicit unmatched candidate. `exchange_available` says whether the
    /// holding's target exchange was part of the searched universe.
    pub fn unmatched(&self, holding: &HoldingEntry, exchange_available: bool) -> MatchCandidate {
        if exchange_available {
            return MatchCandidate::unmatched(holding, REASON_NO_MATCH);
        }
        let target = holding.parsed_symbol().target_exchange;
        MatchCandidate::unmatched(holding, format!("Exchange {target} data not available"))
    }

    /// Human override. Never consults the cascade.
    pub fn confirm_match(candidate: &MatchCandidate, record: Option<SecurityRecord>) -> MatchCandidate {
        let reason = if record.is_some() {
            REASON_CONFIRMED
        } else {
            REASON_UNAVAILABLE
        };

        MatchCandidate {
            holding_symbol: candidate.holding_symbol.clone(),
            holding_name: candidate.holding_name.clone(),
            matched_record: record,
            confidence: 1.0,
            reasons: vec![String::from(reason)],
            manually_resolved: true,
            strategy: Some(MatchStrategy::Manual),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, name: &str) -> HoldingEntry {
        HoldingEntry::new(symbol, name).expect("valid holding")
    }

    fn us_universe() -> Vec<SecurityRecord> {
        vec![
            SecurityRecord::new("AAPL", "Apple Inc", "US"),
            SecurityRecord::new("BRK-B", "Berkshire Hathaway Inc", "US"),
            SecurityRecord::new("GOOGL", "Alphabet Inc Class A", "US"),
            SecurityRecord::new("", "Nameless Code", "US"),
            SecurityRecord::new("TSM", "Taiwan Semiconductor Manufacturing Co Ltd", "US"),
        ]
    }

    #[test]
    fn direct_code_match_wins_first() {
        let candidate = MatchingEngine::default()
            .match_holding(&holding("AAPL", "Something Else"), "US", &us_universe())
            .expect("match");

        assert_eq!(candidate.strategy, Some(MatchStrategy::Code));
        assert_eq!(candidate.confidence, 1.0);
        assert_eq!(candidate.reasons, vec![REASON_DIRECT]);
    }

    #[test]
    fn code_strategies_only_apply_on_target_exchange() {
        let lse = vec![SecurityRecord::new("AAPL", "Unrelated Plc", "LSE")];

        assert!(MatchingEngine::default()
            .match_holding(&holding("AAPL", "Apple Inc"), "LSE", &lse)
            .is_none());
    }

    #[test]
    fn exact_name_match_ignores_suffixes() {
        let candidate = MatchingEngine::default()
            .match_holding(&holding("BRKB", "Berkshire Hathaway"), "US", &us_universe())
            .expect("match");

        assert_eq!(candidate.strategy, Some(MatchStrategy::ExactName));
        assert_eq!(candidate.confidence, 0.9);
        assert_eq!(candidate.matched_record.map(|r| r.code), Some(String::from("BRK-B")));
    }

    #[test]
    fn fuzzy_match_reports_score_and_respects_threshold() {
        let engine = MatchingEngine::default();
        let candidate = engine
            .match_holding(&holding("TSMC", "Taiwan Semiconductor Mfg"), "US", &us_universe())
            .map(|c| c.strategy);
        assert_eq!(candidate, None);

        let candidate = engine
            .match_holding(&holding("BRKX", "Berkshire Hathway"), "US", &us_universe())
            .expect("fuzzy match");
        assert_eq!(candidate.strategy, Some(MatchStrategy::FuzzyName));
        assert!(candidate.confidence >= 0.85 && candidate.confidence < 1.0);
        assert!(candidate.reasons[0].starts_with("Fuzzy name match (score: "));
    }

    #[test]
    fn unmatched_reason_distinguishes_missing_exchange() {
        let engine = MatchingEngine::default();
        let entry = holding("XYZ.HK", "Xyz Holdings");

        let missing = engine.unmatched(&entry, false);
        let searched = engine.unmatched(&entry, true);

        assert_eq!(missing.reasons, vec!["Exchange HK data not available"]);
        assert_eq!(searched.reasons, vec![REASON_NO_MATCH]);
        assert_eq!(missing.confidence, 0.0);
        assert!(missing.matched_record.is_none());
    }

    #[test]
    fn confirm_match_is_idempotent() {
        let entry = holding("AAPL", "Apple Inc");
        let unmatched = MatchingEngine::default().unmatched(&entry, true);
        let record = SecurityRecord::new("AAPL", "Apple Inc", "US");

        let once = MatchingEngine::confirm_match(&unmatched, Some(record.clone()));
        let twice = MatchingEngine::confirm_match(&once, Some(record));

        assert_eq!(once, twice);
        assert_eq!(once.confidence, 1.0);
        assert!(once.manually_resolved);
        assert_eq!(once.reasons, vec![REASON_CONFIRMED]);
    }

    #[test]
    fn index_skips_unmatchable_records() {
        let index = ExchangeIndex::build("US", &us_universe());
        assert_eq!(index.len(), 4);
    }
}
