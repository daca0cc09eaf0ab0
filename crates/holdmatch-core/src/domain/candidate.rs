use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::{HoldingEntry, SecurityRecord};

/// Cascade step that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Code,
    HyphenatedCode,
    ExactName,
    FuzzyName,
    Manual,
}

impl MatchStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::HyphenatedCode => "hyphenated_code",
            Self::ExactName => "exact_name",
            Self::FuzzyName => "fuzzy_name",
            Self::Manual => "manual",
        }
    }
}

impl Display for MatchStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proposed linkage between one holding and zero or one security record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub holding_symbol: String,
    pub holding_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_record: Option<SecurityRecord>,
    pub confidence: f64,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub manually_resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<MatchStrategy>,
}

impl MatchCandidate {
    pub fn matched(
        holding: &HoldingEntry,
        record: SecurityRecord,
        confidence: f64,
        strategy: MatchStrategy,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            holding_symbol: holding.symbol.clone(),
            holding_name: holding.company_name.clone(),
            matched_record: Some(record),
            confidence: confidence.clamp(0.0, 1.0),
            reasons: vec![reason.into()],
            manually_resolved: false,
            strategy: Some(strategy),
        }
    }

    pub fn unmatched(holding: &HoldingEntry, reason: impl Into<String>) -> Self {
        Self {
            holding_symbol: holding.symbol.clone(),
            holding_name: holding.company_name.clone(),
            matched_record: None,
            confidence: 0.0,
            reasons: vec![reason.into()],
            manually_resolved: false,
            strategy: None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched_record.is_some()
    }
}
