use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Exchange assumed for symbols that carry no recognised suffix.
pub const PRIMARY_EXCHANGE: &str = "US";

/// Holding suffix → provider exchange code.
const SUFFIX_EXCHANGES: [(&str, &str); 9] = [
    ("KS", "KO"),
    ("SZ", "SHE"),
    ("SS", "SHG"),
    ("L", "LSE"),
    ("TO", "TO"),
    ("V", "V"),
    ("DE", "XETRA"),
    ("HK", "HK"),
    ("T", "T"),
];

/// Maps a holding symbol suffix (`HK` in `0700.HK`) to the provider exchange code.
pub fn exchange_for_suffix(suffix: &str) -> Option<&'static str> {
    SUFFIX_EXCHANGES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(suffix))
        .map(|(_, exchange)| *exchange)
}

/// One row of the scraped portfolio dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingEntry {
    pub symbol: String,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_hint: Option<String>,
}

impl HoldingEntry {
    /// Builds a holding, normalizing the symbol to uppercase without whitespace.
    pub fn new(symbol: &str, company_name: &str) -> Result<Self, ValidationError> {
        let symbol: String = symbol
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        for (index, ch) in symbol.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '/' | '^');
            if !valid {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        let company_name = company_name.trim();
        if company_name.is_empty() {
            return Err(ValidationError::EmptyCompanyName);
        }

        Ok(Self {
            symbol,
            company_name: company_name.to_owned(),
            exchange_hint: None,
        })
    }

    pub fn with_exchange_hint(mut self, exchange: impl Into<String>) -> Self {
        self.exchange_hint = Some(exchange.into());
        self
    }

    pub fn parsed_symbol(&self) -> HoldingSymbol {
        HoldingSymbol::parse(&self.symbol, self.exchange_hint.as_deref())
    }

    /// Case-insensitive identity used for scrape deduplication.
    pub fn dedup_key(&self) -> (String, String) {
        (
            self.symbol.to_ascii_uppercase(),
            self.company_name.to_uppercase(),
        )
    }
}

/// Holding symbol split into base code and target exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldingSymbol {
    /// Symbol as scraped.
    pub raw: String,
    /// Symbol with a recognised exchange suffix removed.
    pub base: String,
    /// Recognised exchange suffix, if any.
    pub suffix: Option<String>,
    /// Provider exchange the holding most likely trades on.
    pub target_exchange: String,
}

impl HoldingSymbol {
    /// Parses `raw`. Only suffixes present in the exchange table are stripped, so
    /// share-class symbols such as `BRK.B` keep their dot and target the primary
    /// exchange. Without a suffix the `exchange_hint` (if any) picks the target.
    pub fn parse(raw: &str, exchange_hint: Option<&str>) -> Self {
        let raw = raw.trim().to_ascii_uppercase();

        if let Some((base, suffix)) = raw.rsplit_once('.') {
            if !base.is_empty() {
                if let Some(exchange) = exchange_for_suffix(suffix) {
                    return Self {
                        base: base.to_owned(),
                        suffix: Some(suffix.to_owned()),
                        target_exchange: exchange.to_owned(),
                        raw: raw.clone(),
                    };
                }
            }
        }

        let target_exchange = exchange_hint
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| String::from(PRIMARY_EXCHANGE));

        Self {
            base: raw.clone(),
            suffix: None,
            target_exchange,
            raw,
        }
    }

    /// Share-class spelling used by the provider (`BRK.B` → `BRK-B`).
    pub fn hyphenated(&self) -> Option<String> {
        self.base
            .contains('.')
            .then(|| self.base.replace('.', "-"))
    }
}
