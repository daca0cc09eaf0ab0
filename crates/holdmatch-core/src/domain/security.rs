use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Instrument type label the provider uses for ordinary shares.
pub const COMMON_STOCK: &str = "Common Stock";

/// Exchange metadata from the provider's exchange list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSummary {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub operating_mic: String,
}

/// One exchange-listed security. Identified by `(exchange_code, code)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRecord {
    pub code: String,
    pub name: String,
    pub exchange_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_type: Option<String>,
}

impl SecurityRecord {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        exchange_code: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            exchange_code: exchange_code.into(),
            country: None,
            currency: None,
            isin: None,
            security_type: None,
        }
    }

    pub fn with_security_type(mut self, security_type: impl Into<String>) -> Self {
        self.security_type = Some(security_type.into());
        self
    }

    pub fn key(&self) -> SecurityKey {
        SecurityKey {
            exchange_code: self.exchange_code.clone(),
            code: self.code.clone(),
        }
    }

    /// Records without a code or a name can never be matched.
    pub fn is_matchable(&self) -> bool {
        !self.code.trim().is_empty() && !self.name.trim().is_empty()
    }

    /// Untyped records are kept; only an explicit non-common type is excluded.
    pub fn is_common_stock(&self) -> bool {
        self.security_type
            .as_deref()
            .map(|kind| kind.eq_ignore_ascii_case(COMMON_STOCK))
            .unwrap_or(true)
    }
}

/// Identity of a [`SecurityRecord`] within the universe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityKey {
    pub exchange_code: String,
    pub code: String,
}

impl Display for SecurityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.code, self.exchange_code)
    }
}
