use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// Instant in UTC, persisted as RFC3339 with a `Z` suffix.
///
/// Cache rows, sessions, and step states all stamp time through this type.
/// Subsecond precision is kept, so a value read back from JSON compares equal
/// to the one written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Accepts RFC3339 input with a zero offset only.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        OffsetDateTime::parse(input.trim(), &Rfc3339)
            .ok()
            .filter(|value| value.offset() == UtcOffset::UTC)
            .map(Self)
            .ok_or_else(|| ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            })
    }

    /// `self + ttl`, clamped at the latest representable instant.
    pub fn saturating_add(self, ttl: Duration) -> Self {
        Self(self.0.saturating_add(signed(ttl)))
    }

    /// `self - ttl`, clamped at the earliest representable instant.
    pub fn saturating_sub(self, ttl: Duration) -> Self {
        Self(self.0.saturating_sub(signed(ttl)))
    }

    pub fn is_before(self, other: Self) -> bool {
        self < other
    }

    pub fn format_rfc3339(self) -> String {
        // A UTC offset and a year within 0..=9999 always format.
        self.0
            .format(&Rfc3339)
            .expect("UtcDateTime is always RFC3339 formattable")
    }
}

fn signed(ttl: Duration) -> time::Duration {
    time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX)
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl FromStr for UtcDateTime {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for UtcDateTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UtcDateTime> for String {
    fn from(value: UtcDateTime) -> Self {
        value.format_rfc3339()
    }
}
