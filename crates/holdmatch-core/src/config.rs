//! Pipeline configuration from defaults and environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::matching::{DEFAULT_EXCHANGE_PRIORITY, DEFAULT_FUZZY_THRESHOLD};
use crate::ValidationError;

pub const HOME_ENV: &str = "HOLDMATCH_HOME";
pub const MAX_EXCHANGES_ENV: &str = "HOLDMATCH_MAX_EXCHANGES";
pub const MATCH_WORKERS_ENV: &str = "HOLDMATCH_MATCH_WORKERS";
pub const UNIVERSE_CONCURRENCY_ENV: &str = "HOLDMATCH_UNIVERSE_CONCURRENCY";
pub const FUZZY_THRESHOLD_ENV: &str = "HOLDMATCH_FUZZY_THRESHOLD";
pub const API_KEY_ENVS: [&str; 2] = ["HOLDMATCH_EODHD_API_KEY", "EODHD_API_KEY"];

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Root for `cache/` and `sessions/`.
    pub home: PathBuf,
    /// Exchanges fetched by the universe step; `None` fetches all.
    pub max_exchanges: Option<usize>,
    pub universe_concurrency: usize,
    pub match_workers: usize,
    pub exchange_priority: Vec<String>,
    /// 0–100.
    pub fuzzy_threshold: f64,
    pub exchange_ttl: Option<Duration>,
    pub symbol_ttl: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(".holdmatch"),
            max_exchanges: None,
            universe_concurrency: 4,
            match_workers: 4,
            exchange_priority: DEFAULT_EXCHANGE_PRIORITY
                .iter()
                .map(|code| (*code).to_owned())
                .collect(),
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            exchange_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            symbol_ttl: Some(Duration::from_secs(7 * 24 * 60 * 60)),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source. Unset or blank
    /// variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let get = |name: &str| lookup(name).map(|value| value.trim().to_owned()).filter(|v| !v.is_empty());
        let mut config = Self {
            home: resolve_home(get(HOME_ENV), get("HOME")),
            ..Self::default()
        };

        if let Some(value) = get(MAX_EXCHANGES_ENV) {
            let max = parse_count(MAX_EXCHANGES_ENV, &value)?;
            config.max_exchanges = (max > 0).then_some(max);
        }
        if let Some(value) = get(MATCH_WORKERS_ENV) {
            config.match_workers = parse_count(MATCH_WORKERS_ENV, &value)?.max(1);
        }
        if let Some(value) = get(UNIVERSE_CONCURRENCY_ENV) {
            config.universe_concurrency = parse_count(UNIVERSE_CONCURRENCY_ENV, &value)?.max(1);
        }
        if let Some(value) = get(FUZZY_THRESHOLD_ENV) {
            config.fuzzy_threshold = value
                .parse::<f64>()
                .ok()
                .filter(|threshold| threshold.is_finite())
                .ok_or(ValidationError::InvalidSetting {
                    name: FUZZY_THRESHOLD_ENV,
                    value: value.clone(),
                })?;
            config.validate()?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=100.0).contains(&self.fuzzy_threshold) {
            return Err(ValidationError::OutOfRange {
                field: "fuzzy_threshold",
                min: 0.0,
                max: 100.0,
            });
        }
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.home.join("sessions")
    }
}

/// First configured API token, if any.
pub fn api_token_from_env() -> Option<String> {
    API_KEY_ENVS
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|value| value.trim().to_owned())
        .find(|value| !value.is_empty())
}

/// `$HOLDMATCH_HOME`, else `$HOME/.holdmatch`, else `./.holdmatch`.
fn resolve_home(explicit: Option<String>, user_home: Option<String>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Some(home) = user_home {
        return PathBuf::from(home).join(".holdmatch");
    }
    PathBuf::from(".holdmatch")
}

fn parse_count(name: &'static str, value: &str) -> Result<usize, ValidationError> {
    value.parse().map_err(|_| ValidationError::InvalidSetting {
        name,
        value: value.to_owned(),
    })
}
