use thiserror::Error;

use crate::data_source::SourceError;
use crate::session::{SessionStoreError, Step};

/// Validation errors raised while parsing domain values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("company name cannot be empty")]
    EmptyCompanyName,

    #[error("exchange code cannot be empty")]
    EmptyExchangeCode,

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("invalid step '{value}', expected one of scrape, universe, match, validate, review")]
    InvalidStep { value: String },

    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidSetting { name: &'static str, value: String },

    #[error("field '{field}' must be within [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
    },
}

/// Errors surfaced by pipeline operations.
///
/// `PreconditionNotMet` and `SessionNotFound` are caller errors and leave the
/// session untouched. `CollaboratorFailure` and `Validation` are recorded into
/// the failing step's `blocked` context before being returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("step '{step}' requires step '{required}' to be complete")]
    PreconditionNotMet { step: Step, required: Step },

    #[error("session '{session_id}' not found")]
    SessionNotFound { session_id: String },

    #[error("step '{step}' failed: {source}")]
    CollaboratorFailure {
        step: Step,
        #[source]
        source: SourceError,
    },

    #[error("invalid override for holding '{holding_symbol}': {reason}")]
    InvalidOverride {
        holding_symbol: String,
        reason: String,
    },

    #[error("step '{step}' validation failed: {message}")]
    Validation { step: Step, message: String },

    #[error(transparent)]
    Store(#[from] SessionStoreError),
}

impl PipelineError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PreconditionNotMet { .. } => "pipeline.precondition_not_met",
            Self::SessionNotFound { .. } => "pipeline.session_not_found",
            Self::CollaboratorFailure { .. } => "pipeline.collaborator_failure",
            Self::InvalidOverride { .. } => "pipeline.invalid_override",
            Self::Validation { .. } => "pipeline.validation_failed",
            Self::Store(_) => "pipeline.store",
        }
    }

    /// Caller errors are never recorded into step state.
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::PreconditionNotMet { .. }
                | Self::SessionNotFound { .. }
                | Self::InvalidOverride { .. }
        )
    }
}
