use holdmatch_core::{
    CachePreferences, MatchStepOptions, PipelineError, ScrapeFilter, Session, UniverseStepOptions,
    ValidateStepOptions, ValidationError,
};
use serde_json::Value;

use crate::cli::{MatchArgs, SessionArgs, StartArgs, UniverseArgs, ValidateArgs};
use crate::error::CliError;

use super::Runtime;

pub async fn start(runtime: &Runtime, args: &StartArgs) -> Result<Value, CliError> {
    let session = runtime
        .pipeline
        .start_session(
            CachePreferences {
                use_cache: runtime.use_cache,
                source_token: args.source_token.clone(),
            },
            ScrapeFilter {
                min_percent: args.min_percent,
                max_entries: args.max_entries,
            },
        )
        .await?;
    session_json(&session)
}

pub async fn universe(runtime: &Runtime, args: &UniverseArgs) -> Result<Value, CliError> {
    let _guard = runtime.locks.lock(&args.session_id).await;
    let session = runtime
        .pipeline
        .run_universe_step(
            &args.session_id,
            UniverseStepOptions {
                use_cache: runtime.use_cache,
                common_stock_only: args.common_stock_only,
            },
        )
        .await?;
    session_json(&session)
}

pub async fn match_holdings(runtime: &Runtime, args: &MatchArgs) -> Result<Value, CliError> {
    let _guard = runtime.locks.lock(&args.session_id).await;
    let session = runtime
        .pipeline
        .run_match_step(
            &args.session_id,
            MatchStepOptions {
                use_cache: runtime.use_cache,
                common_stock_only: args.common_stock_only,
            },
        )
        .await?;
    session_json(&session)
}

pub async fn validate(runtime: &Runtime, args: &ValidateArgs) -> Result<Value, CliError> {
    if !(0.0..=1.0).contains(&args.min_confidence) {
        return Err(CliError::Validation(ValidationError::OutOfRange {
            field: "min_confidence",
            min: 0.0,
            max: 1.0,
        }));
    }

    let _guard = runtime.locks.lock(&args.session_id).await;
    let session = runtime
        .pipeline
        .run_validate_step(
            &args.session_id,
            ValidateStepOptions {
                min_confidence: args.min_confidence,
            },
        )
        .await?;
    session_json(&session)
}

pub async fn review(runtime: &Runtime, args: &SessionArgs) -> Result<Value, CliError> {
    let _guard = runtime.locks.lock(&args.session_id).await;
    let session = runtime.pipeline.complete_review(&args.session_id).await?;
    session_json(&session)
}

pub async fn show(runtime: &Runtime, args: &SessionArgs) -> Result<Value, CliError> {
    let session = runtime
        .pipeline
        .load_session(&args.session_id)
        .await?
        .ok_or_else(|| PipelineError::SessionNotFound {
            session_id: args.session_id.clone(),
        })?;
    session_json(&session)
}

fn session_json(session: &Session) -> Result<Value, CliError> {
    Ok(serde_json::to_value(session)?)
}
