use holdmatch_core::{Override, SecurityRecord};
use serde_json::Value;

use crate::cli::ConfirmArgs;
use crate::error::CliError;

use super::Runtime;

pub async fn run(runtime: &Runtime, args: &ConfirmArgs) -> Result<Value, CliError> {
    let decision = match (&args.exchange, &args.code, args.unavailable) {
        (_, _, true) => Override::Unavailable,
        (Some(exchange), Some(code), false) => Override::Record(SecurityRecord::new(
            code.trim(),
            "",
            exchange.trim().to_ascii_uppercase(),
        )),
        _ => {
            return Err(CliError::Command(String::from(
                "confirm needs --exchange and --code, or --unavailable",
            )))
        }
    };

    let _guard = runtime.locks.lock(&args.session_id).await;
    let candidate = runtime
        .pipeline
        .confirm_match(&args.session_id, &args.holding_symbol, decision)
        .await?;

    Ok(serde_json::to_value(candidate)?)
}
