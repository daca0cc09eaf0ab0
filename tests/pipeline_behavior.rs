//! Behavior-driven tests for the reconciliation pipeline
//!
//! These tests drive sessions through scrape → universe → match → validate →
//! review with in-process collaborators and check what ends up persisted.

mod support;

use std::sync::atomic::Ordering;

use holdmatch_core::{
    CachePreferences, MatchStepOptions, MatchStrategy, Override, PipelineConfig, PipelineError,
    ScrapeFilter, SecurityRecord, SessionStore, SourceError, SourceErrorKind, Step, StepStatus,
    UniverseStepOptions, ValidateStepOptions,
};
use serde_json::Value;

use support::{
    harness, harness_with_config, holding, standard_harness, standard_provider, FakeProvider,
    FakeScraper, Harness,
};

async fn started(h: &Harness) -> String {
    h.pipeline
        .start_session(CachePreferences::default(), ScrapeFilter::default())
        .await
        .expect("scrape succeeds")
        .id
}

async fn matched(h: &Harness) -> String {
    let id = started(h).await;
    h.pipeline
        .run_universe_step(&id, UniverseStepOptions::default())
        .await
        .expect("universe succeeds");
    h.pipeline
        .run_match_step(&id, MatchStepOptions::default())
        .await
        .expect("match succeeds");
    id
}

fn context_value<'a>(session: &'a holdmatch_core::Session, step: Step, key: &str) -> Option<&'a Value> {
    session.step(step)?.context.as_ref()?.get(key)
}

// =============================================================================
// Pipeline: Scrape Step
// =============================================================================

#[tokio::test]
async fn when_session_starts_scrape_is_persisted_running_then_complete() {
    // Given: A scraper with three holdings
    let h = standard_harness();

    // When: A session is started
    let session = h
        .pipeline
        .start_session(CachePreferences::default(), ScrapeFilter::default())
        .await
        .expect("start");

    // Then: The first save shows the step running, the last shows it complete
    let saves = h.store.saves();
    assert_eq!(saves.first().map(|s| s.status(Step::Scrape)), Some(StepStatus::Running));
    assert_eq!(context_value(&saves[0], Step::Scrape, "minPercent"), Some(&Value::from(0.0)));
    assert_eq!(session.status(Step::Scrape), StepStatus::Complete);
    assert_eq!(context_value(&session, Step::Scrape, "entryCount"), Some(&Value::from(3)));
    assert_eq!(context_value(&session, Step::Scrape, "origin"), Some(&Value::from("live")));
    assert_eq!(h.store.last(), session);
}

#[tokio::test]
async fn when_scraper_fails_session_is_persisted_blocked() {
    // Given: A scraper that is unavailable
    let h = harness(
        FakeScraper::failing(SourceError::unavailable("portfolio returned status 503")),
        standard_provider(),
    );

    // When: A session is started
    let error = h
        .pipeline
        .start_session(CachePreferences::default(), ScrapeFilter::default())
        .await
        .expect_err("scrape fails");

    // Then: The caller sees the failure and the store shows the blocked step
    assert!(matches!(
        error,
        PipelineError::CollaboratorFailure { step: Step::Scrape, .. }
    ));
    let stored = h.store.last();
    assert_eq!(stored.status(Step::Scrape), StepStatus::Blocked);
    let reason = context_value(&stored, Step::Scrape, "error")
        .and_then(Value::as_str)
        .expect("error recorded");
    assert!(reason.contains("status 503"));
    assert!(stored.holdings.is_none());
}

#[tokio::test]
async fn when_scrape_repeats_a_symbol_only_the_first_holding_is_kept() {
    // Given: Two scraped rows sharing AAPL under different names
    let h = harness(
        FakeScraper::with_entries(vec![
            holding("AAPL", "Apple Inc"),
            holding("AAPL", "Apple Inc Class B"),
            holding("BRK.B", "Berkshire Hathaway"),
        ]),
        standard_provider(),
    );

    // When: The session runs through validation
    let id = matched(&h).await;
    let session = h
        .pipeline
        .run_validate_step(&id, ValidateStepOptions::default())
        .await
        .expect("validate succeeds");

    // Then: One holding and one candidate remain per symbol
    let holdings = &session.holdings.as_ref().expect("holdings").entries;
    let names: Vec<_> = holdings.iter().map(|entry| entry.company_name.as_str()).collect();
    assert_eq!(names, vec!["Apple Inc", "Berkshire Hathaway"]);
    let symbols: Vec<_> = session
        .matches
        .iter()
        .flatten()
        .map(|candidate| candidate.holding_symbol.as_str())
        .collect();
    assert_eq!(symbols, vec!["AAPL", "BRK.B"]);
    assert_eq!(session.status(Step::Validate), StepStatus::Complete);
    assert_eq!(context_value(&session, Step::Scrape, "repeatedSymbolCount"), Some(&Value::from(1)));

    // And: The kept holding can still be overridden
    let confirmed = h
        .pipeline
        .confirm_match(&id, "AAPL", Override::Unavailable)
        .await
        .expect("override");
    assert!(!confirmed.is_matched());
}

// =============================================================================
// Pipeline: Preconditions
// =============================================================================

#[tokio::test]
async fn when_match_runs_before_universe_precondition_fails_without_mutation() {
    // Given: A session whose scrape is complete
    let h = standard_harness();
    let id = started(&h).await;
    let saves_before = h.store.save_count();

    // When: The match step is requested before the universe step
    let error = h
        .pipeline
        .run_match_step(&id, MatchStepOptions::default())
        .await
        .expect_err("precondition");

    // Then: The error names the missing step and nothing was written
    assert!(matches!(
        error,
        PipelineError::PreconditionNotMet {
            step: Step::Match,
            required: Step::Universe
        }
    ));
    assert!(error.is_caller_error());
    assert_eq!(h.store.save_count(), saves_before);
    let stored = h.pipeline.load_session(&id).await.expect("load").expect("stored");
    assert!(stored.step(Step::Match).is_none());
}

#[tokio::test]
async fn when_session_id_is_unknown_steps_report_not_found() {
    let h = standard_harness();

    let error = h
        .pipeline
        .run_universe_step("no-such-session", UniverseStepOptions::default())
        .await
        .expect_err("not found");

    assert!(matches!(error, PipelineError::SessionNotFound { .. }));
    assert_eq!(h.store.save_count(), 0);
    assert!(h.pipeline.load_session("no-such-session").await.expect("load").is_none());
}

// =============================================================================
// Pipeline: Universe Step
// =============================================================================

#[tokio::test]
async fn when_exchange_cap_is_set_universe_keeps_provider_order() {
    // Given: Five exchanges and a cap of three fetched two at a time
    let provider = ["A", "B", "C", "D", "E"].into_iter().fold(FakeProvider::default(), |provider, code| {
        provider.with_exchange(code, vec![SecurityRecord::new("X", "Example", code)])
    });
    let config = PipelineConfig {
        max_exchanges: Some(3),
        universe_concurrency: 2,
        ..PipelineConfig::default()
    };
    let h = harness_with_config(
        FakeScraper::with_entries(vec![holding("X", "Example")]),
        provider,
        &config,
    );
    let id = started(&h).await;

    // When: The universe step runs
    let session = h
        .pipeline
        .run_universe_step(&id, UniverseStepOptions::default())
        .await
        .expect("universe");

    // Then: Only the first three exchanges were fetched, in order
    let universe = session.universe.as_ref().expect("universe stored");
    let codes: Vec<_> = universe.symbols.iter().map(|batch| batch.exchange_code.as_str()).collect();
    assert_eq!(codes, vec!["A", "B", "C"]);
    assert_eq!(h.provider.symbol_calls.load(Ordering::SeqCst), 3);
    assert_eq!(context_value(&session, Step::Universe, "exchangeCount"), Some(&Value::from(5)));
    assert_eq!(context_value(&session, Step::Universe, "symbolBatchCount"), Some(&Value::from(3)));
    assert_eq!(context_value(&session, Step::Universe, "symbolCount"), Some(&Value::from(3)));
}

#[tokio::test]
async fn when_provider_fails_universe_blocks_and_keeps_scrape_data() {
    // Given: A provider whose LSE symbol list is rate limited
    let h = harness(
        FakeScraper::with_entries(support::standard_holdings()),
        standard_provider().failing_on("LSE"),
    );
    let id = started(&h).await;

    // When: The universe step runs
    let error = h
        .pipeline
        .run_universe_step(&id, UniverseStepOptions::default())
        .await
        .expect_err("provider fails");

    // Then: The step is blocked and earlier data is intact
    match error {
        PipelineError::CollaboratorFailure { step, source } => {
            assert_eq!(step, Step::Universe);
            assert_eq!(source.kind(), SourceErrorKind::RateLimited);
        }
        other => panic!("unexpected error {other:?}"),
    }
    let stored = h.pipeline.load_session(&id).await.expect("load").expect("stored");
    assert_eq!(stored.status(Step::Universe), StepStatus::Blocked);
    assert_eq!(stored.status(Step::Scrape), StepStatus::Complete);
    assert_eq!(stored.holdings.map(|h| h.entries.len()), Some(3));
    assert!(stored.universe.is_none());
}

// =============================================================================
// Pipeline: Match Step
// =============================================================================

#[tokio::test]
async fn when_match_completes_every_holding_has_one_candidate_in_order() {
    // Given: The standard holdings and US/LSE universe
    let h = standard_harness();

    // When: The pipeline runs through match
    let id = matched(&h).await;
    let session = h.pipeline.load_session(&id).await.expect("load").expect("stored");

    // Then: Coverage holds and the summary is recorded
    let matches = session.matches.as_ref().expect("matches");
    let symbols: Vec<_> = matches.iter().map(|c| c.holding_symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AAPL", "BRK.B", "XYZ.HK"]);
    assert_eq!(context_value(&session, Step::Match, "matchCount"), Some(&Value::from(3)));
    assert_eq!(context_value(&session, Step::Match, "matchedCount"), Some(&Value::from(2)));
    assert_eq!(context_value(&session, Step::Match, "unmatchedCount"), Some(&Value::from(1)));

    for candidate in matches {
        assert!((0.0..=1.0).contains(&candidate.confidence));
    }
}

#[tokio::test]
async fn when_dotted_symbol_is_listed_hyphenated_strategy_two_matches() {
    // Given/When: BRK.B against a US universe listing BRK-B
    let h = standard_harness();
    let id = matched(&h).await;
    let session = h.pipeline.load_session(&id).await.expect("load").expect("stored");

    // Then: The hyphen substitution strategy claims it at full confidence
    let candidate = &session.matches.as_ref().expect("matches")[1];
    assert_eq!(candidate.strategy, Some(MatchStrategy::HyphenatedCode));
    assert_eq!(candidate.confidence, 1.0);
    assert_eq!(candidate.matched_record.as_ref().map(|r| r.code.as_str()), Some("BRK-B"));
    assert!(candidate.reasons[0].contains("hyphen"));
}

#[tokio::test]
async fn when_target_exchange_is_missing_reason_says_data_not_available() {
    let h = standard_harness();
    let id = matched(&h).await;
    let session = h.pipeline.load_session(&id).await.expect("load").expect("stored");

    let candidate = &session.matches.as_ref().expect("matches")[2];
    assert!(candidate.matched_record.is_none());
    assert_eq!(candidate.confidence, 0.0);
    assert_eq!(candidate.reasons, vec!["Exchange HK data not available"]);
}

#[tokio::test]
async fn when_completed_step_is_rerun_it_resets_and_leaves_later_steps() {
    // Given: A session with match complete
    let h = standard_harness();
    let id = matched(&h).await;
    let saves_before = h.store.save_count();

    // When: The universe step is run again with a common-stock filter
    let session = h
        .pipeline
        .run_universe_step(
            &id,
            UniverseStepOptions {
                use_cache: false,
                common_stock_only: true,
            },
        )
        .await
        .expect("redo universe");

    // Then: It went through running again and match is untouched
    let saves = h.store.saves();
    assert_eq!(saves[saves_before].status(Step::Universe), StepStatus::Running);
    assert_eq!(session.status(Step::Universe), StepStatus::Complete);
    assert_eq!(session.status(Step::Match), StepStatus::Complete);
    let universe = session.universe.as_ref().expect("universe");
    assert!(universe.common_stock_only);
    assert!(universe.find_record("US", "SPY").is_none());
}

// =============================================================================
// Pipeline: Overrides
// =============================================================================

#[tokio::test]
async fn when_holding_is_marked_unavailable_stored_candidate_is_resolved() {
    // Given: A matched session
    let h = standard_harness();
    let id = matched(&h).await;
    let steps_before = h.pipeline.load_session(&id).await.expect("load").expect("stored").steps;

    // When: XYZ.HK is marked unavailable twice
    let first = h
        .pipeline
        .confirm_match(&id, "XYZ.HK", Override::Unavailable)
        .await
        .expect("confirm");
    let second = h
        .pipeline
        .confirm_match(&id, "xyz.hk", Override::Unavailable)
        .await
        .expect("confirm again");

    // Then: The stored candidate has no record, full confidence, and steps are untouched
    assert_eq!(first, second);
    let stored = h.pipeline.load_session(&id).await.expect("load").expect("stored");
    let candidate = &stored.matches.as_ref().expect("matches")[2];
    assert!(candidate.matched_record.is_none());
    assert_eq!(candidate.confidence, 1.0);
    assert!(candidate.manually_resolved);
    assert_eq!(candidate.reasons, vec!["Manually marked as not available"]);
    assert_eq!(stored.steps, steps_before);
}

#[tokio::test]
async fn when_override_names_universe_record_the_stored_copy_is_used() {
    let h = standard_harness();
    let id = matched(&h).await;

    let candidate = h
        .pipeline
        .confirm_match(&id, "XYZ.HK", Override::Record(SecurityRecord::new("SHEL", "", "LSE")))
        .await
        .expect("confirm");

    let record = candidate.matched_record.expect("record");
    assert_eq!(record.name, "Shell Plc");
    assert_eq!(record.security_type.as_deref(), Some("Common Stock"));
    assert_eq!(candidate.strategy, Some(MatchStrategy::Manual));
}

#[tokio::test]
async fn when_override_record_is_outside_universe_it_is_rejected() {
    // Given: A matched session
    let h = standard_harness();
    let id = matched(&h).await;
    let before = h.pipeline.load_session(&id).await.expect("load").expect("stored");

    // When: The override names a record the universe never listed
    let error = h
        .pipeline
        .confirm_match(&id, "XYZ.HK", Override::Record(SecurityRecord::new("0700", "Tencent", "HK")))
        .await
        .expect_err("rejected");

    // Then: It is an invalid override and the session is unchanged
    assert!(matches!(error, PipelineError::InvalidOverride { .. }));
    let after = h.pipeline.load_session(&id).await.expect("load").expect("stored");
    assert_eq!(after, before);

    let unknown = h
        .pipeline
        .confirm_match(&id, "MSFT", Override::Unavailable)
        .await
        .expect_err("unknown holding");
    assert!(matches!(unknown, PipelineError::InvalidOverride { .. }));
}

#[tokio::test]
async fn when_no_matches_exist_override_reports_precondition() {
    let h = standard_harness();
    let id = started(&h).await;

    let error = h
        .pipeline
        .confirm_match(&id, "AAPL", Override::Unavailable)
        .await
        .expect_err("no matches yet");

    assert!(matches!(
        error,
        PipelineError::PreconditionNotMet {
            required: Step::Match,
            ..
        }
    ));
}

// =============================================================================
// Pipeline: Validate and Review
// =============================================================================

#[tokio::test]
async fn when_validation_passes_low_confidence_matches_are_listed() {
    // Given: A fuzzy match just under a strict confidence floor
    let h = harness(
        FakeScraper::with_entries(vec![
            holding("AAPL", "Apple Inc"),
            holding("BRKX", "Berkshire Hathway"),
        ]),
        standard_provider(),
    );
    let id = matched(&h).await;

    // When: Validation runs with a 0.99 floor
    let session = h
        .pipeline
        .run_validate_step(&id, ValidateStepOptions { min_confidence: 0.99 })
        .await
        .expect("validate");

    // Then: Only the fuzzy match is flagged
    assert_eq!(session.status(Step::Validate), StepStatus::Complete);
    assert_eq!(context_value(&session, Step::Validate, "matched"), Some(&Value::from(2)));
    assert_eq!(context_value(&session, Step::Validate, "lowConfidence"), Some(&Value::from(1)));
    assert_eq!(
        context_value(&session, Step::Validate, "lowConfidenceSymbols"),
        Some(&serde_json::json!(["BRKX"]))
    );
}

#[tokio::test]
async fn when_stored_matches_lose_coverage_validation_blocks() {
    // Given: A matched session whose stored matches were truncated
    let h = standard_harness();
    let id = matched(&h).await;
    let mut tampered = h.pipeline.load_session(&id).await.expect("load").expect("stored");
    tampered.matches.as_mut().expect("matches").pop();
    h.store.save(&tampered).await.expect("save");

    // When: Validation runs
    let error = h
        .pipeline
        .run_validate_step(&id, ValidateStepOptions::default())
        .await
        .expect_err("coverage violated");

    // Then: The step is blocked with the violation
    match &error {
        PipelineError::Validation { step, message } => {
            assert_eq!(*step, Step::Validate);
            assert!(message.contains("2 candidates for 3 holdings"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    let stored = h.pipeline.load_session(&id).await.expect("load").expect("stored");
    assert_eq!(stored.status(Step::Validate), StepStatus::Blocked);
}

#[tokio::test]
async fn when_match_points_outside_universe_validation_blocks() {
    let h = standard_harness();
    let id = matched(&h).await;
    let mut tampered = h.pipeline.load_session(&id).await.expect("load").expect("stored");
    if let Some(record) = tampered.matches.as_mut().and_then(|m| m[0].matched_record.as_mut()) {
        record.code = String::from("ZZZZ");
    }
    h.store.save(&tampered).await.expect("save");

    let error = h
        .pipeline
        .run_validate_step(&id, ValidateStepOptions::default())
        .await
        .expect_err("referential violation");

    assert!(error.to_string().contains("not in the universe"));
}

#[tokio::test]
async fn when_review_completes_session_is_terminal() {
    // Given: A matched session
    let h = standard_harness();
    let id = matched(&h).await;

    // When: Review is attempted before and after validation
    let early = h.pipeline.complete_review(&id).await.expect_err("not validated");
    h.pipeline
        .run_validate_step(&id, ValidateStepOptions::default())
        .await
        .expect("validate");
    let session = h.pipeline.complete_review(&id).await.expect("review");

    // Then: The early attempt names validate; every step ends complete
    assert!(matches!(
        early,
        PipelineError::PreconditionNotMet {
            step: Step::Review,
            required: Step::Validate
        }
    ));
    for step in Step::ALL {
        assert_eq!(session.status(step), StepStatus::Complete, "{step}");
    }
    assert_eq!(context_value(&session, Step::Review, "matchCount"), Some(&Value::from(3)));
    assert!(context_value(&session, Step::Review, "reviewedAt").and_then(Value::as_str).is_some());
    assert_eq!(h.scraper.calls.load(Ordering::SeqCst), 1);
}
