//! # Holdmatch Core
//!
//! Reconciles a scraped list of portfolio holdings against the securities
//! listed on exchanges, producing one reviewable match candidate per holding.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Portfolio scraper and EODHD provider |
//! | [`cache`] | Descriptor-keyed cache stores with TTL |
//! | [`config`] | Environment-driven pipeline configuration |
//! | [`data_source`] | Scraper and provider contracts |
//! | [`domain`] | Holdings, securities, candidates, timestamps |
//! | [`error`] | Validation and pipeline errors |
//! | [`http_client`] | HTTP transport abstraction with reqwest and fixture clients |
//! | [`matching`] | Strategy cascade and universe-wide coordinator |
//! | [`pipeline`] | Step state machine over sessions |
//! | [`provider_policy`] | Per-source concurrency and quota |
//! | [`retry`] | Backoff and retry configuration |
//! | [`session`] | Session model, stores, and per-session locks |
//! | [`throttling`] | Rate limiting and concurrency slots |
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────────┐
//! │ Scraper      │──▶│ holdings     │──▶│                    │
//! └──────────────┘   └──────────────┘   │ MatchingCoordinator│──▶ MatchCandidate[]
//! ┌──────────────┐   ┌──────────────┐   │                    │
//! │ Provider     │──▶│ universe     │──▶│                    │
//! └──────────────┘   └──────────────┘   └────────────────────┘
//!          │                  │
//!          └──── CacheStore ──┘        Pipeline persists every step
//!                                      through a SessionStore
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use holdmatch_core::{
//!     CachePreferences, EodhdProvider, MemorySessionStore, Pipeline, PortfolioScraper,
//!     ReqwestHttpClient, ScrapeFilter,
//! };
//!
//! let http = Arc::new(ReqwestHttpClient::new());
//! let pipeline = Pipeline::new(
//!     Arc::new(PortfolioScraper::new(http.clone())),
//!     Arc::new(EodhdProvider::new(http, "demo")),
//!     Arc::new(MemorySessionStore::new()),
//! );
//! let session = pipeline
//!     .start_session(CachePreferences::default(), ScrapeFilter::default())
//!     .await?;
//! ```
//!
//! ## Security
//!
//! - API tokens are read from environment variables and never logged
//! - Session ids are checked before they become file names

pub mod adapters;
pub mod cache;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod matching;
pub mod pipeline;
pub mod provider_policy;
pub mod retry;
pub mod session;
pub mod throttling;

// Adapter implementations
pub use adapters::{EodhdProvider, PortfolioScraper};

// Caching
pub use cache::{
    CacheDescriptor, CacheError, CacheScope, CacheStore, CachedPayload, FileCacheStore,
    MemoryCacheStore,
};

// Configuration
pub use config::PipelineConfig;

// Collaborator contracts
pub use data_source::{
    Origin, Provider, ProviderOptions, ScrapeOptions, ScrapeResult, Scraper, SourceError,
    SourceErrorKind,
};

// Domain models
pub use domain::{
    ExchangeSummary, HoldingEntry, HoldingSymbol, MatchCandidate, MatchStrategy, SecurityKey,
    SecurityRecord, UtcDateTime,
};

// Error types
pub use error::{PipelineError, ValidationError};

// HTTP client types
pub use http_client::{
    FixtureHttpClient, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
};

// Matching
pub use matching::{MatchOptions, MatchOutcome, MatchingCoordinator, MatchingEngine};

// Pipeline
pub use pipeline::{
    CachePreferences, MatchStepOptions, Override, Pipeline, ScrapeFilter, UniverseStepOptions,
    ValidateStepOptions,
};

// Provider policies
pub use provider_policy::ProviderPolicy;

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Sessions
pub use session::{
    FileSessionStore, MemorySessionStore, Session, SessionLocks, SessionStore, SessionStoreError,
    Step, StepState, StepStatus, Universe,
};

// Throttling
pub use throttling::ThrottlingQueue;
