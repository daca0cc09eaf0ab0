//! CLI argument definitions for holdmatch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `start` | Create a session and scrape holdings |
//! | `universe` | Fetch exchanges and their symbol lists |
//! | `match` | Match holdings against the universe |
//! | `validate` | Check coverage and flag low-confidence matches |
//! | `review` | Mark the session reviewed |
//! | `confirm` | Override one holding's match |
//! | `show` | Print a stored session |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--home` | `$HOLDMATCH_HOME` or `~/.holdmatch` | Cache and session root |
//! | `--no-cache` | `false` | Bypass cache reads |
//! | `--fixtures` | none | Serve HTTP from a fixture directory |
//! | `--log-level` | `info` | Log filter when `RUST_LOG` is unset |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! holdmatch start --min-percent 0.5
//! holdmatch universe <session-id> --common-stock-only --max-exchanges 10
//! holdmatch match <session-id>
//! holdmatch confirm <session-id> BRK.B --exchange US --code BRK-B
//! holdmatch show <session-id> --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Reconcile portfolio holdings with exchange-listed securities.
#[derive(Debug, Parser)]
#[command(
    name = "holdmatch",
    author,
    version,
    about = "Reconcile portfolio holdings with exchange-listed securities",
    long_about = "holdmatch scrapes a portfolio, fetches an exchange universe, and matches each \
holding to a listed security. Every step is persisted to a session file so a run can be \
inspected, corrected, and resumed.\n\
\n\
Use 'holdmatch <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Root directory for cache and session files.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Ignore cached data and fetch live. Fresh results are still written.
    #[arg(long, global = true, default_value_t = false)]
    pub no_cache: bool,

    /// Serve HTTP responses from `<dir>/fixtures.json` instead of the network.
    #[arg(long, global = true)]
    pub fixtures: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. `info`, `holdmatch_core=debug`).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a session and scrape portfolio holdings.
    Start(StartArgs),

    /// Fetch the exchange list and per-exchange symbols.
    Universe(UniverseArgs),

    /// Match holdings against the fetched universe.
    Match(MatchArgs),

    /// Check match coverage and report low-confidence matches.
    Validate(ValidateArgs),

    /// Mark a validated session as reviewed.
    Review(SessionArgs),

    /// Confirm a holding's security or mark it unavailable.
    ///
    /// # Examples
    ///
    ///   holdmatch confirm <session-id> BRK.B --exchange US --code BRK-B
    ///   holdmatch confirm <session-id> XYZ --unavailable
    Confirm(ConfirmArgs),

    /// Print a stored session.
    Show(SessionArgs),
}

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Minimum portfolio weight in percent.
    #[arg(long)]
    pub min_percent: Option<f64>,

    /// Stop scraping after this many rows; 0 means all.
    #[arg(long)]
    pub max_entries: Option<usize>,

    /// Cache key for the scrape result, overriding the derived one.
    #[arg(long)]
    pub source_token: Option<String>,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    pub session_id: String,
}

#[derive(Debug, Args)]
pub struct UniverseArgs {
    pub session_id: String,

    /// Only fetch common stock listings.
    #[arg(long, default_value_t = false)]
    pub common_stock_only: bool,

    /// Cap on exchanges fetched; 0 means all.
    #[arg(long)]
    pub max_exchanges: Option<usize>,
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    pub session_id: String,

    /// Restrict matching to common stock. Defaults to the universe's filter.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub common_stock_only: Option<bool>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    pub session_id: String,

    /// Matches below this confidence are reported for review.
    #[arg(long, default_value_t = 0.9)]
    pub min_confidence: f64,
}

#[derive(Debug, Args)]
pub struct ConfirmArgs {
    pub session_id: String,

    /// Holding symbol as scraped.
    pub holding_symbol: String,

    /// Exchange code of the confirmed security.
    #[arg(long, requires = "code", required_unless_present = "unavailable")]
    pub exchange: Option<String>,

    /// Security code on that exchange.
    #[arg(long, requires = "exchange")]
    pub code: Option<String>,

    /// Mark the holding as not available on any fetched exchange.
    #[arg(long, default_value_t = false, conflicts_with_all = ["exchange", "code"])]
    pub unavailable: bool,
}
