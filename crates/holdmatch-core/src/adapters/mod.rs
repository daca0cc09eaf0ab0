//! Concrete collaborators over HTTP.
//!
//! | Adapter | Trait | Upstream |
//! |---------|-------|----------|
//! | [`PortfolioScraper`] | [`Scraper`](crate::data_source::Scraper) | paginated HTML holdings table |
//! | [`EodhdProvider`] | [`Provider`](crate::data_source::Provider) | EODHD exchange and symbol lists |

mod eodhd;
mod portfolio;

pub use eodhd::{EodhdProvider, EODHD_BASE_URL, EODHD_SOURCE_ID};
pub use portfolio::{PortfolioScraper, PORTFOLIO_BASE_URL, PORTFOLIO_SOURCE_ID};

use crate::data_source::SourceError;
use crate::http_client::{HttpError, HttpResponse};

fn transport_error(source: &str, error: &HttpError) -> SourceError {
    SourceError::unavailable(format!("{source} transport error: {}", error.message()))
}

/// Maps a non-2xx response to a source error.
fn status_error(source: &str, response: &HttpResponse) -> SourceError {
    if response.status == 429 {
        SourceError::rate_limited(format!("{source} rate limit exceeded (status 429)"))
    } else {
        SourceError::unavailable(format!("{source} returned status {}", response.status))
    }
}
