use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::{status_error, transport_error};
use crate::cache::{CacheDescriptor, CacheScope, CacheStore};
use crate::data_source::{
    deduplicate_entries, Origin, ScrapeOptions, ScrapeResult, Scraper, SourceError, SourceFuture,
};
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::ThrottlingQueue;
use crate::HoldingEntry;

pub const PORTFOLIO_SOURCE_ID: &str = "portfolio";
pub const PORTFOLIO_BASE_URL: &str = "https://www.dataroma.com/m/g/portfolio.php";

/// Upper bound on followed pagination links.
const MAX_PAGES: u32 = 100;

// Patterns are constants; compilation cannot fail at runtime.
static TBODY: LazyLock<Regex> = LazyLock::new(|| compile(r"(?is)<tbody[^>]*>(.*?)</tbody>"));
static ROW: LazyLock<Regex> = LazyLock::new(|| compile(r"(?is)<tr[^>]*>(.*?)</tr>"));
static SYMBOL_CELL: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?is)<td\s+class="sym"[^>]*>(.*?)</td>"#));
static STOCK_CELL: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?is)<td\s+class="stock"[^>]*>(.*?)</td>"#));
static TAG: LazyLock<Regex> = LazyLock::new(|| compile(r"<[^>]+>"));
static PAGES: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?is)<div\s+id="pages"[^>]*>(.*?)</div>"#));
static PAGE_LINK: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)[?&;]L=(\d+)"));
static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| compile(r"&#(?:[xX]([0-9a-fA-F]+)|(\d+));"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

/// Scrapes the consolidated portfolio table, following its pagination.
#[derive(Clone)]
pub struct PortfolioScraper {
    http_client: Arc<dyn HttpClient>,
    cache: Option<Arc<dyn CacheStore>>,
    base_url: String,
    throttling: ThrottlingQueue,
}

impl PortfolioScraper {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            cache: None,
            base_url: String::from(PORTFOLIO_BASE_URL),
            throttling: ThrottlingQueue::from_policy(&ProviderPolicy::portfolio_default()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_policy(mut self, policy: &ProviderPolicy) -> Self {
        self.throttling = ThrottlingQueue::from_policy(policy);
        self
    }

    pub fn descriptor(options: &ScrapeOptions) -> CacheDescriptor {
        let key = options.source_token.clone().unwrap_or_else(|| {
            let min_percent = options.min_percent.unwrap_or(0.0);
            match options.entry_cap() {
                Some(cap) => format!("grand-portfolio:{min_percent}:max-{cap}"),
                None => format!("grand-portfolio:{min_percent}"),
            }
        });
        CacheDescriptor::new(CacheScope::Scrape, PORTFOLIO_SOURCE_ID, key)
    }

    fn page_request(&self, options: &ScrapeOptions, page: u32) -> HttpRequest {
        let mut request = HttpRequest::get(&self.base_url);
        if let Some(min) = options.min_percent.filter(|min| *min > 0.0) {
            request = request.with_query("pct", min);
        }
        if page > 1 {
            request = request.with_query("L", page);
        }
        request
    }

    async fn fetch_page(&self, options: &ScrapeOptions, page: u32) -> Result<ParsedPage, SourceError> {
        let _permit = self.throttling.acquire().await;
        let response = self
            .http_client
            .execute(self.page_request(options, page))
            .await
            .map_err(|error| transport_error(PORTFOLIO_SOURCE_ID, &error))?;

        if !response.is_success() {
            return Err(status_error(PORTFOLIO_SOURCE_ID, &response));
        }

        parse_page(&response.body)
    }

    async fn fetch_all_pages(&self, options: &ScrapeOptions) -> Result<Vec<HoldingEntry>, SourceError> {
        let cap = options.entry_cap().unwrap_or(usize::MAX);
        let first = self.fetch_page(options, 1).await?;
        let total_pages = first.total_pages.min(MAX_PAGES);
        let mut entries = first.entries;

        for page in 2..=total_pages {
            if entries.len() >= cap {
                tracing::debug!(page, total_pages, cap, "entry cap reached, skipping remaining pages");
                break;
            }
            tracing::debug!(page, total_pages, "fetching portfolio page");
            entries.extend(self.fetch_page(options, page).await?.entries);
        }

        entries.truncate(cap);
        Ok(entries)
    }
}

impl Scraper for PortfolioScraper {
    fn fetch<'a>(&'a self, options: &'a ScrapeOptions) -> SourceFuture<'a, ScrapeResult> {
        Box::pin(async move {
            let descriptor = Self::descriptor(options);

            if options.use_cache {
                if let Some(cache) = &self.cache {
                    if let Some(cached) = cache.read_or_miss::<Vec<HoldingEntry>>(&descriptor).await {
                        let cached = cached.map(deduplicate_entries);
                        return Ok(ScrapeResult {
                            entries: cached.payload.clone(),
                            origin: Origin::Cache,
                            cached: Some(cached),
                        });
                    }
                }
            }

            let entries = deduplicate_entries(self.fetch_all_pages(options).await?);
            tracing::info!(entries = entries.len(), "scraped portfolio holdings");

            let cached = match (&self.cache, entries.is_empty()) {
                (Some(cache), false) => Some(cache.write_or_wrap(&descriptor, entries.clone()).await),
                _ => None,
            };

            Ok(ScrapeResult {
                entries,
                origin: Origin::Live,
                cached,
            })
        })
    }
}

#[derive(Debug)]
struct ParsedPage {
    entries: Vec<HoldingEntry>,
    total_pages: u32,
}

fn parse_page(html: &str) -> Result<ParsedPage, SourceError> {
    let tbody = TBODY
        .captures(html)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| SourceError::invalid_response("portfolio page has no table body"))?;

    let mut entries = Vec::new();
    for row in ROW.captures_iter(tbody.as_str()) {
        let Some(row) = row.get(1) else { continue };
        let (Some(symbol), Some(stock)) = (
            cell_text(&SYMBOL_CELL, row.as_str()),
            cell_text(&STOCK_CELL, row.as_str()),
        ) else {
            continue;
        };

        match HoldingEntry::new(&symbol, &stock) {
            Ok(entry) => entries.push(entry),
            Err(error) => tracing::debug!(%symbol, %error, "skipping unparsable holding row"),
        }
    }

    Ok(ParsedPage {
        entries,
        total_pages: total_pages(html),
    })
}

fn cell_text(cell: &Regex, row: &str) -> Option<String> {
    let inner = cell.captures(row)?.get(1)?.as_str();
    let text = decode_entities(&TAG.replace_all(inner, " "));
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

fn total_pages(html: &str) -> u32 {
    let Some(footer) = PAGES.captures(html).and_then(|captures| captures.get(1)) else {
        return 1;
    };

    PAGE_LINK
        .captures_iter(footer.as_str())
        .filter_map(|captures| captures.get(1)?.as_str().parse::<u32>().ok())
        .fold(1, u32::max)
}

fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");

    let numeric = NUMERIC_ENTITY.replace_all(&named, |captures: &regex::Captures<'_>| {
        let code = match (captures.get(1), captures.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse().ok(),
            (None, None) => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    // `&amp;` last so `&amp;lt;` decodes to the literal `&lt;`.
    numeric.replace("&amp;", "&")
}
