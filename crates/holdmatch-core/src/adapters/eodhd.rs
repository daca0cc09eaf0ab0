use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{status_error, transport_error};
use crate::cache::{CacheDescriptor, CacheScope, CacheStore, CachedPayload};
use crate::data_source::{Provider, ProviderOptions, SourceError, SourceFuture};
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::ThrottlingQueue;
use crate::{ExchangeSummary, SecurityRecord};

pub const EODHD_SOURCE_ID: &str = "eodhd";
pub const EODHD_BASE_URL: &str = "https://eodhd.com/api";

const DEFAULT_EXCHANGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_SYMBOL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// EODHD exchange directory and per-exchange symbol lists.
#[derive(Clone)]
pub struct EodhdProvider {
    http_client: Arc<dyn HttpClient>,
    cache: Option<Arc<dyn CacheStore>>,
    api_token: String,
    base_url: String,
    exchange_ttl: Option<Duration>,
    symbol_ttl: Option<Duration>,
    throttling: ThrottlingQueue,
}

impl EodhdProvider {
    pub fn new(http_client: Arc<dyn HttpClient>, api_token: impl Into<String>) -> Self {
        Self {
            http_client,
            cache: None,
            api_token: api_token.into(),
            base_url: String::from(EODHD_BASE_URL),
            exchange_ttl: Some(DEFAULT_EXCHANGE_TTL),
            symbol_ttl: Some(DEFAULT_SYMBOL_TTL),
            throttling: ThrottlingQueue::from_policy(&ProviderPolicy::eodhd_default()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// `None` stores entries without expiry.
    pub fn with_ttls(mut self, exchange_ttl: Option<Duration>, symbol_ttl: Option<Duration>) -> Self {
        self.exchange_ttl = exchange_ttl;
        self.symbol_ttl = symbol_ttl;
        self
    }

    pub fn with_policy(mut self, policy: &ProviderPolicy) -> Self {
        self.throttling = ThrottlingQueue::from_policy(policy);
        self
    }

    pub fn exchanges_descriptor(&self) -> CacheDescriptor {
        CacheDescriptor::new(CacheScope::ExchangeList, EODHD_SOURCE_ID, "all")
            .with_ttl(self.exchange_ttl)
    }

    pub fn symbols_descriptor(&self, exchange_code: &str, common_stock_only: bool) -> CacheDescriptor {
        let code = normalize_code(exchange_code);
        let key = if common_stock_only {
            format!("{code}:common")
        } else {
            code
        };
        CacheDescriptor::new(CacheScope::ExchangeSymbols, EODHD_SOURCE_ID, key)
            .with_ttl(self.symbol_ttl)
    }

    fn request(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}/{path}", self.base_url))
            .with_query("api_token", &self.api_token)
            .with_query("fmt", "json")
            .with_timeout_ms(30_000)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, SourceError> {
        let _permit = self.throttling.acquire().await;
        let url = request.url.clone();
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| transport_error(EODHD_SOURCE_ID, &error))?;

        if !response.is_success() {
            tracing::debug!(%url, status = response.status, "eodhd request failed");
            return Err(status_error(EODHD_SOURCE_ID, &response));
        }

        serde_json::from_str(&response.body).map_err(|error| {
            SourceError::invalid_response(format!("failed to parse eodhd response from {url}: {error}"))
        })
    }

    async fn cached<T: DeserializeOwned>(
        &self,
        descriptor: &CacheDescriptor,
        options: ProviderOptions,
    ) -> Option<CachedPayload<T>> {
        if !options.use_cache {
            return None;
        }
        self.cache.as_ref()?.read_or_miss(descriptor).await
    }

    async fn persist<T: serde::Serialize>(&self, descriptor: CacheDescriptor, payload: T) -> CachedPayload<T> {
        match &self.cache {
            Some(cache) => cache.write_or_wrap(&descriptor, payload).await,
            None => CachedPayload::uncached(descriptor, payload),
        }
    }
}

impl Provider for EodhdProvider {
    fn id(&self) -> &str {
        EODHD_SOURCE_ID
    }

    fn list_exchanges<'a>(
        &'a self,
        options: ProviderOptions,
    ) -> SourceFuture<'a, CachedPayload<Vec<ExchangeSummary>>> {
        Box::pin(async move {
            let descriptor = self.exchanges_descriptor();
            if let Some(cached) = self.cached(&descriptor, options).await {
                return Ok(cached);
            }

            let raw: Vec<RawExchange> = self.fetch_json(self.request("exchanges-list")).await?;
            let exchanges: Vec<ExchangeSummary> = raw
                .into_iter()
                .filter_map(RawExchange::normalize)
                .collect();
            tracing::debug!(count = exchanges.len(), "fetched eodhd exchange list");

            Ok(self.persist(descriptor, exchanges).await)
        })
    }

    fn list_symbols<'a>(
        &'a self,
        exchange_code: &'a str,
        options: ProviderOptions,
    ) -> SourceFuture<'a, CachedPayload<Vec<SecurityRecord>>> {
        Box::pin(async move {
            let code = normalize_code(exchange_code);
            if code.is_empty() {
                return Err(SourceError::invalid_request("exchange code must not be empty"));
            }

            let descriptor = self.symbols_descriptor(&code, options.common_stock_only);
            if let Some(cached) = self.cached(&descriptor, options).await {
                return Ok(cached);
            }

            let mut request = self.request(&format!(
                "exchange-symbol-list/{}",
                urlencoding::encode(&code)
            ));
            if options.common_stock_only {
                request = request.with_query("type", "common_stock");
            }

            let raw: Vec<RawSymbol> = self.fetch_json(request).await?;
            let records: Vec<SecurityRecord> = raw
                .into_iter()
                .filter_map(|record| record.normalize(&code))
                .collect();
            tracing::debug!(exchange = %code, count = records.len(), "fetched eodhd symbol list");

            Ok(self.persist(descriptor, records).await)
        })
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawExchange {
    code: Option<String>,
    name: Option<String>,
    #[serde(rename = "OperatingMIC")]
    operating_mic: Option<String>,
    country: Option<String>,
    currency: Option<String>,
}

impl RawExchange {
    fn normalize(self) -> Option<ExchangeSummary> {
        let code = normalize_code(self.code.as_deref()?);
        if code.is_empty() {
            return None;
        }
        Some(ExchangeSummary {
            name: self.name.unwrap_or_else(|| code.clone()),
            code,
            country: self.country.unwrap_or_default(),
            currency: self.currency.unwrap_or_default(),
            operating_mic: self.operating_mic.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSymbol {
    code: Option<String>,
    name: Option<String>,
    country: Option<String>,
    currency: Option<String>,
    isin: Option<String>,
    #[serde(rename = "Type")]
    security_type: Option<String>,
}

impl RawSymbol {
    /// Records are keyed by the requested exchange code; the upstream
    /// `Exchange` field names the venue (NYSE, NASDAQ) rather than the list.
    fn normalize(self, exchange_code: &str) -> Option<SecurityRecord> {
        let code = self.code?.trim().to_owned();
        if code.is_empty() {
            return None;
        }
        Some(SecurityRecord {
            code,
            name: self.name.map(|name| name.trim().to_owned()).unwrap_or_default(),
            exchange_code: exchange_code.to_owned(),
            country: self.country.filter(|value| !value.is_empty()),
            currency: self.currency.filter(|value| !value.is_empty()),
            isin: self.isin.filter(|value| !value.is_empty()),
            security_type: self.security_type.filter(|value| !value.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::FixtureHttpClient;

    #[test]
    fn symbol_descriptor_distinguishes_common_stock_filter() {
        let provider = EodhdProvider::new(Arc::new(FixtureHttpClient::new()), "demo");

        let all = provider.symbols_descriptor(" us ", false);
        let common = provider.symbols_descriptor("US", true);

        assert_eq!(all.key, "US");
        assert_eq!(common.key, "US:common");
        assert!(all.expires_at.is_some());
        assert_ne!(all, common);
    }

    #[test]
    fn raw_symbol_normalizes_nulls_and_exchange() {
        let raw: RawSymbol = serde_json::from_str(
            r#"{"Code":"BRK-B","Name":"Berkshire Hathaway Inc","Country":"USA","Exchange":"NYSE","Currency":"USD","Type":"Common Stock","Isin":null}"#,
        )
        .expect("raw symbol");

        let record = raw.normalize("US").expect("record");

        assert_eq!(record.exchange_code, "US");
        assert_eq!(record.security_type.as_deref(), Some("Common Stock"));
        assert_eq!(record.isin, None);
    }

    #[tokio::test]
    async fn invalid_json_is_an_invalid_response() {
        let client = FixtureHttpClient::new()
            .with_fixture("https://eodhd.com/api/exchanges-list?fmt=json", "<html>");
        let provider = EodhdProvider::new(Arc::new(client), "demo");

        let error = provider
            .list_exchanges(ProviderOptions::default())
            .await
            .expect_err("must fail");

        assert_eq!(error.code(), "source.invalid_response");
    }
}
