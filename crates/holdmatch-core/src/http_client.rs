use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryConfig;

/// Query parameters never included in fixture keys or logs.
const SECRET_PARAMS: [&str; 1] = ["api_token"];

/// HTTP request envelope used by adapter transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Deterministic, secret-free key: URL plus query sorted by name.
    pub fn fixture_key(&self) -> String {
        let mut pairs: Vec<_> = self
            .query
            .iter()
            .filter(|(name, _)| !SECRET_PARAMS.contains(&name.as_str()))
            .collect();
        if pairs.is_empty() {
            return self.url.clone();
        }
        pairs.sort();
        format!("{}?{}", self.url, encode_pairs(pairs.into_iter()))
    }
}

fn encode_pairs<'a>(pairs: impl Iterator<Item = &'a (String, String)>) -> String {
    pairs
        .map(|(name, value)| {
            format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// HTTP response envelope returned by an adapter transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: String::new(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    retryable: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Adapter transport contract.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production HTTP client using reqwest, with retry and backoff.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
    retry: RetryConfig,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("holdmatch/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self
            .client
            .get(&request.url)
            .query(&request.query)
            .timeout(Duration::from_millis(request.timeout_ms));

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::new(format!("request timeout: {e}"))
            } else if e.is_connect() {
                HttpError::new(format!("connection failed: {e}"))
            } else {
                HttpError::non_retryable(format!("request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::new(format!("failed to read response body: {e}")))?;

        Ok(HttpResponse { status, body })
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                let outcome = self.send_once(&request).await;
                let retry = attempt < self.retry.max_retries
                    && match &outcome {
                        Ok(response) => self.retry.should_retry_status(response.status),
                        Err(error) => self.retry.enabled && error.retryable(),
                    };

                if !retry {
                    return outcome;
                }

                let delay = self.retry.backoff.delay(attempt);
                tracing::debug!(
                    url = %request.url,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying http request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        })
    }
}

/// Offline transport serving canned bodies keyed by [`HttpRequest::fixture_key`].
///
/// Lookup order: exact fixture key, bare URL, default body. Anything else
/// answers 404.
#[derive(Debug, Clone, Default)]
pub struct FixtureHttpClient {
    fixtures: HashMap<String, String>,
    default_body: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureManifest {
    fixtures: HashMap<String, String>,
    #[serde(default)]
    default_fixture: Option<String>,
}

impl FixtureHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixture(mut self, key: impl Into<String>, body: impl Into<String>) -> Self {
        self.fixtures.insert(key.into(), body.into());
        self
    }

    pub fn with_default(mut self, body: impl Into<String>) -> Self {
        self.default_body = Some(body.into());
        self
    }

    /// Loads `<dir>/fixtures.json`, a map of fixture key → file path relative
    /// to `dir`, with an optional `defaultFixture`.
    pub async fn from_dir(dir: &Path) -> Result<Self, std::io::Error> {
        let manifest_raw = tokio::fs::read_to_string(dir.join("fixtures.json")).await?;
        let manifest: FixtureManifest = serde_json::from_str(&manifest_raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut client = Self::new();
        for (key, file) in manifest.fixtures {
            let body = tokio::fs::read_to_string(dir.join(file)).await?;
            client.fixtures.insert(key, body);
        }
        if let Some(file) = manifest.default_fixture {
            client.default_body = Some(tokio::fs::read_to_string(dir.join(file)).await?);
        }

        Ok(client)
    }
}

impl HttpClient for FixtureHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let body = self
                .fixtures
                .get(&request.fixture_key())
                .or_else(|| self.fixtures.get(&request.url))
                .or(self.default_body.as_ref());

            Ok(body
                .map(|body| HttpResponse::ok(body.clone()))
                .unwrap_or_else(HttpResponse::not_found))
        })
    }
}
