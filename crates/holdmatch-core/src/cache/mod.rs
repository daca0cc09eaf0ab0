//! Descriptor-keyed caching with lazy TTL expiry.
//!
//! Every external-data step reads and writes through a [`CacheStore`]. Entries
//! are keyed by the `(scope, source_id, key)` triple of a [`CacheDescriptor`];
//! the descriptor's optional `expires_at` travels with the entry and is checked
//! on every read. Expired entries are evicted by the read that finds them.
//!
//! | Store | Backing |
//! |-------|---------|
//! | [`MemoryCacheStore`] | `tokio::sync::RwLock<HashMap>` shared behind an `Arc` |
//! | [`FileCacheStore`] | one JSON file per descriptor under a base directory |

mod file;
mod memory;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::UtcDateTime;

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;

/// Kind of data a cache row holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheScope {
    Scrape,
    ExchangeList,
    ExchangeSymbols,
    Derived,
}

impl CacheScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::ExchangeList => "exchange-list",
            Self::ExchangeSymbols => "exchange-symbols",
            Self::Derived => "derived",
        }
    }
}

impl Display for CacheScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite cache key plus optional expiry.
///
/// Equality and hashing only consider `(scope, source_id, key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDescriptor {
    pub scope: CacheScope,
    pub source_id: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<UtcDateTime>,
}

impl CacheDescriptor {
    pub fn new(scope: CacheScope, source_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            scope,
            source_id: source_id.into(),
            key: key.into(),
            expires_at: None,
        }
    }

    /// Expires `ttl` from now. `None` leaves the entry without expiry.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.expires_at = ttl.map(|ttl| UtcDateTime::now().saturating_add(ttl));
        self
    }

    pub fn with_expires_at(mut self, expires_at: UtcDateTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_at
            .map(|expires_at| expires_at.is_before(now))
            .unwrap_or(false)
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            scope: self.scope,
            source_id: self.source_id.clone(),
            key: self.key.clone(),
        }
    }
}

impl PartialEq for CacheDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.scope == other.scope && self.source_id == other.source_id && self.key == other.key
    }
}

impl Eq for CacheDescriptor {}

impl Hash for CacheDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scope.hash(state);
        self.source_id.hash(state);
        self.key.hash(state);
    }
}

/// The `(scope, source_id, key)` identity of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub scope: CacheScope,
    pub source_id: String,
    pub key: String,
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.source_id, self.scope, self.key)
    }
}

/// A cached value with the descriptor it was written under.
///
/// `created_at` is stamped by the store on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPayload<T> {
    pub descriptor: CacheDescriptor,
    pub payload: T,
    pub created_at: UtcDateTime,
}

impl<T> CachedPayload<T> {
    /// Wraps a payload that never reached a store (cache disabled or write failed).
    pub fn uncached(descriptor: CacheDescriptor, payload: T) -> Self {
        Self {
            descriptor,
            payload,
            created_at: UtcDateTime::now(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CachedPayload<U> {
        CachedPayload {
            descriptor: self.descriptor,
            payload: f(self.payload),
            created_at: self.created_at,
        }
    }
}

/// Cache backend failure.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Cache backend contract.
///
/// Implementations must be safe for concurrent use; concurrent writes to the
/// same descriptor resolve last-writer-wins. Payloads cross the trait as JSON
/// so the trait stays object safe; use the typed [`read`](#method.read) and
/// [`write`](#method.write) helpers on `dyn CacheStore` at call sites.
pub trait CacheStore: Send + Sync {
    /// Returns the entry, or `None` when absent or expired. An expired entry is
    /// evicted as a side effect.
    fn read_entry<'a>(
        &'a self,
        descriptor: &'a CacheDescriptor,
    ) -> CacheFuture<'a, Option<CachedPayload<Value>>>;

    /// Overwrites the entry, stamping `created_at` with the current time.
    fn write_entry<'a>(
        &'a self,
        descriptor: &'a CacheDescriptor,
        payload: Value,
    ) -> CacheFuture<'a, CachedPayload<Value>>;

    /// Removes the entry. Clearing a missing entry is not an error.
    fn clear<'a>(&'a self, descriptor: &'a CacheDescriptor) -> CacheFuture<'a, ()>;
}

impl dyn CacheStore {
    pub async fn read<T: DeserializeOwned>(
        &self,
        descriptor: &CacheDescriptor,
    ) -> Result<Option<CachedPayload<T>>, CacheError> {
        let Some(entry) = self.read_entry(descriptor).await? else {
            return Ok(None);
        };

        let payload = serde_json::from_value(entry.payload)?;
        Ok(Some(CachedPayload {
            descriptor: entry.descriptor,
            payload,
            created_at: entry.created_at,
        }))
    }

    pub async fn write<T: Serialize>(
        &self,
        descriptor: &CacheDescriptor,
        payload: T,
    ) -> Result<CachedPayload<T>, CacheError> {
        let value = serde_json::to_value(&payload)?;
        let entry = self.write_entry(descriptor, value).await?;
        Ok(CachedPayload {
            descriptor: entry.descriptor,
            payload,
            created_at: entry.created_at,
        })
    }

    /// Like [`read`](#method.read), but a failing store counts as a miss.
    pub async fn read_or_miss<T: DeserializeOwned>(
        &self,
        descriptor: &CacheDescriptor,
    ) -> Option<CachedPayload<T>> {
        match self.read(descriptor).await {
            Ok(Some(entry)) => {
                tracing::debug!(key = %descriptor.cache_key(), "cache hit");
                Some(entry)
            }
            Ok(None) => {
                tracing::debug!(key = %descriptor.cache_key(), "cache miss");
                None
            }
            Err(error) => {
                tracing::warn!(key = %descriptor.cache_key(), %error, "cache read failed; treating as miss");
                None
            }
        }
    }

    /// Like [`write`](#method.write), but a failing store still yields the
    /// payload, stamped locally.
    pub async fn write_or_wrap<T: Serialize>(
        &self,
        descriptor: &CacheDescriptor,
        payload: T,
    ) -> CachedPayload<T> {
        let value = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key = %descriptor.cache_key(), %error, "cache payload not serializable");
                return CachedPayload::uncached(descriptor.clone(), payload);
            }
        };

        match self.write_entry(descriptor, value).await {
            Ok(entry) => CachedPayload {
                descriptor: entry.descriptor,
                payload,
                created_at: entry.created_at,
            },
            Err(error) => {
                tracing::warn!(key = %descriptor.cache_key(), %error, "cache write failed");
                CachedPayload::uncached(descriptor.clone(), payload)
            }
        }
    }
}
