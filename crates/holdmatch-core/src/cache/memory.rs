use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use super::{CacheDescriptor, CacheFuture, CacheKey, CacheStore, CachedPayload};
use crate::UtcDateTime;

/// Thread-safe in-memory cache store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<RwLock<HashMap<CacheKey, CachedPayload<Value>>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet read.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn read_entry<'a>(
        &'a self,
        descriptor: &'a CacheDescriptor,
    ) -> CacheFuture<'a, Option<CachedPayload<Value>>> {
        Box::pin(async move {
            let key = descriptor.cache_key();
            let now = UtcDateTime::now();

            {
                let map = self.inner.read().await;
                match map.get(&key) {
                    None => return Ok(None),
                    Some(entry) if !entry.descriptor.is_expired_at(now) => {
                        return Ok(Some(entry.clone()));
                    }
                    Some(_) => {}
                }
            }

            // Re-check under the write lock: a concurrent writer may have
            // replaced the expired row.
            let mut map = self.inner.write().await;
            if let Some(entry) = map.get(&key) {
                if !entry.descriptor.is_expired_at(now) {
                    return Ok(Some(entry.clone()));
                }
                map.remove(&key);
            }
            Ok(None)
        })
    }

    fn write_entry<'a>(
        &'a self,
        descriptor: &'a CacheDescriptor,
        payload: Value,
    ) -> CacheFuture<'a, CachedPayload<Value>> {
        Box::pin(async move {
            let record = CachedPayload {
                descriptor: descriptor.clone(),
                payload,
                created_at: UtcDateTime::now(),
            };

            self.inner
                .write()
                .await
                .insert(descriptor.cache_key(), record.clone());
            Ok(record)
        })
    }

    fn clear<'a>(&'a self, descriptor: &'a CacheDescriptor) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.inner.write().await.remove(&descriptor.cache_key());
            Ok(())
        })
    }
}
