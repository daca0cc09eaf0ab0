use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;

use super::{CacheDescriptor, CacheError, CacheFuture, CacheStore, CachedPayload};
use crate::UtcDateTime;

/// File-backed cache store: `<base>/<source_id>/<scope>/<encoded key>.json`.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    base_dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, descriptor: &CacheDescriptor) -> PathBuf {
        self.base_dir
            .join(sanitize_segment(&descriptor.source_id))
            .join(sanitize_segment(descriptor.scope.as_str()))
            .join(format!("{}.json", urlencoding::encode(&descriptor.key)))
    }
}

impl CacheStore for FileCacheStore {
    fn read_entry<'a>(
        &'a self,
        descriptor: &'a CacheDescriptor,
    ) -> CacheFuture<'a, Option<CachedPayload<Value>>> {
        Box::pin(async move {
            let path = self.file_path(descriptor);
            let raw = match fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
                Err(error) => return Err(CacheError::Io(error)),
            };

            let entry: CachedPayload<Value> = serde_json::from_str(&raw)?;
            if entry.descriptor.is_expired_at(UtcDateTime::now()) {
                remove_if_present(&path).await?;
                return Ok(None);
            }

            Ok(Some(entry))
        })
    }

    fn write_entry<'a>(
        &'a self,
        descriptor: &'a CacheDescriptor,
        payload: Value,
    ) -> CacheFuture<'a, CachedPayload<Value>> {
        Box::pin(async move {
            let path = self.file_path(descriptor);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }

            let record = CachedPayload {
                descriptor: descriptor.clone(),
                payload,
                created_at: UtcDateTime::now(),
            };

            // Write-then-rename so concurrent readers never observe a torn file.
            let staging = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
            fs::write(&staging, serde_json::to_vec(&record)?).await?;
            fs::rename(&staging, &path).await?;

            Ok(record)
        })
    }

    fn clear<'a>(&'a self, descriptor: &'a CacheDescriptor) -> CacheFuture<'a, ()> {
        Box::pin(async move { remove_if_present(&self.file_path(descriptor)).await })
    }
}

async fn remove_if_present(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(CacheError::Io(error)),
    }
}

fn sanitize_segment(segment: &str) -> String {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return String::from("default");
    }

    trimmed
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
