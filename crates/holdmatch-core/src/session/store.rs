use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

use super::Session;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, SessionStoreError>> + Send + 'a>>;

/// Durable session persistence. `save` followed by `load` returns an equal
/// session; the store never mutates what it is given.
pub trait SessionStore: Send + Sync {
    fn load<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<Session>>;

    fn save<'a>(&'a self, session: &'a Session) -> StoreFuture<'a, ()>;
}

/// One pretty-printed JSON document per session at `<base>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    base_dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `None` for ids that could escape the base directory.
    pub fn file_path(&self, session_id: &str) -> Option<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'));
        valid.then(|| self.base_dir.join(format!("{session_id}.json")))
    }
}

impl SessionStore for FileSessionStore {
    fn load<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<Session>> {
        Box::pin(async move {
            let Some(path) = self.file_path(session_id) else {
                return Ok(None);
            };

            match fs::read_to_string(&path).await {
                Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
                Err(error) => Err(error.into()),
            }
        })
    }

    fn save<'a>(&'a self, session: &'a Session) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.file_path(&session.id).ok_or_else(|| {
                std::io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("invalid session id '{}'", session.id),
                )
            })?;
            fs::create_dir_all(&self.base_dir).await?;

            let staging = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
            fs::write(&staging, serde_json::to_vec_pretty(session)?).await?;
            fs::rename(&staging, &path).await?;
            Ok(())
        })
    }
}

/// In-process store, mainly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn load<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<Session>> {
        Box::pin(async move { Ok(self.sessions.read().await.get(session_id).cloned()) })
    }

    fn save<'a>(&'a self, session: &'a Session) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.sessions
                .write()
                .await
                .insert(session.id.clone(), session.clone());
            Ok(())
        })
    }
}
