//! Identity persistence (C1): loading and saving the assigned service
//! identifier across process restarts.
//!
//! Two modes are supported: a [`FileIdentityStore`] backed by a JSON file
//! on disk, and a [`CustomIdentityStore`] backed by caller-supplied async
//! callbacks. Both implement [`IdentityStore`].

use crate::error::{OrraError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

/// Loads and persists the opaque service id returned by registration.
/// `load` returns the previously saved id or `None`; `save` must be
/// durable (on disk, or whatever the custom backend means by durable)
/// before it returns.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Returns the previously saved id, or `None` if there isn't one (or
    /// the backing store is missing/corrupt; corruption is treated as
    /// "no identity", never as an error).
    async fn load(&self) -> Result<Option<String>>;

    /// Persists `id`. Idempotent: saving the same id twice is a no-op as
    /// far as callers can observe.
    async fn save(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIdentity {
    service_id: String,
}

/// File-backed identity store. Creates parent directories on first save
/// and replaces the file atomically (write to a sibling temp file, then
/// rename) so a crash mid-write never leaves a half-written file behind.
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    /// Uses the given path directly.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional default path for a service named `service_name`:
    /// `<cwd>/.orra-data/<service_name>-orra-service-key.json`.
    pub fn default_path(service_name: &str) -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".orra-data")
            .join(format!("{service_name}-orra-service-key.json"))
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn load(&self) -> Result<Option<String>> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no identity file yet");
                return Ok(None);
            }
            Err(e) => return Err(OrraError::Io(e)),
        };

        match serde_json::from_slice::<PersistedIdentity>(&contents) {
            Ok(identity) => Ok(Some(identity.service_id)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "identity file is corrupt, treating as absent");
                Ok(None)
            }
        }
    }

    async fn save(&self, id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(&PersistedIdentity {
            service_id: id.to_string(),
        })?;

        let tmp_path = tmp_sibling(&self.path);
        tokio::fs::write(&tmp_path, body).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        debug!(path = %self.path.display(), %id, "persisted service identity");
        Ok(())
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "identity".to_string());
    path.with_file_name(format!(".{file_name}.tmp"))
}

type SaveFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type LoadFuture = Pin<Box<dyn Future<Output = Result<Option<String>>> + Send>>;

/// A save callback: takes the id to persist, returns once it is durable.
pub type SaveFn = Arc<dyn Fn(String) -> SaveFuture + Send + Sync>;
/// A load callback: returns the previously saved id, if any.
pub type LoadFn = Arc<dyn Fn() -> LoadFuture + Send + Sync>;

/// Caller-supplied identity persistence. Construction fails if either
/// callback is missing; the contract requires both.
pub struct CustomIdentityStore {
    save_fn: SaveFn,
    load_fn: LoadFn,
}

impl CustomIdentityStore {
    /// Builds a custom store from both callbacks, failing with
    /// `InvalidArgument` semantics if the caller only provides one, so
    /// the misconfiguration is caught at construction rather than at the
    /// first save.
    pub fn new(save_fn: Option<SaveFn>, load_fn: Option<LoadFn>) -> Result<Self> {
        match (save_fn, load_fn) {
            (Some(save_fn), Some(load_fn)) => Ok(Self { save_fn, load_fn }),
            _ => Err(OrraError::InvalidArgument(
                "custom identity persistence requires both save and load callbacks".to_string(),
            )),
        }
    }
}

#[async_trait]
impl IdentityStore for CustomIdentityStore {
    async fn load(&self) -> Result<Option<String>> {
        (self.load_fn)().await
    }

    async fn save(&self, id: &str) -> Result<()> {
        (self.save_fn)(id.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("svc-orra-service-key.json");
        let store = FileIdentityStore::new(&path);

        assert_eq!(store.load().await.unwrap(), None);

        store.save("s_abc123").await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some("s_abc123".to_string()));

        // overwrite is atomic and idempotent
        store.save("s_abc123").await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some("s_abc123".to_string()));
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc-orra-service-key.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = FileIdentityStore::new(&path);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn custom_store_requires_both_callbacks() {
        let save_fn: SaveFn = Arc::new(|_id| Box::pin(async { Ok(()) }));
        assert!(CustomIdentityStore::new(Some(save_fn), None).is_err());
        assert!(CustomIdentityStore::new(None, None).is_err());
    }
}
