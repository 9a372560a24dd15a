//! Durable snapshot cache
//!
//! Holds the latest snapshot bundle in memory behind an `RwLock` and mirrors
//! it to a JSON file so restarts resume with the last known data:
//! - Readers receive an `Arc` to an immutable bundle, so a concurrent write
//!   can never tear a response
//! - Writes swap the in-memory bundle first, then persist atomically via a
//!   temp file and rename
//! - Staleness is derived at read time from the bundle capture timestamp
//!
//! A failed persist leaves the fresh bundle in memory and is reported as
//! [`Error::CacheWrite`] so callers can alert on it.
//!
//! # Example
//!
//! ```rust,ignore
//! use parkpulse::cache::SnapshotStore;
//! use std::time::Duration;
//!
//! let store = SnapshotStore::with_file("data/snapshot.json", Duration::from_secs(7200));
//! store.load().await;
//! if let Some(reading) = store.read().await {
//!     println!("{} records, stale: {}", reading.bundle.len(), reading.is_stale);
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{SnapshotBundle, SourceKind};

/// In-memory snapshot holder with optional file persistence
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<SnapshotBundle>>>,
    file_path: Option<PathBuf>,
    stale_threshold: Duration,
}

/// A consistent view of the cached bundle at one point in time
#[derive(Debug, Clone)]
pub struct CacheReading {
    pub bundle: Arc<SnapshotBundle>,

    /// Time since the bundle was captured
    pub age: chrono::Duration,

    /// True once the age exceeds the staleness threshold
    pub is_stale: bool,
}

/// Store state summary for operator tooling
#[derive(Debug, Clone)]
pub struct StoreStatus {
    pub has_bundle: bool,
    pub record_count: Option<usize>,
    pub source: Option<SourceKind>,
    pub age_seconds: Option<i64>,
    pub is_stale: bool,
    pub file_path: Option<String>,
}

impl StoreStatus {
    /// Human-readable status line for CLI output
    pub fn display(&self) -> String {
        if !self.has_bundle {
            return String::from("Snapshot cache: empty");
        }

        let records = self.record_count.unwrap_or(0);
        let source = self
            .source
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| String::from("unknown"));
        let age = self.age_seconds.unwrap_or(0);
        let freshness = if self.is_stale { "STALE" } else { "fresh" };

        format!("Snapshot cache: {records} records from {source}, age {age}s ({freshness})")
    }
}

impl SnapshotStore {
    /// Create an in-memory store without file persistence
    pub fn new(stale_threshold: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            file_path: None,
            stale_threshold,
        }
    }

    /// Create a store that mirrors every write to `path`
    pub fn with_file(path: impl Into<PathBuf>, stale_threshold: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            file_path: Some(path.into()),
            stale_threshold,
        }
    }

    /// Install a new bundle and persist it
    ///
    /// The in-memory swap happens before persistence, so even when the write
    /// to disk fails the fresh bundle is already being served.
    pub async fn write(&self, bundle: Arc<SnapshotBundle>) -> Result<()> {
        {
            let mut current = self.current.write().await;
            *current = Some(Arc::clone(&bundle));
        }

        if let Some(path) = &self.file_path {
            persist(path, &bundle).await?;
        }

        Ok(())
    }

    /// Read the current bundle together with its freshness
    pub async fn read(&self) -> Option<CacheReading> {
        let bundle = {
            let current = self.current.read().await;
            current.as_ref().cloned()?
        };

        let age = chrono::Utc::now().signed_duration_since(bundle.captured_at);
        let is_stale = age.num_milliseconds() > self.stale_threshold.as_millis() as i64;

        Some(CacheReading {
            bundle,
            age,
            is_stale,
        })
    }

    /// Whether a bundle is currently held
    pub async fn has_bundle(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Restore the persisted bundle, if any
    ///
    /// Returns true when a bundle was restored. A missing file is normal
    /// (first start); a corrupt file is logged and ignored so the next
    /// acquisition cycle repopulates the cache.
    pub async fn load(&self) -> bool {
        let Some(path) = &self.file_path else {
            return false;
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<SnapshotBundle>(&content) {
                Ok(bundle) => {
                    tracing::info!(
                        path = %path.display(),
                        records = bundle.len(),
                        "Restored snapshot bundle from disk"
                    );
                    let mut current = self.current.write().await;
                    *current = Some(Arc::new(bundle));
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Snapshot file is corrupt, starting empty"
                    );
                    false
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not read snapshot file, starting empty"
                );
                false
            }
        }
    }

    /// Staleness threshold this store was built with
    #[must_use]
    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    /// Summarize the store state for operator tooling
    pub async fn status(&self) -> StoreStatus {
        let reading = self.read().await;

        StoreStatus {
            has_bundle: reading.is_some(),
            record_count: reading.as_ref().map(|r| r.bundle.len()),
            source: reading.as_ref().map(|r| r.bundle.source),
            age_seconds: reading.as_ref().map(|r| r.age.num_seconds()),
            is_stale: reading.as_ref().map(|r| r.is_stale).unwrap_or(false),
            file_path: self.file_path.as_ref().map(|p| p.display().to_string()),
        }
    }
}

/// Atomically persist a bundle: write to a temp file, then rename over the
/// target so readers of the file never observe a partial write.
async fn persist(path: &std::path::Path, bundle: &SnapshotBundle) -> Result<()> {
    let json = serde_json::to_string_pretty(bundle)
        .map_err(|e| Error::CacheWrite(std::io::Error::other(e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Error::CacheWrite)?;
        }
    }

    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, json)
        .await
        .map_err(Error::CacheWrite)?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(Error::CacheWrite)?;

    tracing::debug!(path = %path.display(), "Persisted snapshot bundle");
    Ok(())
}
