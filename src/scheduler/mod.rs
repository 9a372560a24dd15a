//! Acquisition scheduling and cycle orchestration
//!
//! The [`AcquisitionService`] owns the full pipeline: it polls source
//! adapters in priority order, merges duplicate records, resolves canonical
//! facility identities and writes the finished bundle to the snapshot store.
//!
//! # Features
//!
//! - **Priority Fallback**: Scrape first, then geodata, then simulation
//! - **Single-Flight Cycles**: Concurrent callers share one acquisition
//! - **Trend Carry-Over**: Missing trends are derived from the previous bundle
//! - **Periodic Refresh**: Background loop with graceful stop
//!
//! # Quick Start
//!
//! ```ignore
//! use parkpulse::prelude::*;
//! use std::sync::Arc;
//!
//! let config = Config::from_env()?;
//! let registry = Arc::new(Registry::builtin());
//! let store = Arc::new(SnapshotStore::new(config.stale_threshold()));
//!
//! let service = AcquisitionService::new(&config, registry, store)?;
//! let bundle = service.acquire_cycle().await;
//! println!("{} facilities captured", bundle.len());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

use crate::cache::{CacheReading, SnapshotStore};
use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::metrics;
use crate::models::{Coordinates, OccupancySnapshot, RawRecord, SnapshotBundle, SourceKind, Trend};
use crate::registry::Registry;
use crate::sources::{GeodataAdapter, ScrapeAdapter, SimulationAdapter, SourceAdapter};

// ============================================================================
// Acquisition Service
// ============================================================================

/// Orchestrates acquisition cycles and periodic refresh
pub struct AcquisitionService {
    adapters: Vec<Box<dyn SourceAdapter>>,
    simulation: SimulationAdapter,
    store: Arc<SnapshotStore>,
    registry: Arc<Registry>,
    dedup: Deduplicator,
    refresh_interval: std::time::Duration,
    acquire_lock: Mutex<()>,
    is_running: Arc<RwLock<bool>>,
}

impl AcquisitionService {
    /// Create a service from configuration
    ///
    /// Adapters are built in priority order; URL lists that are empty in the
    /// configuration simply produce no adapter. The simulation fallback is
    /// always available.
    pub fn new(
        config: &Config,
        registry: Arc<Registry>,
        store: Arc<SnapshotStore>,
    ) -> crate::error::Result<Self> {
        let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();

        if !config.sources.scrape_urls.is_empty() {
            adapters.push(Box::new(ScrapeAdapter::new(
                config.sources.scrape_urls.clone(),
                config.source_timeout(),
                &config.sources.user_agent,
                config.scrape_artifact_path(),
            )?));
        }

        if !config.sources.geodata_urls.is_empty() {
            adapters.push(Box::new(GeodataAdapter::new(
                config.sources.geodata_urls.clone(),
                config.source_timeout(),
                &config.sources.user_agent,
            )?));
        }

        let simulation =
            SimulationAdapter::new(Arc::clone(&registry), config.simulation.clone());

        Ok(Self {
            adapters,
            simulation,
            store,
            registry,
            dedup: Deduplicator::new(),
            refresh_interval: config.refresh_interval(),
            acquire_lock: Mutex::new(()),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Create a service with explicit adapters
    pub fn with_adapters(
        adapters: Vec<Box<dyn SourceAdapter>>,
        simulation: SimulationAdapter,
        store: Arc<SnapshotStore>,
        registry: Arc<Registry>,
        refresh_interval: std::time::Duration,
    ) -> Self {
        Self {
            adapters,
            simulation,
            store,
            registry,
            dedup: Deduplicator::new(),
            refresh_interval,
            acquire_lock: Mutex::new(()),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Get the configured refresh interval
    #[must_use]
    pub fn refresh_interval(&self) -> std::time::Duration {
        self.refresh_interval
    }

    // ========================================================================
    // Cycle Execution
    // ========================================================================

    /// Run one full acquisition cycle
    ///
    /// Only one cycle runs at a time; concurrent callers wait for the lock
    /// and then run their own cycle. The returned bundle is always usable
    /// because the simulation fallback cannot fail.
    pub async fn acquire_cycle(&self) -> Arc<SnapshotBundle> {
        let _guard = self.acquire_lock.lock().await;
        self.run_cycle_locked().await
    }

    /// Return the cached bundle, acquiring one first if the cache is empty
    ///
    /// Concurrent callers on a cold cache share a single acquisition cycle.
    pub async fn ensure_bundle(&self) -> Arc<SnapshotBundle> {
        if let Some(reading) = self.store.read().await {
            return reading.bundle;
        }

        let _guard = self.acquire_lock.lock().await;

        // Another caller may have filled the cache while we waited
        if let Some(reading) = self.store.read().await {
            return reading.bundle;
        }

        self.run_cycle_locked().await
    }

    // Internal: Run a cycle; the caller must hold the acquire lock
    async fn run_cycle_locked(&self) -> Arc<SnapshotBundle> {
        let started = Instant::now();
        let previous = self.store.read().await.map(|r| r.bundle);

        let records = self.collect_records().await;
        let merged = self.dedup.merge(records);

        let captured_at = Utc::now();
        let mut entries = Vec::with_capacity(merged.len());
        for record in merged {
            let resolution = self
                .registry
                .resolve(record.facility_id.as_deref(), &record.name);
            let trend = record.trend.unwrap_or_else(|| {
                Self::trend_from_previous(&record, &resolution.facility_id, previous.as_deref())
            });
            entries.push(record.into_snapshot(resolution.facility_id, trend));
        }

        let source = bundle_source(&entries);
        let bundle = Arc::new(SnapshotBundle {
            captured_at,
            source,
            entries,
        });

        if let Err(e) = self.store.write(Arc::clone(&bundle)).await {
            tracing::error!("Failed to persist snapshot: {}", e);
            metrics::record_cache_write_failure();
        }

        metrics::record_cycle(source.as_str(), bundle.len(), started.elapsed().as_secs_f64());
        tracing::info!(
            "Acquisition cycle complete: {} records from {}",
            bundle.len(),
            source
        );

        bundle
    }

    // Internal: Poll adapters in priority order, falling back to simulation
    async fn collect_records(&self) -> Vec<RawRecord> {
        for adapter in &self.adapters {
            match adapter.acquire().await {
                Ok(records) if !records.is_empty() => {
                    tracing::debug!(
                        "{} adapter produced {} records",
                        adapter.kind(),
                        records.len()
                    );
                    return records;
                }
                Ok(_) => {
                    tracing::warn!("{} adapter returned no records", adapter.kind());
                    metrics::record_adapter_failure(adapter.kind().as_str());
                }
                Err(e) => {
                    tracing::warn!("{} adapter failed: {}", adapter.kind(), e);
                    metrics::record_adapter_failure(adapter.kind().as_str());
                }
            }
        }

        tracing::info!("All live sources exhausted, synthesizing snapshot");
        self.simulation.synthesize(Utc::now()).await
    }

    // Internal: Derive a trend by comparing against the previous bundle
    fn trend_from_previous(
        record: &RawRecord,
        facility_id: &str,
        previous: Option<&SnapshotBundle>,
    ) -> Trend {
        let Some(prev) = previous.and_then(|b| b.entry_for(facility_id)) else {
            return Trend::Constant;
        };

        match record.clamped_free().cmp(&prev.free_spaces) {
            std::cmp::Ordering::Less => Trend::Increasing,
            std::cmp::Ordering::Greater => Trend::Decreasing,
            std::cmp::Ordering::Equal => Trend::Constant,
        }
    }

    // ========================================================================
    // Refresh Loop
    // ========================================================================

    /// Run the periodic refresh loop (runs until stopped)
    pub async fn run(&self) {
        *self.is_running.write().await = true;
        tracing::info!(
            "Acquisition loop started (refresh every {}s)",
            self.refresh_interval.as_secs()
        );

        // First cycle runs immediately so the cache starts populated
        self.acquire_cycle().await;

        while *self.is_running.read().await {
            tokio::select! {
                _ = tokio::time::sleep(self.refresh_interval) => {
                    self.acquire_cycle().await;
                }
                _ = self.wait_for_stop() => {
                    break;
                }
            }
        }

        tracing::info!("Acquisition loop stopped");
    }

    /// Stop the refresh loop
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
    }

    /// Check if the refresh loop is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    // Internal: Wait for stop signal
    async fn wait_for_stop(&self) {
        loop {
            if !*self.is_running.read().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Build the occupancy report served by the read API
    ///
    /// Acquires a bundle first if the cache is cold.
    pub async fn snapshot_report(&self) -> SnapshotReport {
        let bundle = self.ensure_bundle().await;
        let reading = self.store.read().await.unwrap_or(CacheReading {
            bundle: Arc::clone(&bundle),
            age: chrono::Duration::zero(),
            is_stale: false,
        });

        let facilities = reading
            .bundle
            .entries
            .iter()
            .map(|entry| {
                let coordinates = self
                    .registry
                    .get(&entry.facility_id)
                    .map(|facility| facility.coordinates());
                FacilityReport {
                    id: entry.facility_id.clone(),
                    name: entry.name.clone(),
                    free_spaces: entry.free_spaces,
                    total_spaces: entry.capacity,
                    occupancy_rate: entry.occupancy_rate,
                    trend: entry.trend,
                    coordinates,
                    last_update: entry.captured_at,
                }
            })
            .collect();

        let refresh = chrono::Duration::from_std(self.refresh_interval).unwrap_or_default();
        let cache_info = CacheInfo {
            age_minutes: reading.age.num_minutes(),
            is_stale: reading.is_stale,
            source: reading.bundle.source,
            next_expected_update: reading.bundle.captured_at + refresh,
        };

        SnapshotReport {
            facilities,
            cache_info,
        }
    }
}

// Internal: The bundle source is the record source when homogeneous
fn bundle_source(entries: &[OccupancySnapshot]) -> SourceKind {
    let mut kinds = entries.iter().map(|e| e.source);
    let Some(first) = kinds.next() else {
        return SourceKind::Simulation;
    };

    if kinds.all(|k| k == first) {
        first
    } else {
        SourceKind::Mixed
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Full occupancy report with cache metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub facilities: Vec<FacilityReport>,
    pub cache_info: CacheInfo,
}

/// Per-facility entry in the occupancy report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityReport {
    pub id: String,
    pub name: String,
    pub free_spaces: u32,
    pub total_spaces: u32,
    pub occupancy_rate: u8,
    pub trend: Trend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    pub last_update: DateTime<Utc>,
}

/// Cache metadata attached to the occupancy report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInfo {
    pub age_minutes: i64,
    pub is_stale: bool,
    pub source: SourceKind,
    pub next_expected_update: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================
