//! parkpulse - Live Parking Occupancy Pipeline
//!
//! A self-healing acquisition pipeline that keeps a city-wide view of parking
//! occupancy fresh: scrape the municipal site, fall back to the open geodata
//! API, fall back to simulation, and serve the latest snapshot over HTTP.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`registry`] - Known-facility catalog and name resolution
//! - [`sources`] - Acquisition adapters (scrape, geodata API, simulation)
//! - [`dedup`] - Fuzzy-name record deduplication
//! - [`cache`] - Durable snapshot store with staleness tracking
//! - [`scheduler`] - Periodic acquisition service with single-flight guard
//! - [`api`] - HTTP read API for cached snapshots
//! - [`models`] - Core data structures and types
//!
//! # Example
//!
//! ```no_run
//! use parkpulse::cache::SnapshotStore;
//! use parkpulse::config::Config;
//! use parkpulse::registry::Registry;
//! use parkpulse::scheduler::AcquisitionService;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let registry = Arc::new(Registry::builtin());
//!     let store = Arc::new(SnapshotStore::with_file(
//!         &config.cache.snapshot_path,
//!         config.stale_threshold(),
//!     ));
//!     let service = AcquisitionService::new(&config, registry, store)?;
//!     let bundle = service.acquire_cycle().await;
//!     println!("{} facilities", bundle.entries.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod sources;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheReading, SnapshotStore};
    pub use crate::config::Config;
    pub use crate::dedup::Deduplicator;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{
        Facility, OccupancySnapshot, RawRecord, SnapshotBundle, SourceKind, Trend,
    };
    pub use crate::registry::Registry;
    pub use crate::scheduler::AcquisitionService;
    pub use crate::sources::{SourceAdapter, SourceError};
}

// Direct re-exports for convenience
pub use models::{Facility, OccupancySnapshot, RawRecord, SnapshotBundle, SourceKind, Trend};
