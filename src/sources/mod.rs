//! Acquisition source adapters
//!
//! Each adapter speaks one upstream interface and produces the same record
//! shape, so the scheduler can walk the priority chain without caring where
//! the data came from:
//!
//! - [`scrape`] - municipal parking page with an embedded JSON payload
//! - [`geodata`] - open geodata API endpoints
//! - [`simulation`] - synthetic occupancy from the facility catalog, never fails
//!
//! Adapters are all-or-nothing: a response either yields records or the
//! endpoint counts as failed and the next one in the chain is tried.

pub mod fields;
pub mod geodata;
pub mod scrape;
pub mod simulation;

pub use geodata::GeodataAdapter;
pub use scrape::ScrapeAdapter;
pub use simulation::{SimulationAdapter, SimulationProfile};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{RawRecord, SourceKind};

/// Errors a source adapter can report
#[derive(Error, Debug)]
pub enum SourceError {
    /// Request construction or transport failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint did not answer within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// The endpoint answered with a non-success status
    #[error("Server returned status {0}")]
    Status(u16),

    /// The response carried no parseable occupancy payload
    #[error("No parseable occupancy payload in response")]
    NoPayload,

    /// Every configured endpoint failed
    #[error("All configured endpoints failed")]
    AllEndpointsFailed,
}

impl SourceError {
    /// Fold a transport error into the right variant
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e)
        }
    }
}

/// One acquisition path in the source priority chain
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which source this adapter represents
    fn kind(&self) -> SourceKind;

    /// Fetch the current occupancy records
    ///
    /// Adapters return [`SourceError::NoPayload`] instead of an empty vector
    /// when an endpoint answered without usable data.
    async fn acquire(&self) -> Result<Vec<RawRecord>, SourceError>;
}
