//! Open geodata API client
//!
//! Second rung of the source chain. The open-data portal serves the same
//! feature collection as the municipal page, just as plain JSON, so this
//! adapter is a thin fetch-and-normalize layer over [`fields`].

use chrono::Utc;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{fields, SourceAdapter, SourceError};
use crate::models::{RawRecord, SourceKind};

/// Client for the open geodata endpoints
pub struct GeodataAdapter {
    client: Client,
    urls: Vec<String>,
}

impl GeodataAdapter {
    /// Create a new geodata adapter
    pub fn new(urls: Vec<String>, timeout: Duration, user_agent: &str) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(Self { client, urls })
    }

    async fn try_url(&self, url: &str) -> Result<Vec<RawRecord>, SourceError> {
        let captured_at = Utc::now();

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let payload: Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                SourceError::NoPayload
            } else {
                SourceError::from_reqwest(e)
            }
        })?;

        let records =
            fields::records_from_feature_collection(&payload, SourceKind::GeodataApi, captured_at);
        if records.is_empty() {
            return Err(SourceError::NoPayload);
        }

        tracing::debug!(url = %url, records = records.len(), "Fetched geodata payload");
        Ok(records)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for GeodataAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::GeodataApi
    }

    async fn acquire(&self) -> Result<Vec<RawRecord>, SourceError> {
        for url in &self.urls {
            match self.try_url(url).await {
                Ok(records) => return Ok(records),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Geodata endpoint failed");
                }
            }
        }

        Err(SourceError::AllEndpointsFailed)
    }
}
