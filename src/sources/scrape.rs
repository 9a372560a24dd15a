//! Municipal parking page scraper
//!
//! The city publishes occupancy as a JSON feature collection embedded in the
//! HTML of its parking page. The payload moves around between site relaunches
//! (inline script, occasionally a plain JSON response), so extraction scans
//! `<script>` elements first and falls back to the raw body. A brace-balanced
//! scan around the `"FeatureCollection"` marker tolerates the script code
//! surrounding the object.
//!
//! Each successfully extracted payload is mirrored to an artifact file for
//! offline inspection of what the site actually served.

use chrono::Utc;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use super::{fields, SourceAdapter, SourceError};
use crate::models::{RawRecord, SourceKind};

const MARKER: &str = "\"FeatureCollection\"";

/// How many enclosing braces to try around a marker before giving up
const MAX_OUTWARD_STEPS: usize = 8;

/// Scraper for the municipal parking page
pub struct ScrapeAdapter {
    client: Client,
    urls: Vec<String>,
    artifact_path: Option<PathBuf>,
}

impl ScrapeAdapter {
    /// Create a new scrape adapter
    pub fn new(
        urls: Vec<String>,
        timeout: Duration,
        user_agent: &str,
        artifact_path: Option<PathBuf>,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            urls,
            artifact_path,
        })
    }

    async fn try_url(&self, url: &str) -> Result<Vec<RawRecord>, SourceError> {
        let captured_at = Utc::now();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(SourceError::from_reqwest)?;

        let payload = extract_feature_collection(&body).ok_or(SourceError::NoPayload)?;
        let records =
            fields::records_from_feature_collection(&payload, SourceKind::Scrape, captured_at);
        if records.is_empty() {
            return Err(SourceError::NoPayload);
        }

        self.write_artifact(&payload).await;
        tracing::debug!(url = %url, records = records.len(), "Scraped occupancy payload");

        Ok(records)
    }

    /// Mirror the extracted payload to disk, best effort
    async fn write_artifact(&self, payload: &Value) {
        let Some(path) = &self.artifact_path else {
            return;
        };

        let json = match serde_json::to_string_pretty(payload) {
            Ok(json) => json,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping scrape artifact");
                return;
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
        }

        if let Err(e) = tokio::fs::write(path, json).await {
            tracing::debug!(path = %path.display(), error = %e, "Could not write scrape artifact");
        }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for ScrapeAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Scrape
    }

    async fn acquire(&self) -> Result<Vec<RawRecord>, SourceError> {
        for url in &self.urls {
            match self.try_url(url).await {
                Ok(records) => return Ok(records),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Scrape endpoint failed");
                }
            }
        }

        Err(SourceError::AllEndpointsFailed)
    }
}

/// Locate the embedded feature collection in a page body
fn extract_feature_collection(body: &str) -> Option<Value> {
    static SCRIPT_SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector =
        SCRIPT_SELECTOR.get_or_init(|| Selector::parse("script").expect("Invalid selector"));

    let document = Html::parse_document(body);
    for script in document.select(selector) {
        let text: String = script.text().collect();
        if let Some(payload) = scan_for_feature_collection(&text) {
            return Some(payload);
        }
    }

    // Some deployments serve the collection as plain JSON or outside scripts
    scan_for_feature_collection(body)
}

/// Scan text for a JSON object containing a feature collection
///
/// For every `"FeatureCollection"` marker, walk outward through the opening
/// braces before it until one balances into an object that spans the marker
/// and carries a `features` array.
fn scan_for_feature_collection(text: &str) -> Option<Value> {
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find(MARKER) {
        let marker = search_from + found;

        let mut upper = marker;
        for _ in 0..MAX_OUTWARD_STEPS {
            let Some(start) = text[..upper].rfind('{') else {
                break;
            };

            if let Some(candidate) = balanced_object(text, start) {
                let spans_marker = start + candidate.len() > marker + MARKER.len();
                if spans_marker {
                    if let Ok(payload) = serde_json::from_str::<Value>(candidate) {
                        if payload.get("features").is_some() {
                            return Some(payload);
                        }
                    }
                }
            }

            upper = start;
        }

        search_from = marker + MARKER.len();
    }

    None
}

/// Slice of `text` from the opening brace at `start` to its matching close,
/// skipping braces inside JSON strings
fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}
