//! Known-facility catalog and name resolution
//!
//! The registry anchors upstream records to stable identities: canonical
//! names, coordinates and capacity baselines. Resolution runs in three steps:
//! reported id, exact normalized name, fuzzy name match. Records that match
//! nothing get a provisional key derived from their normalized name, so an
//! unknown facility keeps the same id across cycles and payload variants.

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

use crate::dedup::{normalize_name, similarity};
use crate::models::{DemandProfile, Facility};

/// Minimum similarity for a fuzzy catalog match
const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Catalog of known parking facilities
#[derive(Debug, Clone)]
pub struct Registry {
    facilities: Vec<Facility>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    normalized: Vec<String>,
}

/// Result of resolving a reported record against the catalog
#[derive(Debug)]
pub struct Resolution<'a> {
    /// A catalog id, or a provisional "~xxxxxxxx" key for unknown facilities
    pub facility_id: String,

    /// The matched catalog entry, when there is one
    pub facility: Option<&'a Facility>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    facility: Vec<Facility>,
}

impl Registry {
    /// Build a registry from a list of facilities
    pub fn new(facilities: Vec<Facility>) -> Self {
        let mut by_id = HashMap::with_capacity(facilities.len());
        let mut by_name = HashMap::with_capacity(facilities.len());
        let mut normalized = Vec::with_capacity(facilities.len());

        for (idx, facility) in facilities.iter().enumerate() {
            let key = normalize_name(&facility.name);
            by_id.insert(facility.id.clone(), idx);
            by_name.entry(key.clone()).or_insert(idx);
            normalized.push(key);
        }

        Self {
            facilities,
            by_id,
            by_name,
            normalized,
        }
    }

    /// The built-in mid-town catalog used when no catalog file is configured
    pub fn builtin() -> Self {
        Self::new(vec![
            entry("p-schuetzenstrasse", "Parkhaus Schützenstraße", 9.2204, 48.8951, 366, DemandProfile::Business),
            entry("p-rathaus", "Tiefgarage Rathaus", 9.2181, 48.8976, 420, DemandProfile::Mixed),
            entry("p-bahnhof", "Parkplatz am Bahnhof", 9.2262, 48.9012, 255, DemandProfile::Business),
            entry("p-stadthalle", "Parkhaus Stadthalle", 9.2149, 48.8938, 310, DemandProfile::Mixed),
            entry("p-altstadt", "Tiefgarage Altstadt", 9.2168, 48.8959, 188, DemandProfile::Shopping),
            entry("p-marktplatz", "Parkplatz Marktplatz", 9.2192, 48.8964, 95, DemandProfile::Shopping),
            entry("p-klinikum", "Parkhaus Klinikum", 9.2081, 48.9043, 270, DemandProfile::Business),
            entry("p-schlossgarten", "Parkplatz Schlossgarten", 9.2235, 48.8922, 140, DemandProfile::Mixed),
        ])
    }

    /// Load a catalog from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read facility catalog: {}", path.display()))?;

        let catalog: CatalogFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse facility catalog: {}", path.display()))?;

        if catalog.facility.is_empty() {
            anyhow::bail!("Facility catalog contains no entries: {}", path.display());
        }

        let mut seen = std::collections::HashSet::new();
        for facility in &catalog.facility {
            if !seen.insert(facility.id.as_str()) {
                anyhow::bail!("Duplicate facility id in catalog: {}", facility.id);
            }
        }

        Ok(Self::new(catalog.facility))
    }

    /// Look up a facility by catalog id
    pub fn get(&self, id: &str) -> Option<&Facility> {
        self.by_id.get(id).map(|&idx| &self.facilities[idx])
    }

    /// All catalog entries in declaration order
    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    /// Resolve a reported record to a stable facility id
    ///
    /// Tries the reported id first, then an exact normalized-name match,
    /// then the best fuzzy match at or above the threshold. Unmatched names
    /// are minted a provisional key.
    pub fn resolve(&self, reported_id: Option<&str>, name: &str) -> Resolution<'_> {
        if let Some(id) = reported_id {
            if let Some(&idx) = self.by_id.get(id) {
                let facility = &self.facilities[idx];
                return Resolution {
                    facility_id: facility.id.clone(),
                    facility: Some(facility),
                };
            }
        }

        let normalized = normalize_name(name);

        if let Some(&idx) = self.by_name.get(&normalized) {
            let facility = &self.facilities[idx];
            return Resolution {
                facility_id: facility.id.clone(),
                facility: Some(facility),
            };
        }

        let mut best: Option<(usize, f64)> = None;
        for (idx, key) in self.normalized.iter().enumerate() {
            let score = similarity(key, &normalized);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((idx, score));
            }
        }

        if let Some((idx, score)) = best {
            if score >= SIMILARITY_THRESHOLD {
                let facility = &self.facilities[idx];
                tracing::debug!(
                    reported = %name,
                    matched = %facility.name,
                    score = format!("{score:.2}"),
                    "Fuzzy-matched facility name"
                );
                return Resolution {
                    facility_id: facility.id.clone(),
                    facility: Some(facility),
                };
            }
        }

        Resolution {
            facility_id: provisional_key(&normalized),
            facility: None,
        }
    }
}

/// Mint a stable provisional id for an unknown facility name
///
/// "~" plus the first 8 hex characters of the SHA-256 of the normalized name.
fn provisional_key(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("~{}", &digest[..8])
}

fn entry(
    id: &str,
    name: &str,
    longitude: f64,
    latitude: f64,
    capacity: u32,
    demand_profile: DemandProfile,
) -> Facility {
    Facility {
        id: id.to_string(),
        name: name.to_string(),
        longitude,
        latitude,
        capacity,
        demand_profile,
    }
}
