// Core data structures for the parkpulse pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Occupancy direction hint for a facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Constant,
}

impl Trend {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Constant => "constant",
        }
    }

    /// Create from a textual upstream value
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "increasing" => Some(Self::Increasing),
            "decreasing" => Some(Self::Decreasing),
            "constant" => Some(Self::Constant),
            _ => None,
        }
    }

    /// Create from a numeric upstream indicator (-1, 0, 1)
    pub fn from_indicator(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Increasing),
            0 => Some(Self::Constant),
            -1 => Some(Self::Decreasing),
            _ => None,
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which acquisition path produced a record or bundle
///
/// `Mixed` only appears at bundle level, when the entries of a bundle came
/// from more than one source. Individual records always carry a concrete
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Scrape,
    GeodataApi,
    Simulation,
    Mixed,
}

impl SourceKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::GeodataApi => "geodata-api",
            Self::Simulation => "simulation",
            Self::Mixed => "mixed",
        }
    }

    /// Tie-break rank when merging duplicate records. Live sources outrank
    /// simulated data.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Scrape => 3,
            Self::GeodataApi => 2,
            Self::Simulation => 1,
            Self::Mixed => 0,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Demand pattern of a facility, used by the simulation source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DemandProfile {
    /// Commuter-driven, peaks during office hours
    Business,
    /// Retail-driven, peaks late morning and afternoon
    Shopping,
    /// No dominant pattern
    #[default]
    Mixed,
}

impl DemandProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Shopping => "shopping",
            Self::Mixed => "mixed",
        }
    }
}

/// Geographic position in WGS84
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

/// A parking facility known to the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    /// Stable catalog identifier, e.g. "p-rathaus"
    pub id: String,

    /// Canonical display name, e.g. "Tiefgarage Rathaus"
    pub name: String,

    pub longitude: f64,

    pub latitude: f64,

    /// Total number of spaces
    pub capacity: u32,

    /// Demand pattern used when occupancy has to be simulated
    #[serde(default)]
    pub demand_profile: DemandProfile,
}

impl Facility {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            longitude: self.longitude,
            latitude: self.latitude,
        }
    }
}

/// An occupancy reading as reported by a source, before sanitization
///
/// Numeric fields are kept signed and unclamped here so that the sanitize
/// step is the single place where range rules are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Upstream-reported facility id, if the payload carried one
    pub facility_id: Option<String>,
    pub name: String,
    pub capacity: i64,
    pub free_spaces: i64,
    pub trend: Option<Trend>,
    pub captured_at: DateTime<Utc>,
    pub source: SourceKind,
}

impl RawRecord {
    /// Capacity clamped into the valid unsigned range
    pub fn clamped_capacity(&self) -> u32 {
        self.capacity.clamp(0, i64::from(u32::MAX)) as u32
    }

    /// Free spaces clamped into `0..=capacity`
    pub fn clamped_free(&self) -> u32 {
        let capacity = self.clamped_capacity();
        self.free_spaces.clamp(0, i64::from(capacity)) as u32
    }

    /// Sanitize into a validated snapshot
    ///
    /// Clamps free spaces into `0..=capacity` and derives the occupancy rate.
    /// The caller supplies the resolved facility id and trend because both
    /// need context (registry, previous bundle) this record does not have.
    pub fn into_snapshot(self, facility_id: String, trend: Trend) -> OccupancySnapshot {
        let capacity = self.clamped_capacity();
        let free_spaces = self.clamped_free();

        OccupancySnapshot {
            facility_id,
            name: self.name,
            capacity,
            free_spaces,
            occupancy_rate: occupancy_rate(capacity, free_spaces),
            trend,
            captured_at: self.captured_at,
            source: self.source,
        }
    }
}

/// Occupancy percentage, rounded to whole percent and clamped to 0-100
pub fn occupancy_rate(capacity: u32, free_spaces: u32) -> u8 {
    if capacity == 0 {
        return 0;
    }

    let occupied = capacity.saturating_sub(free_spaces);
    let rate = (f64::from(occupied) / f64::from(capacity) * 100.0).round();
    rate.clamp(0.0, 100.0) as u8
}

/// Validated occupancy reading for one facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancySnapshot {
    pub facility_id: String,
    pub name: String,
    pub capacity: u32,
    pub free_spaces: u32,
    /// Whole percent, 0-100
    pub occupancy_rate: u8,
    pub trend: Trend,
    pub captured_at: DateTime<Utc>,
    pub source: SourceKind,
}

/// One acquisition cycle's worth of snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBundle {
    pub captured_at: DateTime<Utc>,
    /// Concrete source when all entries agree, `Mixed` otherwise
    pub source: SourceKind,
    pub entries: Vec<OccupancySnapshot>,
}

impl SnapshotBundle {
    /// Look up the entry for a facility id
    pub fn entry_for(&self, facility_id: &str) -> Option<&OccupancySnapshot> {
        self.entries.iter().find(|e| e.facility_id == facility_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_pretty(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(capacity: i64, free: i64) -> RawRecord {
        RawRecord {
            facility_id: None,
            name: "Parkhaus Test".to_string(),
            capacity,
            free_spaces: free,
            trend: None,
            captured_at: Utc::now(),
            source: SourceKind::Scrape,
        }
    }

    #[test]
    fn test_negative_free_clamps_to_zero() {
        let snap = record(100, -5).into_snapshot("p-test".to_string(), Trend::Constant);
        assert_eq!(snap.free_spaces, 0);
        assert_eq!(snap.occupancy_rate, 100);
    }

    #[test]
    fn test_free_above_capacity_clamps_down() {
        let snap = record(100, 250).into_snapshot("p-test".to_string(), Trend::Constant);
        assert_eq!(snap.free_spaces, 100);
        assert_eq!(snap.occupancy_rate, 0);
    }

    #[test]
    fn test_occupancy_rate_rounding() {
        // 266 of 366 occupied = 72.68% -> 73
        assert_eq!(occupancy_rate(366, 100), 73);
        assert_eq!(occupancy_rate(0, 0), 0);
        assert_eq!(occupancy_rate(100, 100), 0);
        assert_eq!(occupancy_rate(100, 0), 100);
    }

    #[test]
    fn test_trend_parsing() {
        assert_eq!(Trend::parse("Increasing"), Some(Trend::Increasing));
        assert_eq!(Trend::parse("constant"), Some(Trend::Constant));
        assert_eq!(Trend::parse("sideways"), None);
        assert_eq!(Trend::from_indicator(-1), Some(Trend::Decreasing));
        assert_eq!(Trend::from_indicator(7), None);
    }

    #[test]
    fn test_source_priority_ordering() {
        assert!(SourceKind::Scrape.priority() > SourceKind::GeodataApi.priority());
        assert!(SourceKind::GeodataApi.priority() > SourceKind::Simulation.priority());
        assert!(SourceKind::Simulation.priority() > SourceKind::Mixed.priority());
    }

    #[test]
    fn test_source_kind_serde_tags() {
        let json = serde_json::to_string(&SourceKind::GeodataApi).unwrap();
        assert_eq!(json, "\"geodata-api\"");
        let back: SourceKind = serde_json::from_str("\"scrape\"").unwrap();
        assert_eq!(back, SourceKind::Scrape);
    }

    #[test]
    fn test_bundle_entry_lookup() {
        let bundle = SnapshotBundle {
            captured_at: Utc::now(),
            source: SourceKind::Simulation,
            entries: vec![record(200, 50).into_snapshot("p-a".to_string(), Trend::Constant)],
        };
        assert_eq!(bundle.len(), 1);
        assert!(bundle.entry_for("p-a").is_some());
        assert!(bundle.entry_for("p-b").is_none());
    }

    #[test]
    fn test_bundle_json_round_trip() {
        let bundle = SnapshotBundle {
            captured_at: Utc::now(),
            source: SourceKind::Scrape,
            entries: vec![record(366, 100).into_snapshot("p-s".to_string(), Trend::Increasing)],
        };
        let restored = SnapshotBundle::from_json(&bundle.to_json().unwrap()).unwrap();
        assert_eq!(restored, bundle);
    }

    proptest! {
        #[test]
        fn sanitize_invariants_hold(capacity in any::<i64>(), free in any::<i64>()) {
            let snap = record(capacity, free).into_snapshot("p".to_string(), Trend::Constant);
            prop_assert!(snap.free_spaces <= snap.capacity);
            prop_assert!(snap.occupancy_rate <= 100);
        }
    }
}
