//! Field normalization for upstream payloads
//!
//! The municipal page and the geodata API carry the same feature collection,
//! but field names drift between deployments and releases. This module maps
//! the known aliases onto [`RawRecord`] fields:
//!
//! | Record field | Accepted keys            |
//! |--------------|--------------------------|
//! | facility_id  | id                       |
//! | name         | name, title, bezeichnung |
//! | capacity     | capacity, total, max     |
//! | free_spaces  | free, available, frei    |
//! | trend        | trend, tendenz           |
//!
//! The first alias that parses wins. Missing or unparseable numerics default
//! to 0 and are clamped later by the sanitize step. A feature without any
//! name alias is skipped.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{RawRecord, SourceKind, Trend};

const ID_KEYS: &[&str] = &["id"];
const NAME_KEYS: &[&str] = &["name", "title", "bezeichnung"];
const CAPACITY_KEYS: &[&str] = &["capacity", "total", "max"];
const FREE_KEYS: &[&str] = &["free", "available", "frei"];
const TREND_KEYS: &[&str] = &["trend", "tendenz"];

/// Extract records from a GeoJSON-style feature collection
///
/// Features without a `properties` object or without a usable name are
/// skipped rather than failing the whole payload.
pub fn records_from_feature_collection(
    doc: &Value,
    source: SourceKind,
    captured_at: DateTime<Utc>,
) -> Vec<RawRecord> {
    let Some(features) = doc.get("features").and_then(Value::as_array) else {
        return Vec::new();
    };

    features
        .iter()
        .filter_map(|feature| {
            let props = feature.get("properties").and_then(Value::as_object)?;
            record_from_properties(props, source, captured_at)
        })
        .collect()
}

/// Map one property object onto a record, if it names a facility
pub fn record_from_properties(
    props: &Map<String, Value>,
    source: SourceKind,
    captured_at: DateTime<Utc>,
) -> Option<RawRecord> {
    let raw_name = string_field(props, NAME_KEYS)?;
    let name = html_escape::decode_html_entities(raw_name.trim()).to_string();
    if name.is_empty() {
        return None;
    }

    Some(RawRecord {
        facility_id: string_field(props, ID_KEYS),
        name,
        capacity: integer_field(props, CAPACITY_KEYS).unwrap_or(0),
        free_spaces: integer_field(props, FREE_KEYS).unwrap_or(0),
        trend: trend_field(props),
        captured_at,
        source,
    })
}

fn string_field(props: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match props.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn integer_field(props: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(parsed) = props.get(*key).and_then(integer_value) {
            return Some(parsed);
        }
    }
    None
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn trend_field(props: &Map<String, Value>) -> Option<Trend> {
    for key in TREND_KEYS {
        let trend = match props.get(*key) {
            Some(Value::Number(n)) => n.as_i64().and_then(Trend::from_indicator),
            Some(Value::String(s)) => Trend::parse(s).or_else(|| {
                s.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(Trend::from_indicator)
            }),
            _ => None,
        };
        if trend.is_some() {
            return trend;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_primary_field_names() {
        let record = record_from_properties(
            &props(json!({"id": "p-1", "name": "Parkhaus Nord", "capacity": 300, "free": 120, "trend": 1})),
            SourceKind::Scrape,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(record.facility_id.as_deref(), Some("p-1"));
        assert_eq!(record.name, "Parkhaus Nord");
        assert_eq!(record.capacity, 300);
        assert_eq!(record.free_spaces, 120);
        assert_eq!(record.trend, Some(Trend::Increasing));
    }

    #[test]
    fn test_german_field_aliases() {
        let record = record_from_properties(
            &props(json!({"bezeichnung": "Tiefgarage Rathaus", "max": 420, "frei": "55", "tendenz": -1})),
            SourceKind::GeodataApi,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(record.name, "Tiefgarage Rathaus");
        assert_eq!(record.capacity, 420);
        assert_eq!(record.free_spaces, 55);
        assert_eq!(record.trend, Some(Trend::Decreasing));
    }

    #[test]
    fn test_html_entities_decoded_in_name() {
        let record = record_from_properties(
            &props(json!({"title": "Parkhaus Sch&uuml;tzenstra&szlig;e", "total": 366, "available": 12})),
            SourceKind::Scrape,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(record.name, "Parkhaus Schützenstraße");
    }

    #[test]
    fn test_unparseable_numerics_default_to_zero() {
        let record = record_from_properties(
            &props(json!({"name": "Parkplatz Markt", "capacity": "n/a", "free": {"x": 1}})),
            SourceKind::Scrape,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(record.capacity, 0);
        assert_eq!(record.free_spaces, 0);
        assert_eq!(record.trend, None);
    }

    #[test]
    fn test_later_alias_parses_when_first_does_not() {
        let record = record_from_properties(
            &props(json!({"name": "Parkplatz Markt", "capacity": "n/a", "total": 95, "free": 40})),
            SourceKind::Scrape,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(record.capacity, 95);
    }

    #[test]
    fn test_float_capacity_rounds() {
        let record = record_from_properties(
            &props(json!({"name": "Parkdeck Ost", "capacity": 120.7, "free": 3.2})),
            SourceKind::Scrape,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(record.capacity, 121);
        assert_eq!(record.free_spaces, 3);
    }

    #[test]
    fn test_textual_trend_values() {
        let record = record_from_properties(
            &props(json!({"name": "P1", "trend": "constant"})),
            SourceKind::Scrape,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.trend, Some(Trend::Constant));

        let record = record_from_properties(
            &props(json!({"name": "P1", "tendenz": "7"})),
            SourceKind::Scrape,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.trend, None);
    }

    #[test]
    fn test_nameless_feature_skipped() {
        assert!(record_from_properties(
            &props(json!({"capacity": 100, "free": 50})),
            SourceKind::Scrape,
            Utc::now(),
        )
        .is_none());

        assert!(record_from_properties(
            &props(json!({"name": "   "})),
            SourceKind::Scrape,
            Utc::now(),
        )
        .is_none());
    }

    #[test]
    fn test_feature_collection_extraction() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "Parkhaus A", "capacity": 100, "free": 10}},
                {"type": "Feature", "properties": {"capacity": 100}},
                {"type": "Feature"},
                {"type": "Feature", "properties": {"name": "Parkhaus B", "capacity": 200, "free": 20}}
            ]
        });

        let records = records_from_feature_collection(&doc, SourceKind::Scrape, Utc::now());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Parkhaus A");
        assert_eq!(records[1].name, "Parkhaus B");
    }

    #[test]
    fn test_document_without_features() {
        let doc = json!({"type": "FeatureCollection"});
        assert!(records_from_feature_collection(&doc, SourceKind::Scrape, Utc::now()).is_empty());

        let doc = json!({"features": "not an array"});
        assert!(records_from_feature_collection(&doc, SourceKind::Scrape, Utc::now()).is_empty());
    }
}
