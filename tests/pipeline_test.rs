//! End-to-end pipeline tests
//!
//! These tests drive the full acquisition pipeline: live adapters against
//! wiremock servers, deduplication, registry resolution, snapshot caching
//! and the read API.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use parkpulse::api::{create_router, AppState};
use parkpulse::cache::SnapshotStore;
use parkpulse::config::Config;
use parkpulse::models::{DemandProfile, Facility, SourceKind, Trend};
use parkpulse::registry::Registry;
use parkpulse::scheduler::AcquisitionService;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scrape_config(url: String) -> Config {
    let mut config = Config::default();
    config.sources.scrape_urls = vec![url];
    config.sources.artifact_path = None;
    config.simulation.seed = Some(99);
    config
}

fn catalog_facility(id: &str, name: &str, capacity: u32) -> Facility {
    Facility {
        id: id.to_string(),
        name: name.to_string(),
        longitude: 9.22,
        latitude: 48.89,
        capacity,
        demand_profile: DemandProfile::Mixed,
    }
}

fn feed_with_free(free: u32) -> serde_json::Value {
    serde_json::json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"name": "Parkhaus Schützenstraße", "capacity": 366, "free": free}
            }
        ]
    })
}

/// Test that failing live sources fall through to simulated occupancy,
/// cached as fresh
#[tokio::test]
async fn test_dead_sources_fall_back_to_simulation() {
    let mock_server = MockServer::start().await;

    // Both live adapters are in the chain and both must be polled once
    Mock::given(method("GET"))
        .and(path("/parken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/geodaten"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = scrape_config(format!("{}/parken", mock_server.uri()));
    config.sources.geodata_urls = vec![format!("{}/geodaten", mock_server.uri())];
    let registry = Arc::new(Registry::new(vec![
        catalog_facility("p-schuetzenstrasse", "Parkhaus Schützenstraße", 366),
        catalog_facility("p-rathaus", "Tiefgarage Rathaus", 420),
        catalog_facility("p-bahnhof", "Parkplatz am Bahnhof", 255),
    ]));
    let store = Arc::new(SnapshotStore::new(Duration::from_secs(7200)));
    let service = AcquisitionService::new(&config, registry, Arc::clone(&store)).unwrap();

    let bundle = service.acquire_cycle().await;

    assert_eq!(bundle.source, SourceKind::Simulation);
    assert_eq!(bundle.len(), 3);

    let mut capacities: Vec<u32> = bundle.entries.iter().map(|e| e.capacity).collect();
    capacities.sort_unstable();
    assert_eq!(capacities, vec![255, 366, 420]);

    for entry in &bundle.entries {
        assert!(entry.free_spaces <= entry.capacity);
        assert!(
            (9..=96).contains(&entry.occupancy_rate),
            "synthesized occupancy should stay inside the clamp band: {}",
            entry.occupancy_rate
        );
    }

    // The synthesized bundle lands in the cache as fresh as a live one
    let reading = store.read().await.unwrap();
    assert!(!reading.is_stale);
    assert_eq!(reading.bundle.captured_at, bundle.captured_at);
}

/// Test duplicate spellings collapse to one catalog entry through a real scrape
#[tokio::test]
async fn test_duplicate_spellings_merge_through_cycle() {
    let mock_server = MockServer::start().await;
    let html = r#"<html><body>
<script>
  var data = {"type": "FeatureCollection", "features": [
    {"type": "Feature", "properties": {"name": "Parkhaus Schützenstraße", "capacity": 366, "free": 98}},
    {"type": "Feature", "properties": {"name": "Parkhaus Schuetzenstrasse", "capacity": 360, "free": 95}}
  ]};
</script>
</body></html>"#;

    Mock::given(method("GET"))
        .and(path("/parken"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&mock_server)
        .await;

    let config = scrape_config(format!("{}/parken", mock_server.uri()));
    let registry = Arc::new(Registry::builtin());
    let store = Arc::new(SnapshotStore::new(Duration::from_secs(7200)));
    let service = AcquisitionService::new(&config, registry, store).unwrap();

    let bundle = service.acquire_cycle().await;

    assert_eq!(bundle.len(), 1);
    let entry = bundle.entry_for("p-schuetzenstrasse").unwrap();
    assert_eq!(entry.capacity, 366);
    assert_eq!(entry.free_spaces, 98);
    assert_eq!(entry.occupancy_rate, 73);
}

/// Test trend derivation across two live cycles
#[tokio::test]
async fn test_trend_derived_across_cycles() {
    let mock_server = MockServer::start().await;

    // First cycle sees 200 free spaces, the second only 150
    Mock::given(method("GET"))
        .and(path("/parken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_with_free(200)))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/parken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_with_free(150)))
        .mount(&mock_server)
        .await;

    let config = scrape_config(format!("{}/parken", mock_server.uri()));
    let registry = Arc::new(Registry::builtin());
    let store = Arc::new(SnapshotStore::new(Duration::from_secs(7200)));
    let service = AcquisitionService::new(&config, registry, store).unwrap();

    let first = service.acquire_cycle().await;
    assert_eq!(
        first.entry_for("p-schuetzenstrasse").unwrap().trend,
        Trend::Constant
    );

    let second = service.acquire_cycle().await;
    let entry = second.entry_for("p-schuetzenstrasse").unwrap();
    assert_eq!(entry.free_spaces, 150);
    assert_eq!(entry.trend, Trend::Increasing);
}

/// Test that a persisted snapshot survives a restart
#[tokio::test]
async fn test_snapshot_survives_restart() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/parken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_with_free(120)))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("snapshot.json");

    let config = scrape_config(format!("{}/parken", mock_server.uri()));
    let registry = Arc::new(Registry::builtin());

    // First run acquires and persists
    {
        let store = Arc::new(SnapshotStore::with_file(
            &snapshot_path,
            Duration::from_secs(7200),
        ));
        let service =
            AcquisitionService::new(&config, Arc::clone(&registry), Arc::clone(&store)).unwrap();
        let bundle = service.acquire_cycle().await;
        assert_eq!(bundle.len(), 1);
    }

    // Second run restores from disk without acquiring
    let store = SnapshotStore::with_file(&snapshot_path, Duration::from_secs(7200));
    assert!(store.load().await);

    let reading = store.read().await.unwrap();
    assert!(!reading.is_stale);
    let entry = reading.bundle.entry_for("p-schuetzenstrasse").unwrap();
    assert_eq!(entry.free_spaces, 120);
    assert_eq!(entry.source, SourceKind::Scrape);
}

/// Test that an old persisted snapshot is served but flagged stale
#[tokio::test]
async fn test_old_snapshot_flagged_stale() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("snapshot.json");

    // Persist a bundle, then age it by rewriting its capture time
    let store = Arc::new(SnapshotStore::with_file(
        &snapshot_path,
        Duration::from_secs(7200),
    ));
    let registry = Arc::new(Registry::builtin());
    let config = Config {
        simulation: parkpulse::sources::SimulationProfile {
            seed: Some(5),
            ..Default::default()
        },
        ..Default::default()
    };
    let service =
        AcquisitionService::new(&config, Arc::clone(&registry), Arc::clone(&store)).unwrap();
    let bundle = service.acquire_cycle().await;

    let mut aged = (*bundle).clone();
    aged.captured_at = chrono::Utc::now() - chrono::Duration::hours(3);
    tokio::fs::write(&snapshot_path, aged.to_json_pretty().unwrap())
        .await
        .unwrap();

    // A fresh process restores the aged bundle
    let restarted = Arc::new(SnapshotStore::with_file(
        &snapshot_path,
        Duration::from_secs(7200),
    ));
    assert!(restarted.load().await);

    let reading = restarted.read().await.unwrap();
    assert!(reading.is_stale);
    assert!(reading.age.num_minutes() >= 179);

    // The report keeps serving the stale bundle instead of dropping it
    let service = AcquisitionService::new(&config, registry, restarted).unwrap();
    let report = service.snapshot_report().await;
    assert!(report.cache_info.is_stale);
    assert_eq!(report.facilities.len(), bundle.len());
}

/// Test concurrent cold-start requests share a single upstream fetch
#[tokio::test]
async fn test_concurrent_cold_start_shares_one_fetch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/parken"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(feed_with_free(80))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1) // All concurrent requests must share this one fetch
        .mount(&mock_server)
        .await;

    let config = scrape_config(format!("{}/parken", mock_server.uri()));
    let registry = Arc::new(Registry::builtin());
    let store = Arc::new(SnapshotStore::new(Duration::from_secs(7200)));
    let service = Arc::new(AcquisitionService::new(&config, registry, store).unwrap());
    let state = AppState::new(service);
    let router = create_router(state);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            router
                .oneshot(
                    Request::builder()
                        .uri("/api/occupancy")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"]["cache_info"]["source"], "scrape");
        assert_eq!(json["data"]["facilities"][0]["free_spaces"], 80);
    }
}
