//! End-to-end: JSON snapshots on disk through queries and expansion.

use chrono::{TimeZone, Utc};
use serde_json::json;

use ranch_engine::config::EngineConfig;
use ranch_engine::engine::{MemorySink, SchedulingCoordinator};
use ranch_engine::model::{Geofence, LocatedEntity, ScheduledEvent};

async fn write_json(dir: &tempfile::TempDir, name: &str, value: serde_json::Value) -> String {
    let path = dir.path().join(name);
    tokio::fs::write(&path, serde_json::to_vec(&value).unwrap())
        .await
        .unwrap();
    tokio::fs::read_to_string(&path).await.unwrap()
}

#[tokio::test]
async fn snapshot_files_drive_queries_and_expansion() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::from_toml_str("index_threshold = 1\noccurrence_cap = 10").unwrap();

    let entities = write_json(
        &dir,
        "entities.json",
        json!([
            { "id": "cow-1", "coordinate": { "latitude": 17.9880, "longitude": -92.9320 } },
            { "id": "cow-2", "coordinate": { "latitude": 17.9990, "longitude": -92.9303 },
              "status": "sold" }
        ]),
    )
    .await;
    let fence = write_json(
        &dir,
        "fence.json",
        json!({
            "id": "north",
            "name": "North pasture",
            "shape": {
                "type": "circle",
                "center": { "latitude": 17.9869, "longitude": -92.9303 },
                "radius_km": 0.5
            }
        }),
    )
    .await;
    let event = write_json(
        &dir,
        "event.json",
        json!({
            "id": "6f1c2a8e-5b7d-4c3a-9e2f-0a1b2c3d4e5f",
            "subject_id": "cow-1",
            "category": "vaccination",
            "title": "Booster",
            "scheduled_at": "2025-01-15T09:00:00Z",
            "status": "SCHEDULED",
            "recurrence": { "type": "WEEKLY", "interval": 2, "max_occurrences": 3 },
            "location": { "latitude": 17.9869, "longitude": -92.9303 }
        }),
    )
    .await;

    let entities: Vec<LocatedEntity> = serde_json::from_str(&entities).unwrap();
    let fence: Geofence = serde_json::from_str(&fence).unwrap();
    let event: ScheduledEvent = serde_json::from_str(&event).unwrap();

    let inside = config.proximity().in_geofence(&entities, &fence).unwrap();
    assert_eq!(inside.len(), 1);

    let coordinator = SchedulingCoordinator::new(config.coordinator());
    let mut sink = MemorySink::new();
    let report = coordinator.expand_event(&event, &mut sink).unwrap();
    assert!(report.is_complete());
    let dates: Vec<_> = sink.events.iter().map(|e| e.scheduled_at).collect();
    assert_eq!(
        dates,
        vec![
            Utc.with_ymd_and_hms(2025, 1, 29, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 2, 12, 9, 0, 0).unwrap(),
        ]
    );
}
