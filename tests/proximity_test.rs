//! Integration tests for radius/geofence queries and the R-tree index.

use chrono::{TimeZone, Utc};
use ranch_engine::alert::AlertKind;
use ranch_engine::error::Error;
use ranch_engine::geo::{
    ProximityIndex, ProximityQuery, distance_km, entities_in_geofence, entities_within_radius,
    geofence_transitions,
};
use ranch_engine::model::{Coordinate, EntityId, Geofence, LocatedEntity};

fn c(lat: f64, lon: f64) -> Coordinate {
    Coordinate::new(lat, lon).unwrap()
}

fn entity(id: &str, lat: f64, lon: f64) -> LocatedEntity {
    LocatedEntity::new(id, c(lat, lon))
}

/// Deterministic herd spread over roughly a 40 km square.
fn herd(n: usize) -> Vec<LocatedEntity> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % 1_000_000) as f64 / 1_000_000.0
    };
    (0..n)
        .map(|i| entity(&format!("cow-{i:04}"), 18.0 + next() * 0.4, -93.0 + next() * 0.4))
        .collect()
}

fn ids(hits: &[ranch_engine::geo::ProximityHit]) -> Vec<String> {
    hits.iter().map(|h| h.entity.id.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Radius
// ---------------------------------------------------------------------------

#[test]
fn radius_query_returns_exactly_the_entities_inside() {
    let center = c(18.0, -93.0);
    // Five on a ring 1 km out, five on a ring 3 km out.
    let mut entities = Vec::new();
    for i in 0..5 {
        let bearing = (i as f64) * 72.0_f64.to_radians();
        let near = 1.0 / ranch_engine::geo::KM_PER_DEGREE;
        let far = 3.0 / ranch_engine::geo::KM_PER_DEGREE;
        entities.push(entity(
            &format!("near-{i}"),
            18.0 + near * bearing.cos(),
            -93.0 + near * bearing.sin(),
        ));
        entities.push(entity(
            &format!("far-{i}"),
            18.0 + far * bearing.cos(),
            -93.0 + far * bearing.sin(),
        ));
    }

    let hits = entities_within_radius(&entities, &center, 2.0).unwrap();
    assert_eq!(hits.len(), 5);
    for hit in &hits {
        assert!(hit.entity.id.as_str().starts_with("near-"));
        assert!(hit.distance_km <= 2.0);
        let d = distance_km(&hit.entity.coordinate, &center).unwrap();
        assert!((d - hit.distance_km).abs() < 1e-12);
    }
}

#[test]
fn radius_hits_are_sorted_nearest_first_then_by_id() {
    let center = c(0.0, 0.0);
    let entities = vec![
        entity("b", 0.0, 0.01),
        entity("a", 0.0, -0.01),
        entity("c", 0.0, 0.005),
    ];
    let hits = entities_within_radius(&entities, &center, 5.0).unwrap();
    assert_eq!(ids(&hits), vec!["c", "a", "b"]);
}

#[test]
fn empty_snapshot_yields_no_hits() {
    let hits = entities_within_radius(&[], &c(0.0, 0.0), 10.0).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn invalid_entity_coordinate_fails_the_query() {
    let entities = vec![
        entity("ok", 0.0, 0.0),
        LocatedEntity::new("bad", Coordinate::unchecked(95.0, 0.0)),
    ];
    assert!(matches!(
        entities_within_radius(&entities, &c(0.0, 0.0), 1.0),
        Err(Error::InvalidCoordinate(_))
    ));
    assert!(matches!(
        ProximityIndex::build(&entities),
        Err(Error::InvalidCoordinate(_))
    ));
    assert!(matches!(
        entities_within_radius(&[], &Coordinate::unchecked(0.0, -190.0), 1.0),
        Err(Error::InvalidCoordinate(_))
    ));
}

fn scan() -> ProximityQuery {
    ProximityQuery {
        index_threshold: usize::MAX,
    }
}

fn indexed() -> ProximityQuery {
    ProximityQuery { index_threshold: 0 }
}

#[test]
fn rtree_index_matches_the_full_scan() {
    let entities = herd(600);
    let centers = [c(18.2, -92.8), c(18.05, -92.95), c(18.39, -92.61), c(17.5, -93.5)];
    for center in &centers {
        for radius in [0.0, 0.5, 2.0, 7.5, 25.0, 200.0] {
            let expected = scan().within_radius(&entities, center, radius).unwrap();
            let actual = indexed().within_radius(&entities, center, radius).unwrap();
            assert_eq!(ids(&actual), ids(&expected), "center {center}, radius {radius}");
        }
    }
}

#[test]
fn rtree_index_matches_scan_for_tight_clusters() {
    // Entities a few metres apart, queried at sub-metre and kilometre radii.
    let entities = vec![
        entity("a", 17.0, -92.0),
        entity("b", 17.000_01, -92.0),
        entity("c", 17.0, -92.000_01),
        entity("d", 17.005, -92.005),
    ];
    let center = c(17.0, -92.0);
    for radius in [0.0, 1e-9, 0.001, 0.002, 1.0] {
        let expected = scan().within_radius(&entities, &center, radius).unwrap();
        let actual = indexed().within_radius(&entities, &center, radius).unwrap();
        assert_eq!(ids(&actual), ids(&expected), "radius {radius}");
    }
    let all = indexed().within_radius(&entities, &center, 1.0).unwrap();
    assert_eq!(ids(&all), vec!["a", "c", "b", "d"]);
}

#[test]
fn rtree_index_matches_scan_at_the_edges_of_the_map() {
    let entities = vec![
        entity("pole", 90.0, 0.0),
        entity("near-pole", 89.99, 135.0),
        entity("south", -90.0, 45.0),
        entity("date-line-east", 10.0, 180.0),
        entity("date-line-west", 10.0, -180.0),
        entity("origin", 0.0, 0.0),
    ];
    let centers = [c(90.0, -60.0), c(-89.999, 0.0), c(10.0, 179.999), c(0.0, 0.0)];
    for center in &centers {
        for radius in [0.0, 0.5, 5.0, 50.0] {
            let expected = scan().within_radius(&entities, center, radius).unwrap();
            let actual = indexed().within_radius(&entities, center, radius).unwrap();
            assert_eq!(ids(&actual), ids(&expected), "center {center}, radius {radius}");
        }
    }
}

#[test]
fn rtree_index_falls_back_near_the_antimeridian() {
    let entities = vec![
        entity("east", 0.0, 179.99),
        entity("west", 0.0, -179.99),
        entity("far", 0.0, 170.0),
    ];
    let index = ProximityIndex::build(&entities).unwrap();
    let hits = index.within_radius(&c(0.0, 180.0), 5.0).unwrap();
    let mut found = ids(&hits);
    found.sort();
    assert_eq!(found, vec!["east", "west"]);
}

#[test]
fn nearest_returns_k_closest() {
    let entities = herd(100);
    let index = ProximityIndex::build(&entities).unwrap();
    assert_eq!(index.len(), 100);

    let center = c(18.2, -92.8);
    let nearest = index.nearest(&center, 3).unwrap();
    assert_eq!(nearest.len(), 3);

    let all = index.within_radius(&center, 1000.0).unwrap();
    assert_eq!(ids(&nearest), ids(&all[..3]));
}

#[test]
fn empty_index_answers_every_query() {
    let index = ProximityIndex::build(&[]).unwrap();
    assert!(index.is_empty());
    assert!(index.within_radius(&c(0.0, 0.0), 10.0).unwrap().is_empty());
    assert!(index.nearest(&c(0.0, 0.0), 3).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Geofence
// ---------------------------------------------------------------------------

#[test]
fn circle_geofence_contains_the_pasture_example() {
    let entities = vec![entity("cow-1", 17.9880, -92.9320), entity("cow-2", 17.9990, -92.9303)];
    let fence = Geofence::circle("north", "North pasture", c(17.9869, -92.9303), 0.5);

    let inside = entities_in_geofence(&entities, &fence).unwrap();
    assert!(inside.contains(&EntityId::from("cow-1")));
    assert!(!inside.contains(&EntityId::from("cow-2")));
}

#[test]
fn polygon_geofence_rtree_matches_scan() {
    let entities = herd(500);
    let fence = Geofence::polygon(
        "creek",
        "Creek paddock",
        vec![
            c(18.05, -92.95),
            c(18.05, -92.70),
            c(18.30, -92.70),
            c(18.15, -92.80),
            c(18.30, -92.95),
        ],
    );
    let expected = scan().in_geofence(&entities, &fence).unwrap();
    let actual = indexed().in_geofence(&entities, &fence).unwrap();
    assert!(!expected.is_empty());
    assert_eq!(actual, expected);
}

#[test]
fn polygon_geofence_counts_vertices_and_edges_as_inside() {
    let entities = vec![
        entity("vertex", 18.0, -93.0),
        entity("edge", 18.0, -92.95),
        entity("interior", 18.05, -92.95),
        entity("outside", 18.2, -92.95),
    ];
    let fence = Geofence::polygon(
        "square",
        "Square paddock",
        vec![c(18.0, -93.0), c(18.0, -92.9), c(18.1, -92.9), c(18.1, -93.0)],
    );
    for query in [scan(), indexed()] {
        let inside = query.in_geofence(&entities, &fence).unwrap();
        let found: Vec<&str> = inside.iter().map(|id| id.as_str()).collect();
        assert_eq!(found, vec!["edge", "interior", "vertex"]);
    }
}

#[test]
fn malformed_geofences_are_rejected() {
    let entities = vec![entity("cow-1", 0.0, 0.0)];

    let zero_radius = Geofence::circle("z", "Zero", c(0.0, 0.0), 0.0);
    assert!(matches!(
        entities_in_geofence(&entities, &zero_radius),
        Err(Error::InvalidGeofence(_))
    ));

    let line = Geofence::polygon("l", "Line", vec![c(0.0, 0.0), c(1.0, 1.0)]);
    let err = entities_in_geofence(&entities, &line).unwrap_err();
    assert!(matches!(err, Error::InvalidGeofence(ref msg) if msg.contains("geofence l")));

    let bad_center = Geofence::circle("b", "Bad", Coordinate::unchecked(-100.0, 0.0), 1.0);
    assert!(matches!(
        entities_in_geofence(&entities, &bad_center),
        Err(Error::InvalidCoordinate(_))
    ));
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[test]
fn transitions_report_entries_and_exits() {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let fence = Geofence::circle("pen", "Holding pen", c(0.0, 0.0), 1.0)
        .alert_on_entry(true)
        .alert_on_exit(true);

    let previous = vec![
        entity("stays-in", 0.0, 0.001),
        entity("leaves", 0.0, 0.002),
        entity("arrives", 0.0, 0.5),
        entity("gone", 0.0, 0.001),
    ];
    let current = vec![
        entity("stays-in", 0.0, 0.0015),
        entity("leaves", 0.0, 0.5),
        entity("arrives", 0.0, 0.003),
        entity("new", 0.0, 0.0),
    ];

    let alerts = geofence_transitions(&[fence], &previous, &current, now).unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.timestamp == now));
    assert!(alerts.iter().any(|a| matches!(
        &a.kind,
        AlertKind::GeofenceEntered { entity_id, .. } if entity_id.as_str() == "arrives"
    )));
    assert!(alerts.iter().any(|a| matches!(
        &a.kind,
        AlertKind::GeofenceExited { entity_id, .. } if entity_id.as_str() == "leaves"
    )));
}

#[test]
fn transitions_respect_flags_and_active() {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let previous = vec![entity("cow", 0.0, 0.5)];
    let current = vec![entity("cow", 0.0, 0.0)];

    let exit_only = Geofence::circle("a", "A", c(0.0, 0.0), 1.0).alert_on_exit(true);
    let disabled = Geofence::circle("b", "B", c(0.0, 0.0), 1.0)
        .alert_on_entry(true)
        .inactive();
    let alerts = geofence_transitions(&[exit_only, disabled], &previous, &current, now).unwrap();
    assert!(alerts.is_empty());
}
