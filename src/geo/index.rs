//! Radius and geofence queries over an entity snapshot.
//!
//! Small snapshots are scanned directly. Larger ones go through a
//! [`ProximityIndex`]: an R-tree of `[lat, lon]` points built once per query
//! batch. The tree only prunes candidates to a bounding envelope; every hit
//! is confirmed with the exact haversine distance or polygon test, so
//! indexed results always equal the full scan.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use geo::Polygon;
use opentelemetry::KeyValue;
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BoundingBox, check_radius, haversine_km, polygon_covers, ring_polygon};
use crate::alert::{Alert, AlertKind};
use crate::error::Result;
use crate::model::{Coordinate, EntityId, Geofence, GeofenceShape, LocatedEntity};
use crate::telemetry::{metrics, spans};

/// Snapshot size from which queries build an R-tree instead of scanning.
pub const DEFAULT_INDEX_THRESHOLD: usize = 256;

/// One radius query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityHit {
    pub entity: LocatedEntity,
    pub distance_km: f64,
}

// ---------------------------------------------------------------------------
// Query settings
// ---------------------------------------------------------------------------

/// How queries choose between a direct scan and an R-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProximityQuery {
    pub index_threshold: usize,
}

impl Default for ProximityQuery {
    fn default() -> Self {
        Self {
            index_threshold: DEFAULT_INDEX_THRESHOLD,
        }
    }
}

impl ProximityQuery {
    /// Entities within `radius_km` of `center`, nearest first, ties by id.
    pub fn within_radius(
        &self,
        entities: &[LocatedEntity],
        center: &Coordinate,
        radius_km: f64,
    ) -> Result<Vec<ProximityHit>> {
        center.validate()?;
        check_radius(radius_km)?;
        let _span = spans::start_proximity_span("radius", entities.len()).entered();

        if entities.len() >= self.index_threshold {
            record_query("radius", "rtree");
            ProximityIndex::build(entities)?.within_radius(center, radius_km)
        } else {
            record_query("radius", "scan");
            let mut hits = Vec::new();
            for entity in entities {
                entity.coordinate.validate()?;
                let distance_km = haversine_km(&entity.coordinate, center);
                if distance_km <= radius_km {
                    hits.push(ProximityHit {
                        entity: entity.clone(),
                        distance_km,
                    });
                }
            }
            sort_hits(&mut hits);
            Ok(hits)
        }
    }

    /// Ids of entities inside `fence`.
    pub fn in_geofence(
        &self,
        entities: &[LocatedEntity],
        fence: &Geofence,
    ) -> Result<BTreeSet<EntityId>> {
        let region = Region::of(fence)?;
        let _span = spans::start_proximity_span("geofence", entities.len()).entered();

        if entities.len() >= self.index_threshold {
            record_query("geofence", "rtree");
            return ProximityIndex::build(entities)?.in_region(&region);
        }

        record_query("geofence", "scan");
        let mut inside = BTreeSet::new();
        for entity in entities {
            entity.coordinate.validate()?;
            if region.contains(&entity.coordinate) {
                inside.insert(entity.id.clone());
            }
        }
        Ok(inside)
    }
}

/// Entities within `radius_km` of `center` using default query settings.
pub fn entities_within_radius(
    entities: &[LocatedEntity],
    center: &Coordinate,
    radius_km: f64,
) -> Result<Vec<ProximityHit>> {
    ProximityQuery::default().within_radius(entities, center, radius_km)
}

/// Ids of entities inside `fence` using default query settings.
pub fn entities_in_geofence(
    entities: &[LocatedEntity],
    fence: &Geofence,
) -> Result<BTreeSet<EntityId>> {
    ProximityQuery::default().in_geofence(entities, fence)
}

/// Entry/exit alerts between two snapshots of the same entities.
///
/// Only active fences with the matching alert flag produce alerts, and only
/// entities present in both snapshots are compared.
pub fn geofence_transitions(
    fences: &[Geofence],
    previous: &[LocatedEntity],
    current: &[LocatedEntity],
    now: DateTime<Utc>,
) -> Result<Vec<Alert>> {
    let previous_ids: BTreeSet<&EntityId> = previous.iter().map(|e| &e.id).collect();
    let current_ids: BTreeSet<&EntityId> = current.iter().map(|e| &e.id).collect();

    let query = ProximityQuery::default();
    let mut alerts = Vec::new();
    for fence in fences.iter().filter(|f| f.active) {
        if !fence.alert_on_entry && !fence.alert_on_exit {
            continue;
        }
        let before = query.in_geofence(previous, fence)?;
        let after = query.in_geofence(current, fence)?;

        if fence.alert_on_entry {
            for id in after.difference(&before) {
                if previous_ids.contains(id) {
                    alerts.push(Alert::new(
                        AlertKind::GeofenceEntered {
                            fence_id: fence.id.clone(),
                            fence_name: fence.name.clone(),
                            entity_id: id.clone(),
                        },
                        now,
                    ));
                }
            }
        }
        if fence.alert_on_exit {
            for id in before.difference(&after) {
                if current_ids.contains(id) {
                    alerts.push(Alert::new(
                        AlertKind::GeofenceExited {
                            fence_id: fence.id.clone(),
                            fence_name: fence.name.clone(),
                            entity_id: id.clone(),
                        },
                        now,
                    ));
                }
            }
        }
    }

    debug!(fences = fences.len(), alerts = alerts.len(), "geofence transitions evaluated");
    Ok(alerts)
}

// ---------------------------------------------------------------------------
// Fence regions
// ---------------------------------------------------------------------------

/// A validated fence shape, prepared once per query.
enum Region {
    Circle { center: Coordinate, radius_km: f64 },
    Polygon { polygon: Polygon<f64>, bbox: BoundingBox },
}

impl Region {
    fn of(fence: &Geofence) -> Result<Self> {
        fence.validate()?;
        Ok(match &fence.shape {
            GeofenceShape::Circle { center, radius_km } => Region::Circle {
                center: *center,
                radius_km: *radius_km,
            },
            GeofenceShape::Polygon { ring } => Region::Polygon {
                polygon: ring_polygon(ring)?,
                bbox: BoundingBox::of_ring(ring)?,
            },
        })
    }

    fn contains(&self, p: &Coordinate) -> bool {
        match self {
            Region::Circle { center, radius_km } => haversine_km(p, center) <= *radius_km,
            Region::Polygon { polygon, .. } => polygon_covers(polygon, p),
        }
    }
}

// ---------------------------------------------------------------------------
// R-tree index
// ---------------------------------------------------------------------------

/// Snapshot position in `[lat, lon]` order, pointing back into the slice.
#[derive(Debug, Clone, Copy)]
struct IndexedEntity {
    idx: usize,
    lat: f64,
    lon: f64,
}

impl RTreeObject for IndexedEntity {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lon])
    }
}

/// R-tree over a validated snapshot. Borrowed; lives for one query batch.
pub struct ProximityIndex<'a> {
    entities: &'a [LocatedEntity],
    tree: RTree<IndexedEntity>,
}

impl<'a> ProximityIndex<'a> {
    /// Validate every coordinate and bulk-load the tree.
    pub fn build(entities: &'a [LocatedEntity]) -> Result<Self> {
        let mut points = Vec::with_capacity(entities.len());
        for (idx, entity) in entities.iter().enumerate() {
            entity.coordinate.validate()?;
            points.push(IndexedEntity {
                idx,
                lat: entity.coordinate.latitude,
                lon: entity.coordinate.longitude,
            });
        }
        let tree = RTree::bulk_load(points);

        debug!(entities = entities.len(), "proximity index built");
        Ok(Self { entities, tree })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities within `radius_km` of `center`, nearest first, ties by id.
    pub fn within_radius(&self, center: &Coordinate, radius_km: f64) -> Result<Vec<ProximityHit>> {
        center.validate()?;
        check_radius(radius_km)?;

        let candidates = match BoundingBox::around(center, radius_km)? {
            Some(bbox) => self.candidates_in(&bbox),
            None => (0..self.entities.len()).collect(),
        };

        let mut hits: Vec<ProximityHit> = candidates
            .into_iter()
            .filter_map(|i| {
                let entity = &self.entities[i];
                let distance_km = haversine_km(&entity.coordinate, center);
                (distance_km <= radius_km).then(|| ProximityHit {
                    entity: entity.clone(),
                    distance_km,
                })
            })
            .collect();
        sort_hits(&mut hits);
        Ok(hits)
    }

    /// The `k` nearest entities to `center`, same ordering as radius queries.
    pub fn nearest(&self, center: &Coordinate, k: usize) -> Result<Vec<ProximityHit>> {
        center.validate()?;
        let mut hits: Vec<ProximityHit> = self
            .entities
            .iter()
            .map(|entity| ProximityHit {
                entity: entity.clone(),
                distance_km: haversine_km(&entity.coordinate, center),
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    /// Ids of entities inside `fence`.
    pub fn in_geofence(&self, fence: &Geofence) -> Result<BTreeSet<EntityId>> {
        self.in_region(&Region::of(fence)?)
    }

    fn in_region(&self, region: &Region) -> Result<BTreeSet<EntityId>> {
        match region {
            Region::Circle { center, radius_km } => Ok(self
                .within_radius(center, *radius_km)?
                .into_iter()
                .map(|hit| hit.entity.id)
                .collect()),
            Region::Polygon { polygon, bbox } => Ok(self
                .candidates_in(bbox)
                .into_iter()
                .map(|i| &self.entities[i])
                .filter(|entity| polygon_covers(polygon, &entity.coordinate))
                .map(|entity| entity.id.clone())
                .collect()),
        }
    }

    /// Indices of entities whose position lies in `bbox` (bounds inclusive).
    fn candidates_in(&self, bbox: &BoundingBox) -> Vec<usize> {
        let envelope = AABB::from_corners(
            [bbox.min_lat, bbox.min_lon],
            [bbox.max_lat, bbox.max_lon],
        );
        self.tree
            .locate_in_envelope(&envelope)
            .map(|point| point.idx)
            .collect()
    }
}

fn sort_hits(hits: &mut [ProximityHit]) {
    hits.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.entity.id.cmp(&b.entity.id))
    });
}

fn record_query(query: &'static str, strategy: &'static str) {
    metrics::proximity_queries().add(
        1,
        &[
            KeyValue::new("query", query),
            KeyValue::new("strategy", strategy),
        ],
    );
}
