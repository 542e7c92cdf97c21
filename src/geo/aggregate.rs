//! Density grids and movement statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{KM_PER_DEGREE, haversine_km};
use crate::error::{Error, Result};
use crate::model::{Coordinate, EntityId, LocatedEntity};

// ---------------------------------------------------------------------------
// Density grid
// ---------------------------------------------------------------------------

/// Smallest accepted cell edge (one metre). Keeps cell indices far from `i64` limits.
pub const MIN_CELL_SIZE_KM: f64 = 0.001;

/// Grid cell key: `floor(lat / deg)`, `floor(lon / deg)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub row: i64,
    pub col: i64,
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.row, self.col)
    }
}

/// Entity counts per fixed-size cell, for heatmap rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    pub cell_size_km: f64,
    pub cells: BTreeMap<CellKey, usize>,
}

/// One populated cell, flattened for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityCell {
    pub key: CellKey,
    pub center: Coordinate,
    pub count: usize,
}

impl DensityGrid {
    fn cell_deg(&self) -> f64 {
        self.cell_size_km / KM_PER_DEGREE
    }

    pub fn total(&self) -> usize {
        self.cells.values().sum()
    }

    pub fn count(&self, key: &CellKey) -> usize {
        self.cells.get(key).copied().unwrap_or(0)
    }

    /// Centre of a cell. Edge cells are pulled back inside the valid range.
    pub fn cell_center(&self, key: &CellKey) -> Coordinate {
        let deg = self.cell_deg();
        Coordinate::unchecked(
            ((key.row as f64 + 0.5) * deg).clamp(-90.0, 90.0),
            ((key.col as f64 + 0.5) * deg).clamp(-180.0, 180.0),
        )
    }

    /// The `n` busiest cells, highest count first, ties by key.
    pub fn hotspots(&self, n: usize) -> Vec<(CellKey, usize)> {
        let mut cells: Vec<(CellKey, usize)> = self.cells.iter().map(|(k, v)| (*k, *v)).collect();
        cells.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        cells.truncate(n);
        cells
    }

    pub fn to_cells(&self) -> Vec<DensityCell> {
        self.cells
            .iter()
            .map(|(key, count)| DensityCell {
                key: *key,
                center: self.cell_center(key),
                count: *count,
            })
            .collect()
    }
}

/// Bucket entities into square cells of `cell_size_km` (measured in latitude).
pub fn density_grid(entities: &[LocatedEntity], cell_size_km: f64) -> Result<DensityGrid> {
    if !cell_size_km.is_finite() || cell_size_km < MIN_CELL_SIZE_KM {
        return Err(Error::InvalidArgument(format!(
            "cell size must be at least {MIN_CELL_SIZE_KM} km, got {cell_size_km}"
        )));
    }
    let deg = cell_size_km / KM_PER_DEGREE;

    let mut cells = BTreeMap::new();
    for entity in entities {
        entity.coordinate.validate()?;
        let key = CellKey {
            row: (entity.coordinate.latitude / deg).floor() as i64,
            col: (entity.coordinate.longitude / deg).floor() as i64,
        };
        *cells.entry(key).or_insert(0) += 1;
    }

    Ok(DensityGrid {
        cell_size_km,
        cells,
    })
}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

/// Coarse activity derived from average speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    #[default]
    Resting,
    Grazing,
    Walking,
    Running,
}

impl ActivityLevel {
    pub fn from_speed_kmh(speed: f64) -> Self {
        if speed < 0.05 {
            ActivityLevel::Resting
        } else if speed < 0.5 {
            ActivityLevel::Grazing
        } else if speed < 4.0 {
            ActivityLevel::Walking
        } else {
            ActivityLevel::Running
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementStats {
    /// Sum of consecutive legs, not displacement.
    pub total_distance_km: f64,
    pub average_speed_kmh: f64,
    pub max_displacement_km: f64,
    pub activity: ActivityLevel,
}

/// Statistics over an ordered path of timestamped samples.
///
/// Fewer than two samples yields all-zero stats. Speed is total distance
/// over the minutes elapsed between the first and last sample; a
/// non-positive elapsed time yields zero speed.
pub fn movement_stats(path: &[(Coordinate, DateTime<Utc>)]) -> Result<MovementStats> {
    for (coordinate, _) in path {
        coordinate.validate()?;
    }
    let (Some((first, started)), Some((_, ended))) = (path.first(), path.last()) else {
        return Ok(MovementStats::default());
    };
    if path.len() < 2 {
        return Ok(MovementStats::default());
    }

    let total_distance_km: f64 = path
        .windows(2)
        .map(|leg| haversine_km(&leg[0].0, &leg[1].0))
        .sum();
    let max_displacement_km = path
        .iter()
        .map(|(p, _)| haversine_km(first, p))
        .fold(0.0, f64::max);

    let elapsed_minutes = (*ended - *started).num_seconds() as f64 / 60.0;
    let average_speed_kmh = if elapsed_minutes > 0.0 {
        total_distance_km / (elapsed_minutes / 60.0)
    } else {
        0.0
    };

    Ok(MovementStats {
        total_distance_km,
        average_speed_kmh,
        max_displacement_km,
        activity: ActivityLevel::from_speed_kmh(average_speed_kmh),
    })
}

/// A position report for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub entity_id: EntityId,
    pub coordinate: Coordinate,
    pub at: DateTime<Utc>,
}

/// Group reports per entity, order each track by time, and compute stats.
pub fn movement_by_entity(points: &[TrackPoint]) -> Result<BTreeMap<EntityId, MovementStats>> {
    let mut tracks: BTreeMap<EntityId, Vec<(Coordinate, DateTime<Utc>)>> = BTreeMap::new();
    for point in points {
        tracks
            .entry(point.entity_id.clone())
            .or_default()
            .push((point.coordinate, point.at));
    }

    let mut stats = BTreeMap::new();
    for (entity_id, mut track) in tracks {
        track.sort_by_key(|(_, at)| *at);
        stats.insert(entity_id, movement_stats(&track)?);
    }
    Ok(stats)
}
