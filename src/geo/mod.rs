//! Geographic math: great-circle distance and containment tests.
//!
//! Every public function validates its coordinates first and fails with
//! `InvalidCoordinate` instead of clamping. Polygon containment is delegated
//! to `geo` in the planar longitude/latitude plane; points on an edge or
//! vertex count as inside.
//!
//! Distances stay on a hand-written haversine: `geo::Haversine` uses the
//! 6371.0088 km mean radius, and every distance here is defined on 6371 km.

pub mod aggregate;
pub mod index;

pub use aggregate::{
    ActivityLevel, CellKey, DensityCell, DensityGrid, MIN_CELL_SIZE_KM, MovementStats, TrackPoint,
    density_grid, movement_by_entity, movement_stats,
};
pub use index::{
    ProximityHit, ProximityIndex, ProximityQuery, entities_in_geofence, entities_within_radius,
    geofence_transitions,
};

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{Bearing, Coord, Haversine, LineString, Point, Polygon};

use crate::error::{Error, Result};
use crate::model::{Coordinate, validate_ring};

/// Mean Earth radius used for every distance computation.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Length of one degree of latitude (and of longitude at the equator).
pub const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// Slack added to bounding boxes, in degrees (about 0.1 mm).
const EDGE_EPSILON_DEG: f64 = 1e-9;

/// Great-circle distance in kilometers (haversine).
pub fn distance_km(a: &Coordinate, b: &Coordinate) -> Result<f64> {
    a.validate()?;
    b.validate()?;
    Ok(haversine_km(a, b))
}

/// Haversine on coordinates the caller already validated.
pub(crate) fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// True iff `p` lies within `radius_km` of `center` (boundary inclusive).
pub fn point_in_circle(p: &Coordinate, center: &Coordinate, radius_km: f64) -> Result<bool> {
    check_radius(radius_km)?;
    Ok(distance_km(p, center)? <= radius_km)
}

/// Containment over an implicitly closed ring. Edges and vertices count as inside.
pub fn point_in_polygon(p: &Coordinate, ring: &[Coordinate]) -> Result<bool> {
    p.validate()?;
    let polygon = ring_polygon(ring)?;
    Ok(polygon_covers(&polygon, p))
}

pub(crate) fn check_radius(radius_km: f64) -> Result<()> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "radius must be a non-negative number of kilometers, got {radius_km}"
        )));
    }
    Ok(())
}

/// Validate a ring and close it into a planar polygon (x = lon, y = lat).
pub(crate) fn ring_polygon(ring: &[Coordinate]) -> Result<Polygon<f64>> {
    validate_ring(ring)?;
    let exterior: LineString<f64> = ring.iter().map(|v| (v.longitude, v.latitude)).collect();
    Ok(Polygon::new(exterior, Vec::new()))
}

/// Anything but `Outside` is a hit.
pub(crate) fn polygon_covers(polygon: &Polygon<f64>, p: &Coordinate) -> bool {
    let coord = Coord {
        x: p.longitude,
        y: p.latitude,
    };
    polygon.coordinate_position(&coord) != CoordPos::Outside
}

/// Initial compass bearing from `a` towards `b`, in degrees `[0, 360)`.
pub fn initial_bearing_deg(a: &Coordinate, b: &Coordinate) -> Result<f64> {
    a.validate()?;
    b.validate()?;
    let bearing = Haversine::bearing(
        Point::new(a.longitude, a.latitude),
        Point::new(b.longitude, b.latitude),
    );
    Ok(bearing.rem_euclid(360.0))
}

// ---------------------------------------------------------------------------
// Bounding box
// ---------------------------------------------------------------------------

/// Axis-aligned box in degrees. Never wraps the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Box containing every point within `radius_km` of `center`.
    ///
    /// Returns `None` when such a box would touch a pole or the
    /// antimeridian; callers fall back to a full scan in that case.
    pub fn around(center: &Coordinate, radius_km: f64) -> Result<Option<Self>> {
        center.validate()?;
        check_radius(radius_km)?;

        let d_lat = radius_km / KM_PER_DEGREE + EDGE_EPSILON_DEG;
        let max_abs_lat = center.latitude.abs() + d_lat;
        if max_abs_lat >= 90.0 {
            return Ok(None);
        }

        // hav(d) >= cos(phi1) cos(phi2) hav(d_lambda), with both cosines
        // bounded below by cos(max_abs_lat) inside the latitude band.
        let min_cos = max_abs_lat.to_radians().cos();
        let ratio = (radius_km / (2.0 * EARTH_RADIUS_KM)).sin() / min_cos;
        if ratio >= 1.0 {
            return Ok(None);
        }
        let d_lon = 2.0 * ratio.asin().to_degrees() + EDGE_EPSILON_DEG;
        if center.longitude - d_lon <= -180.0 || center.longitude + d_lon >= 180.0 {
            return Ok(None);
        }

        Ok(Some(Self {
            min_lat: center.latitude - d_lat,
            max_lat: center.latitude + d_lat,
            min_lon: center.longitude - d_lon,
            max_lon: center.longitude + d_lon,
        }))
    }

    /// Tight box around a polygon ring.
    pub fn of_ring(ring: &[Coordinate]) -> Result<Self> {
        validate_ring(ring)?;
        let mut bbox = Self {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
        };
        for vertex in ring {
            bbox.min_lat = bbox.min_lat.min(vertex.latitude);
            bbox.max_lat = bbox.max_lat.max(vertex.latitude);
            bbox.min_lon = bbox.min_lon.min(vertex.longitude);
            bbox.max_lon = bbox.max_lon.max(vertex.longitude);
        }
        Ok(bbox)
    }

    pub fn contains(&self, p: &Coordinate) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lon
            && p.longitude <= self.max_lon
    }
}
