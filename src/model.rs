//! Core data model.
//!
//! Located entities and geofences describe *where* things are; scheduled
//! events and recurrence rules (in [`schedule`]) describe *when* things
//! happen. Everything here is a plain value: the engine reads snapshots
//! supplied by the record store and never mutates entity identity.

pub mod schedule;

pub use schedule::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Coordinate
// ---------------------------------------------------------------------------

/// A WGS84 position in decimal degrees.
///
/// Fields are public so snapshots can be built directly from stored rows;
/// every engine operation calls [`Coordinate::validate`] before using one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Reported horizontal accuracy in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl Coordinate {
    /// Create a validated coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let coordinate = Self::unchecked(latitude, longitude);
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Create a coordinate without validation. Operations still validate it.
    pub const fn unchecked(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            captured_at: None,
        }
    }

    /// Build from nullable record fields. A missing field is invalid.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Result<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Self::new(lat, lon),
            (None, _) => Err(Error::InvalidCoordinate("latitude is missing".to_string())),
            (_, None) => Err(Error::InvalidCoordinate("longitude is missing".to_string())),
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    /// Reject non-finite or out-of-range latitude/longitude. Never clamps.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::InvalidCoordinate(format!(
                "latitude {} out of range [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::InvalidCoordinate(format!(
                "longitude {} out of range [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Same latitude and longitude, ignoring altitude and metadata.
    pub fn same_position(&self, other: &Coordinate) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

// ---------------------------------------------------------------------------
// Located entity
// ---------------------------------------------------------------------------

/// Registry identifier of a tracked entity (animal, vehicle, herd marker).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Registry lifecycle status of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[default]
    Active,
    Inactive,
    Sold,
    Deceased,
}

impl EntityStatus {
    pub fn is_active(self) -> bool {
        matches!(self, EntityStatus::Active)
    }
}

/// An entity's id, current position, and status, as read from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedEntity {
    pub id: EntityId,
    pub coordinate: Coordinate,
    #[serde(default)]
    pub status: EntityStatus,
}

impl LocatedEntity {
    pub fn new(id: impl Into<EntityId>, coordinate: Coordinate) -> Self {
        Self {
            id: id.into(),
            coordinate,
            status: EntityStatus::Active,
        }
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }
}

// ---------------------------------------------------------------------------
// Geofence
// ---------------------------------------------------------------------------

/// Region covered by a geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeofenceShape {
    Circle { center: Coordinate, radius_km: f64 },
    /// Implicitly closed ring; a repeated closing vertex is tolerated.
    Polygon { ring: Vec<Coordinate> },
}

/// A named region with entry/exit alert settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub id: String,
    pub name: String,
    pub shape: GeofenceShape,
    #[serde(default)]
    pub alert_on_entry: bool,
    #[serde(default)]
    pub alert_on_exit: bool,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Geofence {
    pub fn circle(
        id: impl Into<String>,
        name: impl Into<String>,
        center: Coordinate,
        radius_km: f64,
    ) -> Self {
        Self::with_shape(id, name, GeofenceShape::Circle { center, radius_km })
    }

    pub fn polygon(id: impl Into<String>, name: impl Into<String>, ring: Vec<Coordinate>) -> Self {
        Self::with_shape(id, name, GeofenceShape::Polygon { ring })
    }

    fn with_shape(id: impl Into<String>, name: impl Into<String>, shape: GeofenceShape) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            shape,
            alert_on_entry: false,
            alert_on_exit: false,
            active: true,
        }
    }

    pub fn alert_on_entry(mut self, enabled: bool) -> Self {
        self.alert_on_entry = enabled;
        self
    }

    pub fn alert_on_exit(mut self, enabled: bool) -> Self {
        self.alert_on_exit = enabled;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Check vertex/center coordinates and shape invariants.
    ///
    /// Coordinate problems surface as `InvalidCoordinate`; a non-positive
    /// radius or a ring with fewer than three distinct vertices as
    /// `InvalidGeofence`.
    pub fn validate(&self) -> Result<()> {
        match &self.shape {
            GeofenceShape::Circle { center, radius_km } => {
                center.validate()?;
                if !radius_km.is_finite() || *radius_km <= 0.0 {
                    return Err(Error::InvalidGeofence(format!(
                        "geofence {}: radius must be positive, got {radius_km}",
                        self.id
                    )));
                }
            }
            GeofenceShape::Polygon { ring } => {
                validate_ring(ring).map_err(|e| match e {
                    Error::InvalidGeofence(msg) => {
                        Error::InvalidGeofence(format!("geofence {}: {msg}", self.id))
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }
}

/// Validate every vertex and require at least three distinct ones.
pub(crate) fn validate_ring(ring: &[Coordinate]) -> Result<()> {
    let mut seen: Vec<&Coordinate> = Vec::with_capacity(ring.len());
    for vertex in ring {
        vertex.validate()?;
        if !seen.iter().any(|v| v.same_position(vertex)) {
            seen.push(vertex);
        }
    }
    if seen.len() < 3 {
        return Err(Error::InvalidGeofence(format!(
            "polygon needs at least 3 distinct vertices, got {}",
            seen.len()
        )));
    }
    Ok(())
}
