//! Structured alerts produced by the engine.
//!
//! Alert feeds and dashboards consume these; the engine only builds them.
//! Each alert carries the `now` the caller evaluated against, never the
//! system clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EntityId, EventId};

/// A structured alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Evaluation time supplied by the caller.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: AlertKind,
}

impl Alert {
    pub fn new(kind: AlertKind, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    GeofenceEntered {
        fence_id: String,
        fence_name: String,
        entity_id: EntityId,
    },
    GeofenceExited {
        fence_id: String,
        fence_name: String,
        entity_id: EntityId,
    },
    EventOverdue {
        event_id: Option<EventId>,
        subject_id: EntityId,
        scheduled_at: DateTime<Utc>,
        overdue_days: i64,
    },
    OccurrencesGenerated {
        base_id: Option<EventId>,
        produced: usize,
    },
    GenerationIncomplete {
        base_id: Option<EventId>,
        produced: usize,
        requested: usize,
        error: String,
    },
}
