//! Scheduled events and recurrence rules.
//!
//! A scheduled event is a calendar commitment for one subject entity
//! (a vaccination, a hoof inspection). Its status only changes through
//! [`ScheduledEvent::transition`], which returns a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Coordinate, EntityId};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Newtype for event IDs. Assigned by the record store, never by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Postponed,
    Failed,
}

impl EventStatus {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, to),
            (Scheduled, InProgress)
                | (Scheduled, Completed)
                | (Scheduled, Cancelled)
                | (Scheduled, Postponed)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
                | (Postponed, Scheduled)
                | (Postponed, Cancelled)
                | (Failed, Scheduled) // retry
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Cancelled)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventStatus::Scheduled => "SCHEDULED",
            EventStatus::InProgress => "IN_PROGRESS",
            EventStatus::Completed => "COMPLETED",
            EventStatus::Cancelled => "CANCELLED",
            EventStatus::Postponed => "POSTPONED",
            EventStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Vaccination,
    Treatment,
    Inspection,
    Checkup,
    Breeding,
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

// ---------------------------------------------------------------------------
// Recurrence rule
// ---------------------------------------------------------------------------

/// Period a recurrence rule advances by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceType {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl std::fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecurrenceType::None => "none",
            RecurrenceType::Daily => "daily",
            RecurrenceType::Weekly => "weekly",
            RecurrenceType::Monthly => "monthly",
            RecurrenceType::Yearly => "yearly",
        };
        write!(f, "{s}")
    }
}

/// Declarative description of how a base event repeats.
///
/// `interval` and `max_occurrences` are signed so that bad values coming
/// from stored records are rejected by [`RecurrenceRule::validate`] rather
/// than failing deserialization. `max_occurrences` counts the whole series,
/// base included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    #[serde(default = "default_interval")]
    pub interval: i32,
    /// Last instant an occurrence may fall on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_occurrences: Option<i32>,
}

fn default_interval() -> i32 {
    1
}

impl RecurrenceRule {
    pub fn new(kind: RecurrenceType) -> Self {
        Self {
            kind,
            interval: 1,
            end_date: None,
            max_occurrences: None,
        }
    }

    pub fn daily() -> Self {
        Self::new(RecurrenceType::Daily)
    }

    pub fn weekly() -> Self {
        Self::new(RecurrenceType::Weekly)
    }

    pub fn monthly() -> Self {
        Self::new(RecurrenceType::Monthly)
    }

    pub fn yearly() -> Self {
        Self::new(RecurrenceType::Yearly)
    }

    pub fn every(mut self, interval: i32) -> Self {
        self.interval = interval;
        self
    }

    pub fn until(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn max_occurrences(mut self, n: i32) -> Self {
        self.max_occurrences = Some(n);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval <= 0 {
            return Err(Error::InvalidRecurrenceRule(format!(
                "interval must be at least 1, got {}",
                self.interval
            )));
        }
        if let Some(max) = self.max_occurrences.filter(|max| *max <= 0) {
            return Err(Error::InvalidRecurrenceRule(format!(
                "max occurrences must be at least 1, got {max}"
            )));
        }
        Ok(())
    }

    /// True when either bound is set, so generation is finite.
    pub fn is_bounded(&self) -> bool {
        self.kind == RecurrenceType::None
            || self.end_date.is_some()
            || self.max_occurrences.is_some()
    }
}

// ---------------------------------------------------------------------------
// Scheduled event
// ---------------------------------------------------------------------------

/// A calendar commitment for one subject entity.
///
/// `id` is `None` for drafts that have not been handed to the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,

    /// Entity this event is about (an animal, a pen).
    pub subject_id: EntityId,

    pub category: EventCategory,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub scheduled_at: DateTime<Utc>,

    pub status: EventStatus,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceRule>,

    /// Base event of the series this occurrence was generated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<EventId>,

    pub location: Coordinate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScheduledEvent {
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether this event was generated from another event's rule.
    pub fn is_occurrence(&self) -> bool {
        self.parent_event_id.is_some()
    }

    /// The id every occurrence of this series points back to.
    pub fn series_root(&self) -> Option<EventId> {
        self.parent_event_id.or(self.id)
    }

    /// Move to `to`, returning the updated record.
    ///
    /// Stamps `updated_at` with `now`, and `completed_at` when completing.
    pub fn transition(mut self, to: EventStatus, now: DateTime<Utc>) -> Result<Self> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Some(now);
        if to == EventStatus::Completed {
            self.completed_at = Some(now);
        }
        Ok(self)
    }

    pub fn start(self, now: DateTime<Utc>) -> Result<Self> {
        self.transition(EventStatus::InProgress, now)
    }

    pub fn complete(self, now: DateTime<Utc>) -> Result<Self> {
        self.transition(EventStatus::Completed, now)
    }

    pub fn cancel(self, now: DateTime<Utc>) -> Result<Self> {
        self.transition(EventStatus::Cancelled, now)
    }

    pub fn postpone(self, now: DateTime<Utc>) -> Result<Self> {
        self.transition(EventStatus::Postponed, now)
    }

    /// Bring a postponed (or failed) event back onto the calendar at `at`.
    pub fn reschedule(self, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<Self> {
        let mut event = self.transition(EventStatus::Scheduled, now)?;
        event.scheduled_at = at;
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for base events submitted by callers.
pub struct NewScheduledEvent {
    subject_id: EntityId,
    category: EventCategory,
    title: String,
    scheduled_at: DateTime<Utc>,
    location: Coordinate,
    notes: Option<String>,
    priority: Priority,
    recurrence: Option<RecurrenceRule>,
    parent_event_id: Option<EventId>,
}

impl NewScheduledEvent {
    pub fn new(
        subject_id: impl Into<EntityId>,
        category: EventCategory,
        title: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        location: Coordinate,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            category,
            title: title.into(),
            scheduled_at,
            location,
            notes: None,
            priority: Priority::default(),
            recurrence: None,
            parent_event_id: None,
        }
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence = Some(rule);
        self
    }

    pub fn parent(mut self, parent_id: EventId) -> Self {
        self.parent_event_id = Some(parent_id);
        self
    }

    /// Validate and produce a SCHEDULED draft (no id yet).
    pub fn build(self) -> Result<ScheduledEvent> {
        self.location.validate()?;
        if let Some(ref rule) = self.recurrence {
            rule.validate()?;
        }
        Ok(ScheduledEvent {
            id: None,
            subject_id: self.subject_id,
            category: self.category,
            title: self.title,
            notes: self.notes,
            scheduled_at: self.scheduled_at,
            status: EventStatus::Scheduled,
            priority: self.priority,
            recurrence: self.recurrence,
            parent_event_id: self.parent_event_id,
            location: self.location,
            completed_at: None,
            updated_at: None,
        })
    }
}
