//! Scheduling coordinator: urgency classification, overdue reporting, and
//! recurrence expansion into an external sink.
//!
//! The coordinator owns no events. Callers pass the current event snapshot
//! and an explicit `now`; persistence goes through an [`OccurrenceSink`].

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::recurrence::generate_occurrences;
use crate::alert::{Alert, AlertKind};
use crate::error::{Error, Result};
use crate::model::{EventId, EventStatus, RecurrenceRule, ScheduledEvent};
use crate::telemetry::{metrics, spans};

/// Events due within this many days are urgent (inclusive).
pub const URGENT_WITHIN_DAYS: i64 = 3;

/// Events due within this many days are due soon (inclusive).
pub const SOON_WITHIN_DAYS: i64 = 7;

/// Upper bound on occurrences materialized by one expansion.
pub const DEFAULT_OCCURRENCE_CAP: usize = 100;

// ---------------------------------------------------------------------------
// Urgency
// ---------------------------------------------------------------------------

/// Temporal urgency of a scheduled date relative to `now`.
///
/// Variants are ordered most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Overdue,
    Urgent,
    Soon,
    Normal,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Urgency::Overdue => "overdue",
            Urgency::Urgent => "urgent",
            Urgency::Soon => "soon",
            Urgency::Normal => "normal",
        };
        write!(f, "{s}")
    }
}

/// Classify by the gap between `scheduled_at` and `now`.
pub fn classify_urgency(scheduled_at: DateTime<Utc>, now: DateTime<Utc>) -> Urgency {
    if scheduled_at < now {
        return Urgency::Overdue;
    }
    let gap = scheduled_at - now;
    if gap <= Duration::days(URGENT_WITHIN_DAYS) {
        Urgency::Urgent
    } else if gap <= Duration::days(SOON_WITHIN_DAYS) {
        Urgency::Soon
    } else {
        Urgency::Normal
    }
}

/// An event with its urgency label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgencyLabel {
    pub urgency: Urgency,
    pub event: ScheduledEvent,
}

/// SCHEDULED events whose date has passed, oldest first (ties by id).
pub fn overdue_report(events: &[ScheduledEvent], now: DateTime<Utc>) -> Vec<ScheduledEvent> {
    let mut overdue: Vec<ScheduledEvent> = events
        .iter()
        .filter(|e| e.status == EventStatus::Scheduled && e.scheduled_at < now)
        .cloned()
        .collect();
    overdue.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    overdue
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Failure reported by the persistence collaborator for one draft.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SinkError {
    pub message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Receives generated drafts and makes them durable, assigning ids.
pub trait OccurrenceSink {
    fn persist(&mut self, draft: ScheduledEvent) -> std::result::Result<EventId, SinkError>;
}

impl<F> OccurrenceSink for F
where
    F: FnMut(ScheduledEvent) -> std::result::Result<EventId, SinkError>,
{
    fn persist(&mut self, draft: ScheduledEvent) -> std::result::Result<EventId, SinkError> {
        self(draft)
    }
}

/// In-memory sink. Optionally refuses every write after the first `n`.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<ScheduledEvent>,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(n: usize) -> Self {
        Self {
            events: Vec::new(),
            fail_after: Some(n),
        }
    }
}

impl OccurrenceSink for MemorySink {
    fn persist(&mut self, draft: ScheduledEvent) -> std::result::Result<EventId, SinkError> {
        if self.fail_after.is_some_and(|n| self.events.len() >= n) {
            return Err(SinkError::new(format!(
                "write refused after {} events",
                self.events.len()
            )));
        }
        let id = EventId::new();
        self.events.push(draft.with_id(id));
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Expansion report
// ---------------------------------------------------------------------------

/// Why an expansion stopped before handing every occurrence to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialGenerationFailure {
    /// Occurrences durably written before the failure.
    pub produced: usize,
    /// Index `k` of the occurrence the sink rejected.
    pub failed_at: u32,
    pub source: SinkError,
}

/// Outcome of [`SchedulingCoordinator::expand_and_persist`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionReport {
    pub base_id: Option<EventId>,
    /// Occurrences the rule calls for, after the coordinator's cap.
    pub requested: usize,
    pub produced: usize,
    pub persisted: Vec<EventId>,
    pub failure: Option<PartialGenerationFailure>,
}

impl ExpansionReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Treat a partial expansion as an error.
    pub fn into_result(self) -> Result<Vec<EventId>> {
        match self.failure {
            None => Ok(self.persisted),
            Some(failure) => Err(Error::PartialGeneration {
                produced: failure.produced,
                requested: self.requested,
                reason: failure.source.to_string(),
            }),
        }
    }

    pub fn to_alert(&self, now: DateTime<Utc>) -> Alert {
        let kind = match &self.failure {
            None => AlertKind::OccurrencesGenerated {
                base_id: self.base_id,
                produced: self.produced,
            },
            Some(failure) => AlertKind::GenerationIncomplete {
                base_id: self.base_id,
                produced: self.produced,
                requested: self.requested,
                error: failure.source.to_string(),
            },
        };
        Alert::new(kind, now)
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Maximum occurrences one expansion materializes, bounded rule or not.
    pub occurrence_cap: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            occurrence_cap: DEFAULT_OCCURRENCE_CAP,
        }
    }
}

/// Drives recurrence expansion and urgency reporting over event snapshots.
#[derive(Debug, Clone, Default)]
pub struct SchedulingCoordinator {
    config: CoordinatorConfig,
}

impl SchedulingCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Generate occurrences of `base` under `rule` and hand each to `sink`.
    ///
    /// Validation errors are returned before the sink sees anything. A sink
    /// error stops the expansion; occurrences already written stay written
    /// and the report says how far it got.
    pub fn expand_and_persist(
        &self,
        base: &ScheduledEvent,
        rule: &RecurrenceRule,
        sink: &mut impl OccurrenceSink,
    ) -> Result<ExpansionReport> {
        let occurrences = generate_occurrences(base, rule)?;
        let cap = self.config.occurrence_cap;
        let requested = occurrences.clone().dates().take(cap).count();

        let span = spans::start_expansion_span(base.id, rule.kind, requested);
        let _entered = span.enter();
        let started = Instant::now();

        let mut persisted = Vec::with_capacity(requested);
        let mut failure = None;
        for (i, draft) in occurrences.take(cap).enumerate() {
            let k = u32::try_from(i + 1).unwrap_or(u32::MAX);
            match sink.persist(draft) {
                Ok(id) => persisted.push(id),
                Err(source) => {
                    warn!(
                        failed_at = k,
                        produced = persisted.len(),
                        requested,
                        error = %source,
                        "sink rejected occurrence, stopping expansion"
                    );
                    metrics::sink_failures().add(1, &[KeyValue::new("rule", rule.kind.to_string())]);
                    failure = Some(PartialGenerationFailure {
                        produced: persisted.len(),
                        failed_at: k,
                        source,
                    });
                    break;
                }
            }
        }

        let produced = persisted.len();
        metrics::occurrences_generated().add(
            produced as u64,
            &[KeyValue::new("rule", rule.kind.to_string())],
        );
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "expand_and_persist")],
        );
        spans::record_expansion_outcome(&span, produced, failure.is_none());
        if failure.is_none() {
            info!(produced, requested, "recurrence expanded");
        }

        Ok(ExpansionReport {
            base_id: base.id,
            requested,
            produced,
            persisted,
            failure,
        })
    }

    /// Expand the base event's own rule. No rule means nothing to do.
    pub fn expand_event(
        &self,
        base: &ScheduledEvent,
        sink: &mut impl OccurrenceSink,
    ) -> Result<ExpansionReport> {
        match base.recurrence {
            Some(ref rule) => self.expand_and_persist(base, rule, sink),
            None => Ok(ExpansionReport {
                base_id: base.id,
                requested: 0,
                produced: 0,
                persisted: Vec::new(),
                failure: None,
            }),
        }
    }

    /// Next draft after a completed recurring event.
    ///
    /// The series is always expanded from its base, so `max_occurrences`
    /// and month-end clamping behave exactly as in the original expansion.
    /// A completed occurrence names its base through `parent_event_id`; the
    /// base must then be present in `series`. Returns `None` when the event
    /// is not completed, has no rule, or the series has no later date.
    pub fn follow_up(
        &self,
        event: &ScheduledEvent,
        series: &[ScheduledEvent],
    ) -> Result<Option<ScheduledEvent>> {
        let Some(ref rule) = event.recurrence else {
            return Ok(None);
        };
        if event.status != EventStatus::Completed {
            return Ok(None);
        }

        let base = match event.parent_event_id {
            None => event,
            Some(parent) => series
                .iter()
                .find(|candidate| candidate.id == Some(parent))
                .ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "series base {parent} is not among the supplied events"
                    ))
                })?,
        };

        let next = generate_occurrences(base, rule)?
            .find(|occurrence| occurrence.scheduled_at > event.scheduled_at);
        debug!(
            subject = %event.subject_id,
            scheduled = ?next.as_ref().map(|e| e.scheduled_at),
            "follow-up computed"
        );
        Ok(next)
    }

    pub fn overdue_report(
        &self,
        events: &[ScheduledEvent],
        now: DateTime<Utc>,
    ) -> Vec<ScheduledEvent> {
        overdue_report(events, now)
    }

    /// Overdue events as alert records, oldest first.
    pub fn overdue_alerts(&self, events: &[ScheduledEvent], now: DateTime<Utc>) -> Vec<Alert> {
        overdue_report(events, now)
            .into_iter()
            .map(|event| {
                Alert::new(
                    AlertKind::EventOverdue {
                        event_id: event.id,
                        subject_id: event.subject_id,
                        scheduled_at: event.scheduled_at,
                        overdue_days: (now - event.scheduled_at).num_days(),
                    },
                    now,
                )
            })
            .collect()
    }

    /// SCHEDULED events due between `now` and `now + horizon_days`, soonest first.
    pub fn upcoming(
        &self,
        events: &[ScheduledEvent],
        now: DateTime<Utc>,
        horizon_days: i64,
    ) -> Vec<UrgencyLabel> {
        let horizon = Duration::try_days(horizon_days.max(0))
            .and_then(|span| now.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut labels: Vec<UrgencyLabel> = events
            .iter()
            .filter(|e| {
                e.status == EventStatus::Scheduled
                    && e.scheduled_at >= now
                    && e.scheduled_at <= horizon
            })
            .map(|e| UrgencyLabel {
                urgency: classify_urgency(e.scheduled_at, now),
                event: e.clone(),
            })
            .collect();
        labels.sort_by(|a, b| {
            a.event
                .scheduled_at
                .cmp(&b.event.scheduled_at)
                .then_with(|| a.event.id.cmp(&b.event.id))
        });
        labels
    }

    /// Every SCHEDULED event labelled, most urgent first, then by date.
    pub fn urgency_feed(&self, events: &[ScheduledEvent], now: DateTime<Utc>) -> Vec<UrgencyLabel> {
        let mut labels: Vec<UrgencyLabel> = events
            .iter()
            .filter(|e| e.status == EventStatus::Scheduled)
            .map(|e| UrgencyLabel {
                urgency: classify_urgency(e.scheduled_at, now),
                event: e.clone(),
            })
            .collect();
        labels.sort_by(|a, b| {
            a.urgency
                .cmp(&b.urgency)
                .then_with(|| a.event.scheduled_at.cmp(&b.event.scheduled_at))
                .then_with(|| a.event.id.cmp(&b.event.id))
        });
        labels
    }
}
