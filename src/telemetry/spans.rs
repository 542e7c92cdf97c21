//! Span helpers for engine operations.

use tracing::Span;

use crate::model::{EventId, RecurrenceType};

/// Start a span for one recurrence expansion.
///
/// `expansion.produced` and `expansion.complete` are declared empty and
/// filled in by [`record_expansion_outcome`].
pub fn start_expansion_span(base_id: Option<EventId>, rule: RecurrenceType, requested: usize) -> Span {
    tracing::info_span!(
        "recurrence.expand",
        "event.id" = ?base_id,
        "recurrence.type" = %rule,
        "expansion.requested" = requested,
        "expansion.produced" = tracing::field::Empty,
        "expansion.complete" = tracing::field::Empty,
    )
}

/// Record how an expansion ended on its span.
pub fn record_expansion_outcome(span: &Span, produced: usize, complete: bool) {
    span.record("expansion.produced", produced);
    span.record("expansion.complete", complete);
}

/// Start a span around a batch of proximity queries over one snapshot.
pub fn start_proximity_span(query: &str, entities: usize) -> Span {
    tracing::debug_span!(
        "proximity.query",
        "proximity.query" = query,
        "proximity.entities" = entities,
    )
}
