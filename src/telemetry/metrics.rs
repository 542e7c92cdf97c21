//! Metric instrument factories.
//!
//! Instruments come from the globally registered `MeterProvider`; until a
//! binary installs one (see [`super::init_telemetry`]) they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("ranch-engine")
}

/// Counter: radius and geofence queries.
/// Labels: `query` ("radius" | "geofence"), `strategy` ("scan" | "rtree").
pub fn proximity_queries() -> Counter<u64> {
    meter()
        .u64_counter("ranch.proximity.queries")
        .with_description("Number of proximity queries evaluated")
        .build()
}

/// Counter: occurrences handed to a sink successfully.
/// Labels: `rule`.
pub fn occurrences_generated() -> Counter<u64> {
    meter()
        .u64_counter("ranch.recurrence.occurrences")
        .with_description("Number of recurrence occurrences persisted")
        .build()
}

/// Counter: expansions stopped early by a sink error.
/// Labels: `rule`.
pub fn sink_failures() -> Counter<u64> {
    meter()
        .u64_counter("ranch.recurrence.sink_failures")
        .with_description("Number of expansions cut short by the persistence sink")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("ranch.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
