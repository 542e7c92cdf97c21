//! Integration tests for telemetry initialization and span helpers.

use ranch_engine::config::EngineConfig;
use ranch_engine::model::{EventId, RecurrenceType};
use ranch_engine::telemetry::{TelemetryConfig, init_telemetry, metrics, spans};

#[test]
fn telemetry_initializes_without_endpoint() {
    // The global subscriber can only be set once per process; a second
    // init in the same binary returns Err, which is acceptable here.
    let config = TelemetryConfig::from_engine_config(&EngineConfig::default());
    assert!(config.endpoint.is_none());
    assert_eq!(config.service_name, "ranch-engine");
    if let Ok(guard) = init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn expansion_span_records_outcome() {
    let span = spans::start_expansion_span(Some(EventId::new()), RecurrenceType::Weekly, 4);
    spans::record_expansion_outcome(&span, 3, false);
}

#[test]
fn proximity_span_can_be_entered() {
    let span = spans::start_proximity_span("radius", 1200);
    let _entered = span.enter();
}

#[test]
fn instruments_are_usable_without_a_provider() {
    metrics::proximity_queries().add(1, &[]);
    metrics::occurrences_generated().add(2, &[]);
    metrics::sink_failures().add(1, &[]);
    metrics::operation_duration_ms().record(1.5, &[]);
}
