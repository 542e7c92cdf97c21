//! Scheduling engine: recurrence expansion and the coordinator that drives it.

pub mod coordinator;
pub mod recurrence;

pub use coordinator::{
    CoordinatorConfig, ExpansionReport, MemorySink, OccurrenceSink, PartialGenerationFailure,
    SchedulingCoordinator, SinkError, Urgency, UrgencyLabel, classify_urgency, overdue_report,
};
pub use recurrence::{OccurrenceSeries, Occurrences, generate_occurrences, next_date};
