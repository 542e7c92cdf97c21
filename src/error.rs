//! Error types for ranch-engine.
//!
//! Validation errors are caller bugs and surface immediately. Sink failures
//! during recurrence expansion are reported as data (see
//! [`crate::engine::coordinator::ExpansionReport`]) and only become an
//! [`Error::PartialGeneration`] when the caller asks for it.

use thiserror::Error;

use crate::model::EventStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("invalid geofence: {0}")]
    InvalidGeofence(String),

    #[error("invalid recurrence rule: {0}")]
    InvalidRecurrenceRule(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: EventStatus, to: EventStatus },

    #[error("partial generation: {produced} of {requested} occurrences persisted: {reason}")]
    PartialGeneration {
        produced: usize,
        requested: usize,
        reason: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
