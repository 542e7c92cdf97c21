//! # ranch-engine
//!
//! Geospatial and scheduling engine for a ranch management platform.
//!
//! Answers "which animals are near this point / inside this pasture", turns
//! recurrence rules into concrete follow-up events, and classifies the
//! calendar by urgency. Persistence, transport, and presentation belong to
//! the caller; the engine works on snapshots and an explicit `now`.

pub mod alert;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod model;
pub mod telemetry;
