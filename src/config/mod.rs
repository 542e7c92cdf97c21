//! Typed configuration for the engine.
//!
//! Loaded once at startup from environment variables or a TOML file.
//! Every field has a default; malformed values fail fast with
//! [`Error::Config`].

use std::path::Path;

use serde::Deserialize;

use crate::engine::CoordinatorConfig;
use crate::engine::coordinator::DEFAULT_OCCURRENCE_CAP;
use crate::error::{Error, Result};
use crate::geo::ProximityQuery;
use crate::geo::index::DEFAULT_INDEX_THRESHOLD;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Entity count from which radius/geofence queries build an R-tree.
    pub index_threshold: usize,
    /// Upper bound on occurrences a single expansion may produce.
    pub occurrence_cap: usize,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_threshold: DEFAULT_INDEX_THRESHOLD,
            occurrence_cap: DEFAULT_OCCURRENCE_CAP,
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            index_threshold: parsed_var("RANCH_INDEX_THRESHOLD")?
                .unwrap_or(defaults.index_threshold),
            occurrence_cap: parsed_var("RANCH_OCCURRENCE_CAP")?.unwrap_or(defaults.occurrence_cap),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok().filter(|v| !v.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        if self.occurrence_cap == 0 {
            return Err(Error::Config("occurrence_cap must be at least 1".into()));
        }
        Ok(())
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            occurrence_cap: self.occurrence_cap,
        }
    }

    pub fn proximity(&self) -> ProximityQuery {
        ProximityQuery {
            index_threshold: self.index_threshold,
        }
    }
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}
