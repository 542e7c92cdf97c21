use std::io::Write;

use ranch_engine::config::EngineConfig;
use ranch_engine::error::Error;

const VARS: [&str; 4] = [
    "RANCH_INDEX_THRESHOLD",
    "RANCH_OCCURRENCE_CAP",
    "OTEL_ENDPOINT",
    "LOG_LEVEL",
];

fn clear_env() {
    for var in VARS {
        unsafe {
            std::env::remove_var(var);
        }
    }
}

// Environment variables are process-wide, so every env scenario runs in
// this one test.
#[test]
fn config_from_env_defaults_overrides_and_errors() {
    clear_env();
    let config = EngineConfig::from_env().unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.log_level, "info");
    assert_eq!(config.occurrence_cap, 100);

    unsafe {
        std::env::set_var("RANCH_INDEX_THRESHOLD", "64");
        std::env::set_var("RANCH_OCCURRENCE_CAP", "24");
        std::env::set_var("OTEL_ENDPOINT", "http://localhost:4317");
        std::env::set_var("LOG_LEVEL", "debug");
    }
    let config = EngineConfig::from_env().unwrap();
    assert_eq!(config.index_threshold, 64);
    assert_eq!(config.coordinator().occurrence_cap, 24);
    assert_eq!(config.proximity().index_threshold, 64);
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(config.log_level, "debug");

    unsafe {
        std::env::set_var("RANCH_INDEX_THRESHOLD", "many");
    }
    assert!(matches!(EngineConfig::from_env(), Err(Error::Config(_))));

    unsafe {
        std::env::remove_var("RANCH_INDEX_THRESHOLD");
        std::env::set_var("RANCH_OCCURRENCE_CAP", "0");
    }
    assert!(matches!(EngineConfig::from_env(), Err(Error::Config(_))));

    clear_env();
}

#[test]
fn config_from_toml_file_fills_missing_fields() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "index_threshold = 32").unwrap();
    writeln!(file, "occurrence_cap = 12").unwrap();

    let config = EngineConfig::from_toml_file(file.path()).unwrap();
    assert_eq!(config.index_threshold, 32);
    assert_eq!(config.occurrence_cap, 12);
    assert_eq!(config.log_level, EngineConfig::default().log_level);
    assert_eq!(config.otel_endpoint, None);
}

#[test]
fn config_from_toml_rejects_unknown_and_invalid_fields() {
    assert!(matches!(
        EngineConfig::from_toml_str("database_url = \"postgres://\""),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        EngineConfig::from_toml_str("index_cell_deg = 0.05"),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        EngineConfig::from_toml_str("occurrence_cap = 0"),
        Err(Error::Config(_))
    ));
}

#[test]
fn config_from_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = EngineConfig::from_toml_file(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::Io(_))));
}
