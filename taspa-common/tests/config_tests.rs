//! Tests for bootstrap configuration loading and graceful degradation
//!
//! Uses serial_test to prevent environment variable races between tests
//! that set `TASPA_*` variables.

use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use taspa_common::config::TomlConfig;

fn clear_env() {
    for var in [
        "TASPA_DATABASE",
        "TASPA_BROKER_URL",
        "TASPA_ORCHESTRATOR_URL",
        "TASPA_LOGS_URL",
        "TASPA_JWT_SECRET",
        "TASPA_CONFIG",
    ] {
        env::remove_var(var);
    }
}

#[test]
fn test_empty_toml_uses_defaults() {
    let config = TomlConfig::from_toml_str("").expect("empty TOML should parse");

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.broker.subject_prefix, "scrape.jobs");
    assert!(!config.broker.platform_routing);
    assert_eq!(config.import.max_upload_bytes, 64 * 1024 * 1024);
    assert!(config.database_path.ends_with("taspa.db"));
}

#[test]
fn test_partial_sections_keep_remaining_defaults() {
    let config = TomlConfig::from_toml_str(
        r#"
        database_path = "/srv/taspa/taspa.db"

        [broker]
        url = "memory"
        platform_routing = true

        [services]
        logs_url = "http://logs:8010"
        "#,
    )
    .expect("valid TOML");

    assert_eq!(config.database_path, PathBuf::from("/srv/taspa/taspa.db"));
    assert_eq!(config.broker.url, "memory");
    assert!(config.broker.platform_routing);
    assert_eq!(config.broker.stream, "SCRAPE_JOBS");
    assert_eq!(config.services.logs_url, "http://logs:8010");
    assert_eq!(config.services.orchestrator_url, "http://127.0.0.1:8005");
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = TomlConfig::from_toml_str("database_path = [").unwrap_err();
    assert!(matches!(err, taspa_common::Error::Config(_)));
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    clear_env();
    let result = TomlConfig::load(Some(PathBuf::from("/nonexistent/taspa.toml").as_path()));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_explicit_file_then_env_override() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[broker]\nurl = \"nats://file:4222\"\n[auth]\njwt_secret = \"from-file\"")
        .expect("write config");

    env::set_var("TASPA_BROKER_URL", "memory");
    let config = TomlConfig::load(Some(file.path())).expect("config should load");
    clear_env();

    // Environment beats the file; untouched values come from the file
    assert_eq!(config.broker.url, "memory");
    assert_eq!(config.auth.jwt_secret, "from-file");
}

#[test]
#[serial]
fn test_env_database_override() {
    clear_env();
    let mut config = TomlConfig::default();
    env::set_var("TASPA_DATABASE", "/tmp/taspa-env.db");
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.database_path, PathBuf::from("/tmp/taspa-env.db"));
}
