use coach_controller::config::Config;
use std::io::Write;
use tempfile::NamedTempFile;
use validator::Validate;

fn write_config(table: toml::Table) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(toml::to_string(&table).unwrap().as_bytes())
        .unwrap();
    file
}

#[test]
fn test_defaults_match_coaching_constants() {
    let config = Config::default();
    assert_eq!(config.server_port, 8080);
    assert_eq!(config.weekly_message_limit, 20);
    assert_eq!(config.resume_window_hours, 24);
    assert_eq!(config.history_window, 20);
    assert_eq!(config.concern_window_days, 7);
    assert!(config.validate().is_ok());
}

#[test]
fn test_file_overrides_defaults() {
    let mut table = toml::Table::new();
    table.insert("server_port".into(), toml::Value::Integer(9090));
    table.insert("weekly_message_limit".into(), toml::Value::Integer(5));
    table.insert(
        "database_url".into(),
        toml::Value::String("sqlite://data/test.db".into()),
    );
    let file = write_config(table);

    let config = Config::load_from(file.path(), true).unwrap();
    assert_eq!(config.server_port, 9090);
    assert_eq!(config.weekly_message_limit, 5);
    assert_eq!(config.database_url, "sqlite://data/test.db");
    // Untouched keys keep their defaults
    assert_eq!(config.history_window, 20);
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut table = toml::Table::new();
    table.insert("server_port".into(), toml::Value::Integer(80));
    let file = write_config(table);

    assert!(Config::load_from(file.path(), true).is_err());
}

#[test]
fn test_missing_optional_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("absent"), false).unwrap();
    assert_eq!(config.server_port, 8080);
}

#[test]
fn test_llm_configured_tracks_key() {
    let config = Config {
        llm_api_key: Some("sk-test-0123456789abcdef".to_string()),
        ..Config::default()
    };
    assert!(config.llm_configured());
    assert!(config.validate().is_ok());

    let config = Config {
        llm_api_key: None,
        ..Config::default()
    };
    assert!(!config.llm_configured());
}
