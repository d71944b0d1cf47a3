use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

use visio_convert::load_config::{load_config, API_URL_ENV, DEFAULT_API_URL};

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).expect("write config");
    file
}

#[test]
#[serial]
fn test_load_config_reads_every_key_from_file() {
    env::remove_var(API_URL_ENV);
    let file = config_file(
        r#"
api_url: "https://convert.example.com"
output_dir: ./tmp/xml
request_timeout_secs: 15
controller:
  poll_interval_ms: 500
  max_consecutive_poll_failures: 4
"#,
    );

    let config = load_config(Some(file.path())).expect("Config should load");

    assert_eq!(config.api_url, "https://convert.example.com");
    assert_eq!(config.output_dir, PathBuf::from("./tmp/xml"));
    assert_eq!(config.request_timeout_secs, 15);
    assert_eq!(config.controller.poll_interval_ms, 500);
    assert_eq!(config.controller.max_consecutive_poll_failures, Some(4));
}

#[test]
#[serial]
fn test_load_config_environment_overrides_api_url() {
    let file = config_file("api_url: \"http://from-file:8000\"\n");
    env::set_var(API_URL_ENV, "http://from-env:9000");

    let config = load_config(Some(file.path())).expect("Config should load");
    env::remove_var(API_URL_ENV);

    assert_eq!(config.api_url, "http://from-env:9000");
}

#[test]
#[serial]
fn test_load_config_defaults_without_file() {
    env::remove_var(API_URL_ENV);

    let config = load_config(None::<&str>).expect("Defaults should load");

    assert_eq!(config.api_url, DEFAULT_API_URL);
    assert_eq!(config.output_dir, PathBuf::from("converted"));
    assert_eq!(config.request_timeout_secs, 60);
    assert_eq!(config.controller.poll_interval_ms, 2000);
    assert_eq!(config.controller.max_consecutive_poll_failures, None);
}

#[test]
#[serial]
fn test_load_config_empty_file_means_defaults() {
    env::remove_var(API_URL_ENV);
    let file = config_file("\n");

    let config = load_config(Some(file.path())).expect("Empty config should load");
    assert_eq!(config.api_url, DEFAULT_API_URL);
}

#[test]
#[serial]
fn test_load_config_rejects_invalid_yaml() {
    env::remove_var(API_URL_ENV);
    let file = config_file("controller: [broken\n");

    let err = load_config(Some(file.path())).expect_err("Invalid YAML must fail");
    assert!(err.to_string().contains("Failed to parse config YAML"), "got: {err}");
}

#[test]
#[serial]
fn test_load_config_rejects_unknown_keys() {
    env::remove_var(API_URL_ENV);
    let file = config_file("api_ur1: \"http://typo\"\n");

    assert!(load_config(Some(file.path())).is_err());
}

#[test]
#[serial]
fn test_load_config_rejects_non_http_url() {
    env::remove_var(API_URL_ENV);
    let file = config_file("api_url: \"ftp://files.example.com\"\n");

    let err = load_config(Some(file.path())).expect_err("Non-http URL must fail");
    assert!(err.to_string().contains("Invalid api_url"), "got: {err}");
}

#[test]
#[serial]
fn test_load_config_rejects_zero_poll_interval() {
    env::remove_var(API_URL_ENV);
    let file = config_file("controller:\n  poll_interval_ms: 0\n");

    let err = load_config(Some(file.path())).expect_err("Zero interval must fail");
    assert!(err.to_string().contains("poll_interval_ms"), "got: {err}");
}

#[test]
#[serial]
fn test_load_config_missing_file_is_an_error() {
    env::remove_var(API_URL_ENV);
    let err = load_config(Some("/nonexistent/visio-convert.yaml"))
        .expect_err("Missing file must fail");
    assert!(err.to_string().contains("Failed to read config file"), "got: {err}");
}
