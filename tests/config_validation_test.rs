//! Configuration validation tests
//!
//! Tests that verify configuration defaults, deserialization and validation.

use config::{File, FileFormat};
use scrape_exporter::config::{Config, ExporterConfig, ServerConfig};
use secrecy::ExposeSecret;

/// Deserialize a TOML snippet the same way `Config::load` does
fn parse(toml: &str) -> Config {
    config::Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()
        .expect("Failed to build configuration")
        .try_deserialize()
        .expect("Failed to deserialize configuration")
}

const MINIMAL: &str = r#"
[truenas]
api_key = "secret"
"#;

#[test]
fn test_default_server_config() {
    // Given: ServerConfig with default values
    let config = ServerConfig::default();

    // Then: Should have expected default values
    assert_eq!(config.addr, "0.0.0.0");
    assert_eq!(config.port, 9169);
}

#[test]
fn test_default_exporter_config() {
    let config = ExporterConfig::default();

    assert_eq!(config.namespace, "truenas");
    assert_eq!(config.max_requests, 20);
    assert!(!config.disable_exporter_target);
    assert!(config.disable_exporter_metrics);
    assert!(!config.disable_default_collectors);
    assert!(config.extra_params.is_empty());
}

#[test]
fn test_minimal_config_fills_defaults() {
    // Given: Only the API key
    // When: Deserializing
    let config = parse(MINIMAL);

    // Then: Everything else takes its default and validation passes
    assert_eq!(config.truenas.host, "");
    assert_eq!(config.truenas.api_key.expose_secret(), "secret");
    assert!(!config.truenas.use_tls);
    assert!(config.truenas.verify_ssl);
    assert_eq!(config.server.port, 9169);
    assert_eq!(config.exporter.namespace, "truenas");
    assert!(config.collectors.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_full_config_deserializes() {
    let config = parse(
        r#"
[server]
addr = "127.0.0.1"
port = 9200

[exporter]
namespace = "nas"
max_requests = 5
disable_exporter_metrics = false
extra_params = ["pool"]

[truenas]
host = "nas01.local"
api_key = "secret"
use_tls = true

[collectors]
dataset = true
alert = false
"#,
    );

    assert_eq!(config.server.addr, "127.0.0.1");
    assert_eq!(config.server.port, 9200);
    assert_eq!(config.exporter.namespace, "nas");
    assert_eq!(config.exporter.max_requests, 5);
    assert!(!config.exporter.disable_exporter_metrics);
    assert_eq!(config.exporter.extra_params, vec!["pool"]);
    assert!(config.truenas.use_tls);
    assert_eq!(config.collectors.get("dataset"), Some(&true));
    assert_eq!(config.collectors.get("alert"), Some(&false));
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_namespace_is_rejected() {
    let mut config = parse(MINIMAL);
    config.exporter.namespace = "my-exporter".to_string();

    let err = config.validate().unwrap_err();

    assert!(err.to_string().contains("my-exporter"));
}

#[test]
fn test_zero_port_is_rejected() {
    let mut config = parse(MINIMAL);
    config.server.port = 0;

    assert!(config.validate().is_err());
}

#[test]
fn test_reserved_collector_name_is_rejected() {
    // Given: A collector override using a lifecycle label
    let mut config = parse(MINIMAL);
    config.collectors.insert("all_collectors".to_string(), true);

    // When: Validating
    let err = config.validate().unwrap_err();

    // Then: The reserved name is reported
    assert!(err.to_string().contains("all_collectors"));
}

#[test]
fn test_target_cannot_be_an_extra_param() {
    let mut config = parse(MINIMAL);
    config.exporter.extra_params = vec!["pool".to_string(), "target".to_string()];

    let err = config.validate().unwrap_err();

    assert!(err.to_string().contains("target"));
}

#[test]
fn test_missing_api_key_fails_to_deserialize() {
    let result = config::Config::builder()
        .add_source(File::from_str("[truenas]\nhost = \"nas\"\n", FileFormat::Toml))
        .build()
        .expect("Failed to build configuration")
        .try_deserialize::<Config>();

    assert!(result.is_err());
}
