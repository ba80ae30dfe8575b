// Configuration system integration tests

use sensor_collector::config::{load_config, LogFormat};
use sensor_collector::SourceKind;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_default_config() {
    let config_path = PathBuf::from("config/default.yaml");

    if config_path.exists() {
        let result = load_config(&config_path);
        assert!(result.is_ok(), "Failed to load default config: {:?}", result.err());

        let config = result.unwrap();

        // Verify defaults
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].port, 5123);
        assert_eq!(config.endpoints[0].kind, SourceKind::TemperaturePressure);
        assert_eq!(config.endpoints[1].kind, SourceKind::Triaxial);
        assert_eq!(config.storage.format, LogFormat::Text);
        assert_eq!(config.link.handshake_token, "isu_pt");
        assert_eq!(config.backoff.initial_ms, 2000);
        assert_eq!(config.logging.level, "info");
    }
}

#[test]
fn test_config_with_env_vars() {
    let temp_config = r#"
endpoints:
  - name: lab-a
    host: ${COLLECTOR_IT_HOST:-10.1.1.1}
    port: 5123
    kind: a
  - name: lab-b
    host: ${COLLECTOR_IT_HOST_B:-10.1.1.2}
    port: 5124
    kind: b

storage:
  path: ${COLLECTOR_IT_PATH:-/tmp/collector.jsonl}
  format: json

link:
  connect_timeout_ms: 1000
  handshake_timeout_ms: 750
  idle_timeout_seconds: 30
  poll_request: null

backoff:
  initial_ms: 100
  max_ms: 400
  multiplier: 1.5

logging:
  level: debug
  format: json
"#;

    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path().join("collector.yaml");
    fs::write(&temp_path, temp_config).expect("Failed to write temp config");

    std::env::set_var("COLLECTOR_IT_HOST", "192.168.68.101");
    std::env::remove_var("COLLECTOR_IT_HOST_B");

    let result = load_config(&temp_path);
    assert!(result.is_ok(), "Failed to load config with env vars: {:?}", result.err());

    let config = result.unwrap();

    // Verify env var substitution
    assert_eq!(config.endpoints[0].host, "192.168.68.101");
    assert_eq!(config.endpoints[1].host, "10.1.1.2"); // Uses default
    assert_eq!(config.storage.path, PathBuf::from("/tmp/collector.jsonl"));
    assert_eq!(config.storage.format, LogFormat::Json);

    // Link settings
    assert_eq!(config.link.handshake_timeout().as_millis(), 750);
    assert_eq!(config.link.idle_timeout().map(|d| d.as_secs()), Some(30));
    assert!(config.link.poll_request().is_none());
    // Omitted tokens keep their defaults
    assert_eq!(config.link.ack_token, "granted");

    std::env::remove_var("COLLECTOR_IT_HOST");
}

#[test]
fn test_invalid_config_rejected() {
    let temp_config = r#"
endpoints:
  - name: one
    host: 127.0.0.1
    port: 5123
    kind: a
backoff:
  initial_ms: 0
"#;

    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path().join("bad.yaml");
    fs::write(&temp_path, temp_config).unwrap();

    let err = load_config(&temp_path).unwrap_err();
    assert!(format!("{:#}", err).contains("initial_ms"));
}

#[test]
fn test_unknown_source_kind_rejected() {
    let temp_config = r#"
endpoints:
  - name: one
    host: 127.0.0.1
    port: 5123
    kind: quaternion
"#;

    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path().join("bad_kind.yaml");
    fs::write(&temp_path, temp_config).unwrap();

    assert!(load_config(&temp_path).is_err());
}
