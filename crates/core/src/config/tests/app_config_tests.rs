use crate::config::models::AppConfig;

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    // 验证默认值
    assert_eq!(config.coordinator.chunk_size_bytes, 1024 * 1024);
    assert_eq!(config.coordinator.max_attempts, 3);
    assert!(config.health.dead_after_ms > config.health.suspect_after_ms);
    assert_eq!(config.worker.worker_id, "worker-001");
    assert!(config.worker.advertise_address.is_none());
    assert_eq!(config.observability.log_format, "pretty");
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[coordinator]
listen_address = "127.0.0.1:9000"
chunk_size_bytes = 4096
max_attempts = 5
chunk_timeout_ms = 2000
startup_grace_ms = 1000
dispatch_interval_ms = 50
progress_interval_ms = 1000

[health]
check_interval_ms = 100
suspect_after_ms = 300
dead_after_ms = 900
auto_cleanup_dead_workers = false
cleanup_after_ms = 60000

[worker]
worker_id = "test-worker"
listen_address = "127.0.0.1:9001"
advertise_address = "http://10.0.0.7:9001"
coordinator_url = "http://127.0.0.1:9000"
heartbeat_interval_ms = 100
request_timeout_ms = 500
read_buffer_bytes = 8192

[observability]
log_level = "debug"
log_format = "json"
metrics_enabled = false
metrics_endpoint = "/metrics"
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();

    assert_eq!(config.coordinator.listen_address, "127.0.0.1:9000");
    assert_eq!(config.coordinator.chunk_size_bytes, 4096);
    assert_eq!(config.coordinator.max_attempts, 5);
    assert_eq!(config.health.dead_after_ms, 900);
    assert!(!config.health.auto_cleanup_dead_workers);
    assert_eq!(config.worker.worker_id, "test-worker");
    assert_eq!(
        config.worker.advertise_address.as_deref(),
        Some("http://10.0.0.7:9001")
    );
    assert_eq!(config.observability.log_level, "debug");
    assert!(!config.observability.metrics_enabled);
}

#[test]
fn test_partial_toml_uses_section_defaults() {
    let toml_content = r#"
[worker]
worker_id = "only-worker"
listen_address = "0.0.0.0:7071"
coordinator_url = "http://coordinator:7070"
heartbeat_interval_ms = 500
request_timeout_ms = 1000
read_buffer_bytes = 65536
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();
    assert_eq!(config.worker.worker_id, "only-worker");
    assert_eq!(config.coordinator, Default::default());
    assert_eq!(config.health, Default::default());
}

#[test]
fn test_config_to_toml() {
    let config = AppConfig::default();
    let toml_str = config.to_toml().unwrap();

    // Should be valid TOML that can be parsed back
    let parsed_config = AppConfig::from_toml(&toml_str).unwrap();
    assert_eq!(config, parsed_config);
}
