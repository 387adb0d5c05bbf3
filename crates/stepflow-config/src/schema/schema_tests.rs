use super::*;

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.service.name, "stepflow");
    assert_eq!(config.service.environment, Environment::Development);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.shutdown_grace_secs, 5);
    assert!(config.database.path.is_none());
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
fn test_channel_defaults() {
    let channel = ChannelConfig::default();
    assert_eq!(channel.backend, ChannelBackend::Memory);
    assert_eq!(channel.partitions, 8);
    assert_eq!(channel.task_topic, "task-queue");
    assert_eq!(channel.completion_topic, "task-completions");
    assert_eq!(channel.consumer_group, "orchestrator-group");
    assert_eq!(channel.poll_interval_ms, 100);
}

#[test]
fn test_engine_defaults() {
    let engine = EngineConfig::default();
    assert_eq!(engine.redelivery_backoff_ms, 500);
    assert!(engine.dedup_ledger);
    assert_eq!(engine.member_index, 0);
    assert_eq!(engine.member_count, 1);
}

#[test]
fn test_partial_section_keeps_defaults() {
    let config: Config = toml::from_str("[engine]\nmember_count = 3").unwrap();
    assert_eq!(config.engine.member_count, 3);
    assert!(config.engine.dedup_ledger);
    assert_eq!(config.engine.redelivery_backoff_ms, 500);
}

#[test]
fn test_enum_values_are_lowercase() {
    let config: Config = toml::from_str(
        r#"
        [service]
        environment = "production"

        [logging]
        format = "json"
        "#,
    )
    .unwrap();
    assert_eq!(config.service.environment, Environment::Production);
    assert_eq!(config.logging.format, LogFormat::Json);
}
