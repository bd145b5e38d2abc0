use std::io::Write;

use watchconf::{AgentwatchConfig, ConfigError};

#[test]
fn explicit_path_is_loaded_and_recorded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[executor]
program = "/opt/agentwatch/bin/agentwatch-executor"

[webhooks]
timeout_ms = 250
visualization = false
"#
    )
    .unwrap();

    let (config, sources) = AgentwatchConfig::load_with_sources_from(Some(file.path())).unwrap();
    assert!(sources.files.iter().any(|p| p == file.path()));
    assert_eq!(config.webhooks.timeout_ms, 250);
    assert!(!config.webhooks.visualization);
    if !sources.env_overrides.iter().any(|v| v == "AGENTWATCH_EXECUTOR") {
        assert_eq!(config.executor.program, "/opt/agentwatch/bin/agentwatch-executor");
    }
}

#[test]
fn unreadable_path_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let (_config, sources) = AgentwatchConfig::load_with_sources_from(Some(&missing)).unwrap();
    assert!(!sources.files.iter().any(|p| p == &missing));
}

#[test]
fn malformed_file_is_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[host]\ncommand_timeout_ms = [").unwrap();

    let err = AgentwatchConfig::load_from(Some(file.path())).unwrap_err();
    match err {
        ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {other}"),
    }
}

#[test]
fn written_config_loads_back_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handoff.toml");

    let mut config = AgentwatchConfig::default();
    config.webhooks.visualization = false;
    config.webhooks.visualization_port = 9100;
    config.telemetry.log_level = "warn".to_string();
    config.write_to(&path).unwrap();

    assert_eq!(watchconf::loader::load_from_file(&path).unwrap(), config);
}

#[test]
fn write_to_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent").join("handoff.toml");
    let err = AgentwatchConfig::default().write_to(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Write { .. }));
}
