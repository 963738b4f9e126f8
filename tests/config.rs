//! Configuration integration tests.

mod common;

use common::{load_config, write_config_file};
use filament::core::config::Config;

#[test]
fn leader_config_from_file() {
    let file = write_config_file(
        r#"
[node]
listen_addr = "0.0.0.0:7600"
"#,
    );
    let config = load_config(&file);

    assert_eq!(config.node.listen_addr, "0.0.0.0:7600");
    assert!(config.node.is_leader());
    config.validate().unwrap();
}

#[test]
fn follower_config_from_file() {
    let file = write_config_file(
        r#"
[node]
listen_addr = "0.0.0.0:7601"
leader_addr = "cache-leader:7600"

[telemetry]
log_level = "warn"
"#,
    );
    let config = load_config(&file);

    assert!(!config.node.is_leader());
    assert_eq!(config.node.upstream(), Some("cache-leader:7600"));
    assert_eq!(config.telemetry.log_level, "warn");
    config.validate().unwrap();
}

#[test]
fn missing_file_is_an_error() {
    let result = Config::from_file(std::path::Path::new("/nonexistent/filament.toml"));
    assert!(result.is_err());
}

#[test]
fn invalid_log_level_fails_validation() {
    let file = write_config_file(
        r#"
[node]
listen_addr = "0.0.0.0:7600"

[telemetry]
log_level = "chatty"
"#,
    );
    let config = load_config(&file);
    assert!(config.validate().is_err());
}
