//! Tests for config module

use fanout::Config;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.search.track_total_hits_up_to, 10_000);
    assert_eq!(config.search.cancellation_check_interval, 1024);
    assert!(config.search.numeric_sort_optimization);
    assert_eq!(config.breaker.request_limit_bytes, 64 * 1024 * 1024);
    assert_eq!(config.logging.level, "info");
    assert!(config.validate().is_ok());
}

#[test]
fn test_save_and_load() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("fanout.toml");

    let mut config = Config::default();
    config.search.track_total_hits_up_to = 500;
    config.search.numeric_sort_optimization = false;
    config.breaker.hit_bytes = 256;
    config.logging.format = "json".to_string();

    config.save(&config_path).unwrap();

    let loaded = Config::load(&config_path).unwrap();
    assert_eq!(loaded.search.track_total_hits_up_to, 500);
    assert!(!loaded.search.numeric_sort_optimization);
    assert_eq!(loaded.breaker.hit_bytes, 256);
    assert_eq!(loaded.logging.format, "json");
}

#[test]
fn test_load_or_create_writes_defaults() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("nested/dir/fanout.toml");

    let config = Config::load_or_create(&config_path).unwrap();
    assert_eq!(config.search.points_block_size, 512);
    assert!(config_path.exists());

    let reloaded = Config::load_or_create(&config_path).unwrap();
    assert_eq!(reloaded.search.points_block_size, 512);
}

#[test]
fn test_partial_file_uses_defaults() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("fanout.toml");
    fs::write(
        &config_path,
        r#"
[search]
cancellation_check_interval = 64

[breaker]
request_limit_bytes = 1048576
"#,
    )
    .unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.search.cancellation_check_interval, 64);
    assert_eq!(config.search.track_total_hits_up_to, 10_000);
    assert_eq!(config.breaker.request_limit_bytes, 1_048_576);
    assert_eq!(config.breaker.bucket_bytes, 64);
}

#[test]
fn test_invalid_values_rejected() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("fanout.toml");

    fs::write(&config_path, "[search]\npoints_block_size = 0\n").unwrap();
    assert!(Config::load(&config_path).is_err());

    fs::write(&config_path, "[logging]\nformat = \"xml\"\n").unwrap();
    let err = Config::load(&config_path).unwrap_err();
    assert!(err.to_string().contains("logging.format"));
}
