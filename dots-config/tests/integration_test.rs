//! Integration tests for dots-config

use dots_config::*;
use std::io::Write;
use std::time::Duration;
use temp_env::with_vars;

#[test]
fn test_default_config_validation() {
    let config = DotsConfig::default();
    assert!(config.validate_all().is_ok());
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("DOTS_DURATION", Some("3h")),
        ("DOTS_DB_URL", Some("sqlite://bench.db")),
        ("DOTS_DB_USER", Some("bench")),
        ("DOTS_PERF_PORT", Some("7100")),
        ("DOTS_LOG_LEVEL", Some("debug")),
        ("DOTS_MAX_LOG_SIZE", Some("200K")),
    ];

    with_vars(vars, || {
        let loader = ConfigLoader::new();
        let config = loader.from_env().unwrap();

        assert_eq!(config.run.duration, Duration::from_secs(3 * 3600));
        assert_eq!(config.database.url, "sqlite://bench.db");
        assert_eq!(config.database.user, "bench");
        assert_eq!(config.perf.port, 7100);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.max_log_size, 200 * 1024);
    });
}

#[test]
fn test_invalid_env_value_is_reported() {
    with_vars(vec![("DOTS_PERF_PORT", Some("not-a-port"))], || {
        let result = ConfigLoader::new().from_env();
        assert!(matches!(result, Err(ConfigError::EnvError(_))));
    });
}

#[test]
fn test_env_value_failing_validation() {
    with_vars(vec![("DOTS_DURATION", Some("30s"))], || {
        let result = ConfigLoader::new().from_env();
        assert!(matches!(result, Err(ConfigError::DomainError { .. })));
    });
}

#[test]
fn test_custom_prefix() {
    with_vars(vec![("LOADTEST_DB_PASSWORD", Some("secret"))], || {
        let config = ConfigLoader::with_prefix("LOADTEST").from_env().unwrap();
        assert_eq!(config.database.password, "secret");
    });
}

#[test]
fn test_yaml_config_serialization() {
    let yaml = DotsConfig::generate_sample();
    let parsed: DotsConfig = serde_yaml::from_str(&yaml).unwrap();
    assert!(parsed.validate_all().is_ok());
    assert_eq!(parsed.run.load, ConcurrencyMode::FixedConnections { connections: 10 });
}

#[test]
fn test_comprehensive_config_file() {
    let yaml = r#"
run:
  workload: auction
  duration: 12h
  load:
    mode: target_cpu
    percent: 85
  creation_interval_minutes: 3
  summary_interval_minutes: 5
  operator_console: false

database:
  driver: sqlite
  url: "sqlite:///tmp/dots.db?mode=rwc"
  max_rows: 50000

perf:
  host: dbserver
  port: 9900

logging:
  level: warn
  log_dir: /tmp/dots-logs
  max_log_size: 1048576
"#;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    with_vars(Vec::<(&str, Option<&str>)>::new(), || {
        let config = ConfigLoader::new().load(Some(file.path())).unwrap();

        assert_eq!(config.run.workload, "auction");
        assert_eq!(config.run.duration, Duration::from_secs(12 * 3600));
        assert_eq!(config.run.load, ConcurrencyMode::TargetCpuPercent { percent: 85 });
        assert_eq!(config.run.creation_interval(), Duration::from_secs(180));
        assert_eq!(config.run.summary_interval(), Duration::from_secs(300));
        assert!(!config.run.operator_console);
        assert_eq!(config.database.max_rows, 50_000);
        assert_eq!(config.perf.address(), "dbserver:9900");
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.max_log_size, 1_048_576);
    });
}

#[test]
fn test_invalid_file_is_rejected() {
    let yaml = r#"
run:
  load:
    mode: target_cpu
    percent: 5
"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let result = ConfigLoader::new().from_file(file.path());
    assert!(result.is_err());
}

#[test]
fn test_missing_file() {
    let result = ConfigLoader::new().from_file("/nonexistent/dots.yaml");
    assert!(matches!(result, Err(ConfigError::FileReadError(_))));
}
