use anyhow::Result;
use pmon_server::config::LogFormat;
use pmon_server::{MonitorConfig, MonitoringService};
use std::io::Write;
use std::path::PathBuf;

fn example_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/pmon.example.toml")
}

fn write_config(content: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    Ok(file)
}

#[test]
fn example_config_parses() -> Result<()> {
    let path = example_path();
    let config = MonitorConfig::load(&path.to_string_lossy())?;

    assert_eq!(config.system.interval_secs, 30);
    assert_eq!(config.projects.interval_secs, 15);
    assert_eq!(config.health.max_concurrent, 8);
    assert_eq!(config.alerts.send_timeout_secs, 30);
    assert_eq!(config.retention.policy.health_hours, 168);
    assert_eq!(config.retention.store_capacity, 100_000);
    assert_eq!(config.channels.len(), 1);
    assert_eq!(config.channels[0].channel_type, "webhook");
    assert_eq!(config.rules.len(), 3);
    assert_eq!(config.health_checks.len(), 2);
    Ok(())
}

#[test]
fn example_config_builds_a_service() -> Result<()> {
    let config = MonitorConfig::load(&example_path().to_string_lossy())?;
    let service = MonitoringService::from_config(&config);

    assert_eq!(service.alerts().channel_names(), vec!["ops-webhook".to_string()]);
    assert_eq!(service.alerts().list_rules().len(), 3);
    assert_eq!(service.probes().list_checks().len(), 2);
    Ok(())
}

#[test]
fn empty_config_takes_defaults() -> Result<()> {
    let file = write_config("")?;
    let config = MonitorConfig::load(&file.path().to_string_lossy())?;

    assert_eq!(config.system.interval_secs, 30);
    assert_eq!(config.projects.history_limit, 1000);
    assert_eq!(config.projects.probe_timeout_secs, 10);
    assert_eq!(config.health.tick_secs, 1);
    assert_eq!(config.health.history_limit, 100);
    assert_eq!(config.alerts.tick_secs, 10);
    assert_eq!(config.alerts.history_limit, 1000);
    assert_eq!(config.retention.policy.metrics_days, 30);
    assert_eq!(config.retention.policy.alerts_days, 90);
    assert_eq!(config.retention.interval_hours, 24);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.channels.is_empty() && config.rules.is_empty() && config.health_checks.is_empty());
    Ok(())
}

#[test]
fn partial_sections_keep_other_defaults() -> Result<()> {
    let file = write_config(
        r#"
[alerts]
send_timeout_secs = 5

[retention]
metrics_days = 7

[logging]
format = "json"
"#,
    )?;
    let config = MonitorConfig::load(&file.path().to_string_lossy())?;

    assert_eq!(config.alerts.send_timeout_secs, 5);
    assert_eq!(config.alerts.tick_secs, 10);
    assert_eq!(config.retention.policy.metrics_days, 7);
    assert_eq!(config.retention.policy.alerts_days, 90);
    assert_eq!(config.retention.store_capacity, 100_000);
    assert_eq!(config.logging.format, LogFormat::Json);
    Ok(())
}

#[test]
fn invalid_entries_are_skipped() -> Result<()> {
    let file = write_config(
        r#"
[[channels]]
name = "pager"
type = "pager"

[[channels]]
name = "hooks"
type = "webhook"
config = { url = "" }

[[channels]]
name = "ops"
type = "webhook"
config = { url = "http://127.0.0.1:9/alerts" }

[[rules]]
name = "weird-op"
operator = "~"
threshold = 1.0

[[rules]]
name = "bad-category"
category = "gpu"
threshold = 1.0

[[rules]]
name = "load"
category = "system"
metric_name = "load_average_1m"
threshold = 8.0
notification_channels = ["ops"]

[[health_checks]]
name = "never"
type = "process"
process_name = "api"
interval_secs = 0

[[health_checks]]
name = "api-process"
type = "process"
process_name = "api"
"#,
    )?;
    let config = MonitorConfig::load(&file.path().to_string_lossy())?;
    let service = MonitoringService::from_config(&config);

    assert_eq!(service.alerts().channel_names(), vec!["ops".to_string()]);
    let rules = service.alerts().list_rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "load");
    let checks = service.probes().list_checks();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].name, "api-process");
    Ok(())
}

#[test]
fn missing_or_malformed_files_fail_to_load() -> Result<()> {
    assert!(MonitorConfig::load("/nonexistent/pmon.toml").is_err());

    let file = write_config("[system]\ninterval_secs = \"often\"\n")?;
    assert!(MonitorConfig::load(&file.path().to_string_lossy()).is_err());
    Ok(())
}
