mod common;

use anyhow::{anyhow, Result};
use chrono::Duration as ChronoDuration;
use common::{fixed_status, service_with_cpu, RecordingChannel};
use pmon_alert::{AlertRule, CompareOp};
use pmon_collector::project::ProjectRegistration;
use pmon_common::types::{AlertStatus, HealthStatus, SampleCategory, Severity};
use pmon_health::definition::{CheckKind, CustomCheck, HealthCheckDefinition};
use pmon_storage::MonitorStore;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn cpu_rule() -> AlertRule {
    AlertRule::new("high-cpu", Severity::Critical, CompareOp::GreaterThan, 90.0)
        .for_metric(SampleCategory::System, "cpu_usage_percent")
        .with_channels(&["ops"])
}

fn queue_check(status: &str) -> HealthCheckDefinition {
    HealthCheckDefinition::new(
        "api-queue",
        CheckKind::Custom(CustomCheck {
            evaluator: "fixed".to_string(),
            params: json!({ "status": status }),
        }),
    )
}

#[tokio::test]
async fn breaching_host_sample_raises_one_alert() -> Result<()> {
    let cpu = Arc::new(Mutex::new(95.0));
    let service = service_with_cpu(cpu.clone());
    let channel = RecordingChannel::new("ops");
    service.add_channel(channel.clone());
    service.add_rule(cpu_rule())?;

    assert_eq!(service.collect_once().await, 1);

    let active = service.active_alerts();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].key, "high-cpu:system");
    assert_eq!(active[0].metric_value, Some(95.0));
    assert_eq!(channel.messages(), vec!["Alert triggered".to_string()]);

    let summary = service.system_summary().ok_or_else(|| anyhow!("no system summary"))?;
    assert_eq!(summary.cpu_usage_percent, 95.0);
    assert_eq!(service.system_history(ChronoDuration::minutes(5)).len(), 1);

    // Still breaching within the repeat interval: no new notification.
    *cpu.lock().unwrap() = 97.0;
    service.collect_once().await;
    assert_eq!(service.active_alerts().len(), 1);
    assert_eq!(service.active_alerts()[0].metric_value, Some(97.0));
    assert_eq!(channel.count(), 1);
    Ok(())
}

#[tokio::test]
async fn acknowledge_and_resolve_through_the_service() -> Result<()> {
    let service = service_with_cpu(Arc::new(Mutex::new(95.0)));
    let channel = RecordingChannel::new("ops");
    service.add_channel(channel.clone());
    service.add_rule(cpu_rule())?;
    service.collect_once().await;

    let id = service.active_alerts()[0].id.clone();
    assert!(service.acknowledge_alert(&id, "oncall"));
    assert!(!service.acknowledge_alert("missing", "oncall"));
    let stats = service.alert_statistics();
    assert_eq!(stats.by_status.get("acknowledged"), Some(&1));

    assert!(service.resolve_alert(&id, "fixed the runaway job", "oncall").await);
    assert!(service.active_alerts().is_empty());
    let history = service.alert_history(ChronoDuration::hours(1));
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, AlertStatus::Resolved);
    assert_eq!(history[0].resolved_by.as_deref(), Some("oncall"));

    let persisted = service.store().query_alerts(chrono::Utc::now() - ChronoDuration::hours(1))?;
    assert!(persisted.iter().any(|a| a.id == id && a.status == AlertStatus::Resolved));
    Ok(())
}

#[tokio::test]
async fn project_checks_are_tagged_and_feed_alerts() -> Result<()> {
    let service = service_with_cpu(Arc::new(Mutex::new(10.0)));
    let channel = RecordingChannel::new("ops");
    service.add_channel(channel.clone());
    service.register_evaluator("fixed", fixed_status());
    service.add_rule(
        AlertRule::new("check-failing", Severity::Warning, CompareOp::GreaterEqual, 2.0)
            .for_health_check(None)
            .with_project_filter("api")
            .with_channels(&["ops"]),
    )?;

    service.add_project(ProjectRegistration::new("api", 7), vec![queue_check("unhealthy")])?;
    assert_eq!(service.project_check_names("api"), vec!["api-queue".to_string()]);
    let definition = service
        .probes()
        .get_check("api-queue")
        .ok_or_else(|| anyhow!("project check not registered"))?;
    assert_eq!(definition.tags.get("project").map(String::as_str), Some("api"));

    let outcome = service
        .run_check_now("api-queue")
        .await
        .ok_or_else(|| anyhow!("check did not run"))?;
    assert_eq!(outcome.status, HealthStatus::Unhealthy);
    assert_eq!(service.overall_health(), HealthStatus::Unhealthy);
    assert_eq!(service.health_history("api-queue", ChronoDuration::minutes(5)).len(), 1);

    let active = service.active_alerts();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].key, "check-failing:api-queue");
    assert_eq!(active[0].project.as_deref(), Some("api"));
    assert_eq!(channel.messages(), vec!["Health check alert triggered".to_string()]);

    assert!(service.remove_project("api"));
    assert!(service.probes().get_check("api-queue").is_none());
    assert!(service.health_latest("api-queue").is_none());
    assert!(!service.remove_project("api"));
    Ok(())
}

#[tokio::test]
async fn re_registering_a_project_replaces_its_checks() -> Result<()> {
    let service = service_with_cpu(Arc::new(Mutex::new(10.0)));
    service.register_evaluator("fixed", fixed_status());

    service.add_project(ProjectRegistration::new("api", 7), vec![queue_check("healthy")])?;
    let mut replacement = queue_check("healthy");
    replacement.name = "api-db".to_string();
    service.add_project(ProjectRegistration::new("api", 7), vec![replacement])?;

    assert!(service.probes().get_check("api-queue").is_none());
    assert!(service.probes().get_check("api-db").is_some());
    assert_eq!(service.project_check_names("api"), vec!["api-db".to_string()]);
    Ok(())
}

#[tokio::test]
async fn invalid_project_checks_are_skipped() -> Result<()> {
    let service = service_with_cpu(Arc::new(Mutex::new(10.0)));
    let broken = queue_check("healthy").with_interval(0);
    service.add_project(ProjectRegistration::new("api", 7), vec![broken])?;

    assert!(service.project_check_names("api").is_empty());
    assert_eq!(service.project_summaries().len(), 1);
    assert!(service
        .add_project(ProjectRegistration::new(" ", 8), Vec::new())
        .is_err());
    Ok(())
}

#[tokio::test]
async fn project_queries_after_a_collection() -> Result<()> {
    let service = service_with_cpu(Arc::new(Mutex::new(10.0)));
    service.add_project(ProjectRegistration::new("api", 7), Vec::new())?;
    assert!(service.record_custom_metric("api", "queue_depth", 12.0));
    assert!(!service.record_custom_metric("web", "queue_depth", 12.0));

    service.collect_once().await;

    let snapshot = service
        .project_snapshot("api")
        .ok_or_else(|| anyhow!("no snapshot"))?;
    assert!(!snapshot.is_running);
    assert_eq!(snapshot.custom_metrics.get("queue_depth"), Some(&12.0));
    assert_eq!(service.project_history("api", ChronoDuration::minutes(5)).len(), 1);
    assert!(service
        .project_performance("api", ChronoDuration::minutes(5))
        .is_some());
    assert!(service.project_snapshot("web").is_none());

    let summaries = service.project_summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].project_name, "api");
    Ok(())
}

#[tokio::test]
async fn loops_start_and_stop() -> Result<()> {
    let service = service_with_cpu(Arc::new(Mutex::new(10.0)));
    assert!(!service.is_running());

    service.start();
    assert!(service.is_running());
    service.start();

    assert!(service.stop(Duration::from_secs(5)).await);
    assert!(!service.is_running());
    Ok(())
}
