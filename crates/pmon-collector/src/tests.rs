use crate::logs::{LogEntry, LogSource};
use crate::process::{ProcessStats, ProcessTable};
use crate::project::{directory_usage, health_score, ProjectRegistration, ProjectSampler};
use crate::runner::SamplerRunner;
use crate::system::{summarize, SystemSampler};
use crate::Collector;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pmon_common::listener::SampleListener;
use pmon_common::types::{ProjectSnapshot, Sample, SampleCategory};
use pmon_storage::memory::MemoryStore;
use pmon_storage::{MonitorStore, SampleQuery};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct FakeProcesses {
    procs: Arc<Mutex<HashMap<u32, ProcessStats>>>,
}

impl FakeProcesses {
    fn spawn(&self, pid: u32, cpu: f64, memory_percent: f64) {
        self.procs.lock().unwrap().insert(
            pid,
            ProcessStats {
                pid,
                name: format!("proc-{pid}"),
                cpu_percent: cpu,
                memory_mb: 128.0,
                memory_percent,
                threads: 4,
                status: "run".to_string(),
                run_time_secs: 60,
            },
        );
    }

    fn kill(&self, pid: u32) {
        self.procs.lock().unwrap().remove(&pid);
    }
}

impl ProcessTable for FakeProcesses {
    fn refresh(&mut self) {}

    fn by_pid(&self, pid: u32) -> Option<ProcessStats> {
        self.procs.lock().unwrap().get(&pid).cloned()
    }

    fn by_name(&self, name: &str) -> Option<ProcessStats> {
        self.procs
            .lock()
            .unwrap()
            .values()
            .find(|p| p.name == name)
            .cloned()
    }

    fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        counts.insert("run".to_string(), self.procs.lock().unwrap().len());
        counts
    }
}

struct FakeLogs {
    entries: Vec<LogEntry>,
}

#[async_trait]
impl LogSource for FakeLogs {
    async fn entries_since(&self, _project_id: i64, since: DateTime<Utc>) -> anyhow::Result<Vec<LogEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn latest_error(&self, _project_id: i64) -> anyhow::Result<Option<LogEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.is_error())
            .max_by_key(|e| e.timestamp)
            .cloned())
    }
}

struct BrokenLogs;

#[async_trait]
impl LogSource for BrokenLogs {
    async fn entries_since(&self, _: i64, _: DateTime<Utc>) -> anyhow::Result<Vec<LogEntry>> {
        anyhow::bail!("log store offline")
    }

    async fn latest_error(&self, _: i64) -> anyhow::Result<Option<LogEntry>> {
        anyhow::bail!("log store offline")
    }
}

fn sampler_with(procs: &FakeProcesses) -> ProjectSampler {
    ProjectSampler::new().with_process_table(Box::new(procs.clone()))
}

fn value(samples: &[Sample], name: &str) -> Option<f64> {
    samples.iter().find(|s| s.name == name).map(|s| s.value)
}

fn running_snapshot(now: DateTime<Utc>) -> ProjectSnapshot {
    let mut s = ProjectSnapshot::empty("api", 1, now);
    s.is_running = true;
    s
}

async fn spawn_status_stub(status: u16) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}/health")
}

// Health score

#[test]
fn healthy_snapshot_scores_full_marks() {
    let now = Utc::now();
    assert_eq!(health_score(&running_snapshot(now), now), 100.0);
}

#[test]
fn not_running_costs_fifty() {
    let now = Utc::now();
    let snapshot = ProjectSnapshot::empty("api", 1, now);
    assert_eq!(health_score(&snapshot, now), 50.0);
}

#[test]
fn score_deductions_are_tiered() {
    let now = Utc::now();
    let mut s = running_snapshot(now);
    s.error_rate_percent = 7.0;
    s.cpu_percent = 75.0;
    s.memory_percent = 95.0;
    s.restart_count = 6;
    s.last_error_time = Some(now - Duration::minutes(10));
    // 100 - 10 - 10 - 15 - 5 - 5
    assert_eq!(health_score(&s, now), 55.0);

    s.error_rate_percent = 11.0;
    s.cpu_percent = 91.0;
    s.restart_count = 11;
    s.last_error_time = Some(now - Duration::minutes(1));
    // 100 - 20 - 15 - 15 - 10 - 10
    assert_eq!(health_score(&s, now), 30.0);
}

#[test]
fn probe_deductions() {
    let now = Utc::now();
    let mut s = running_snapshot(now);
    s.health_check_status = Some(true);
    s.health_check_response_time_ms = Some(2500.0);
    assert_eq!(health_score(&s, now), 95.0);
    s.health_check_response_time_ms = Some(6000.0);
    assert_eq!(health_score(&s, now), 90.0);
    s.health_check_status = Some(false);
    assert_eq!(health_score(&s, now), 85.0);
}

#[test]
fn score_is_clamped_at_zero() {
    let now = Utc::now();
    let mut s = ProjectSnapshot::empty("api", 1, now);
    s.error_rate_percent = 50.0;
    s.cpu_percent = 99.0;
    s.memory_percent = 99.0;
    s.restart_count = 20;
    s.last_error_time = Some(now);
    s.health_check_status = Some(false);
    assert_eq!(health_score(&s, now), 0.0);
}

// Registration and pid lifecycle

#[test]
fn add_project_rejects_empty_name() {
    let sampler = ProjectSampler::new();
    assert!(sampler.add_project(ProjectRegistration::new(" ", 1)).is_err());
}

#[test]
fn update_pid_unknown_project_fails() {
    let sampler = ProjectSampler::new();
    assert!(sampler.update_pid("ghost", Some(1)).is_err());
}

#[test]
fn pid_change_counts_as_restart() {
    let sampler = ProjectSampler::new();
    sampler.add_project(ProjectRegistration::new("api", 1)).unwrap();

    sampler.update_pid("api", Some(100)).unwrap();
    assert_eq!(sampler.restart_count("api"), Some(0));

    sampler.update_pid("api", Some(100)).unwrap();
    assert_eq!(sampler.restart_count("api"), Some(0));

    sampler.update_pid("api", Some(200)).unwrap();
    assert_eq!(sampler.restart_count("api"), Some(1));

    sampler.update_pid("api", None).unwrap();
    sampler.update_pid("api", Some(300)).unwrap();
    assert_eq!(sampler.restart_count("api"), Some(1));
}

#[tokio::test]
async fn dead_process_is_detected_and_next_pid_is_restart() {
    let procs = FakeProcesses::default();
    procs.spawn(100, 10.0, 5.0);
    let sampler = sampler_with(&procs);
    sampler
        .add_project(ProjectRegistration::new("api", 7).with_pid(100))
        .unwrap();

    let samples = sampler.sample_at(Utc::now()).await;
    assert_eq!(value(&samples, "is_running"), Some(1.0));

    procs.kill(100);
    let samples = sampler.sample_at(Utc::now()).await;
    assert_eq!(value(&samples, "is_running"), Some(0.0));
    assert_eq!(sampler.current_pid("api"), None);

    sampler.update_pid("api", Some(101)).unwrap();
    assert_eq!(sampler.restart_count("api"), Some(1));
}

#[tokio::test]
async fn zombie_counts_as_not_running() {
    let procs = FakeProcesses::default();
    procs.spawn(100, 0.0, 0.0);
    procs.procs.lock().unwrap().get_mut(&100).unwrap().status = "zombie".to_string();
    let sampler = sampler_with(&procs);
    sampler
        .add_project(ProjectRegistration::new("api", 7).with_pid(100))
        .unwrap();

    let samples = sampler.sample_at(Utc::now()).await;
    assert_eq!(value(&samples, "is_running"), Some(0.0));
}

// Sampling

#[tokio::test]
async fn samples_carry_project_tags_and_snapshot_is_recorded() {
    let procs = FakeProcesses::default();
    procs.spawn(100, 42.0, 12.5);
    let sampler = sampler_with(&procs);
    sampler
        .add_project(ProjectRegistration::new("api", 7).with_pid(100))
        .unwrap();
    assert!(sampler.record_custom_metric("api", "queue_depth", 17.0));
    assert!(!sampler.record_custom_metric("ghost", "queue_depth", 1.0));

    let samples = sampler.sample_at(Utc::now()).await;

    let cpu = samples.iter().find(|s| s.name == "cpu_percent").unwrap();
    assert_eq!(cpu.category, SampleCategory::Project);
    assert_eq!(cpu.value, 42.0);
    assert_eq!(cpu.project(), Some("api"));
    assert_eq!(cpu.tags.get("project_id").map(String::as_str), Some("7"));

    let custom = samples.iter().find(|s| s.name == "queue_depth").unwrap();
    assert_eq!(custom.category, SampleCategory::ProjectCustom);
    assert_eq!(custom.value, 17.0);

    assert!(value(&samples, "health_check_status").is_none());
    assert_eq!(value(&samples, "health_score"), Some(100.0));

    let latest = sampler.latest("api").unwrap();
    assert_eq!(latest.threads, 4);
    assert_eq!(sampler.summaries()[0].cpu_percent, 42.0);
}

#[tokio::test]
async fn log_metrics_feed_error_rate() {
    let now = Utc::now();
    let long_message = "x".repeat(800);
    let mut entries: Vec<LogEntry> = (0..8)
        .map(|i| LogEntry::new(now - Duration::seconds(i), "INFO", "ok"))
        .collect();
    entries.push(LogEntry::new(now - Duration::seconds(5), "error", "boom"));
    entries.push(LogEntry::new(now - Duration::seconds(2), "CRITICAL", &long_message));
    entries.push(LogEntry::new(now - Duration::minutes(10), "ERROR", "old"));

    let procs = FakeProcesses::default();
    procs.spawn(100, 1.0, 1.0);
    let sampler = sampler_with(&procs).with_log_source(Arc::new(FakeLogs { entries }));
    sampler
        .add_project(ProjectRegistration::new("api", 7).with_pid(100))
        .unwrap();

    sampler.sample_at(now).await;
    let snapshot = sampler.latest("api").unwrap();
    assert_eq!(snapshot.log_entries_per_minute, 10.0);
    assert_eq!(snapshot.error_rate_percent, 20.0);
    assert_eq!(snapshot.last_error.as_ref().map(|m| m.len()), Some(500));
    // 100 - 20 (error rate) - 10 (error just now)
    assert_eq!(snapshot.health_score, 70.0);
}

#[tokio::test]
async fn log_source_failure_does_not_abort_snapshot() {
    let procs = FakeProcesses::default();
    procs.spawn(100, 1.0, 1.0);
    let sampler = sampler_with(&procs).with_log_source(Arc::new(BrokenLogs));
    sampler
        .add_project(ProjectRegistration::new("api", 7).with_pid(100))
        .unwrap();

    let samples = sampler.sample_at(Utc::now()).await;
    assert_eq!(value(&samples, "is_running"), Some(1.0));
    assert_eq!(value(&samples, "error_rate_percent"), Some(0.0));
}

#[tokio::test]
async fn external_probe_reports_status() {
    let procs = FakeProcesses::default();
    procs.spawn(100, 1.0, 1.0);
    procs.spawn(200, 1.0, 1.0);
    let ok_url = spawn_status_stub(200).await;
    let bad_url = spawn_status_stub(503).await;
    let sampler = sampler_with(&procs);
    sampler
        .add_project(ProjectRegistration::new("good", 1).with_pid(100).with_health_check_url(&ok_url))
        .unwrap();
    sampler
        .add_project(ProjectRegistration::new("bad", 2).with_pid(200).with_health_check_url(&bad_url))
        .unwrap();
    sampler
        .add_project(ProjectRegistration::new("stopped", 3).with_health_check_url(&ok_url))
        .unwrap();

    sampler.sample_at(Utc::now()).await;

    let good = sampler.latest("good").unwrap();
    assert_eq!(good.health_check_status, Some(true));
    assert!(good.health_check_response_time_ms.is_some());

    let bad = sampler.latest("bad").unwrap();
    assert_eq!(bad.health_check_status, Some(false));
    assert_eq!(bad.health_check_error.as_deref(), Some("HTTP 503: Service Unavailable"));
    assert_eq!(bad.health_score, 85.0);

    let stopped = sampler.latest("stopped").unwrap();
    assert_eq!(stopped.health_check_status, None);
}

#[tokio::test]
async fn history_is_bounded_and_feeds_performance() {
    let procs = FakeProcesses::default();
    procs.spawn(100, 20.0, 1.0);
    let sampler = sampler_with(&procs).with_history_limit(3);
    sampler
        .add_project(ProjectRegistration::new("api", 7).with_pid(100))
        .unwrap();

    let now = Utc::now();
    for i in 0..4 {
        if i == 3 {
            procs.procs.lock().unwrap().get_mut(&100).unwrap().cpu_percent = 60.0;
        }
        sampler.sample_at(now - Duration::seconds(30 - i)).await;
    }
    let history = sampler.history("api", Duration::hours(1));
    assert_eq!(history.len(), 3);

    let perf = sampler.performance("api", Duration::hours(1)).unwrap();
    assert_eq!(perf.max_cpu_percent, 60.0);
    assert!((perf.avg_cpu_percent - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(perf.uptime_percent, 100.0);
    assert!(sampler.performance("ghost", Duration::hours(1)).is_none());
}

#[tokio::test]
async fn uptime_comes_from_the_process_start_time() {
    let procs = FakeProcesses::default();
    procs.spawn(100, 1.0, 1.0);
    procs.procs.lock().unwrap().get_mut(&100).unwrap().run_time_secs = 3 * 86_400;
    let sampler = sampler_with(&procs);
    sampler
        .add_project(ProjectRegistration::new("api", 7).with_pid(100))
        .unwrap();

    let samples = sampler.sample_at(Utc::now()).await;
    assert_eq!(value(&samples, "uptime_seconds"), Some(259_200.0));
    assert_eq!(sampler.latest("api").unwrap().uptime_seconds, 259_200.0);
}

#[tokio::test]
async fn removing_a_project_drops_its_history() {
    let procs = FakeProcesses::default();
    procs.spawn(100, 1.0, 1.0);
    let sampler = sampler_with(&procs);
    sampler
        .add_project(ProjectRegistration::new("api", 7).with_pid(100))
        .unwrap();
    sampler.sample_at(Utc::now()).await;
    assert_eq!(sampler.history("api", Duration::hours(1)).len(), 1);

    assert!(sampler.remove_project("api"));
    assert!(sampler.history("api", Duration::hours(1)).is_empty());
    assert!(sampler.performance("api", Duration::hours(1)).is_none());

    sampler
        .add_project(ProjectRegistration::new("api", 7).with_pid(100))
        .unwrap();
    assert!(sampler.history("api", Duration::hours(1)).is_empty());
}

#[test]
fn directory_usage_counts_log_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.py"), vec![b'a'; 1000]).unwrap();
    std::fs::create_dir(dir.path().join("logs")).unwrap();
    std::fs::write(dir.path().join("logs").join("app.log"), vec![b'l'; 500]).unwrap();

    let (total, logs) = directory_usage(dir.path());
    assert_eq!(total, 1500);
    assert_eq!(logs, 500);

    assert_eq!(directory_usage(&dir.path().join("missing")), (0, 0));
}

// System sampler

struct StaticCollector {
    name: &'static str,
    fail: bool,
}

impl Collector for StaticCollector {
    fn name(&self) -> &str {
        self.name
    }

    fn collect(&mut self, now: DateTime<Utc>) -> anyhow::Result<Vec<Sample>> {
        if self.fail {
            anyhow::bail!("sensor unavailable");
        }
        Ok(vec![
            Sample::new(SampleCategory::System, "cpu_usage_percent", 12.0, "percent").at(now),
            Sample::new(SampleCategory::System, "cpu_core_usage_percent", 10.0, "percent")
                .at(now)
                .with_tag("core", "0"),
            Sample::new(SampleCategory::System, "cpu_core_usage_percent", 14.0, "percent")
                .at(now)
                .with_tag("core", "1"),
        ])
    }
}

#[test]
fn failing_collector_is_isolated() {
    let sampler = SystemSampler::with_collectors(vec![
        Box::new(StaticCollector { name: "broken", fail: true }),
        Box::new(StaticCollector { name: "cpu", fail: false }),
    ]);
    assert!(sampler.summary().is_none());

    let samples = sampler.collect_at(Utc::now());
    assert_eq!(samples.len(), 3);

    let summary = sampler.summary().unwrap();
    assert_eq!(summary.cpu_usage_percent, 12.0);
    assert_eq!(summary.cpu_cores, 2);
}

#[test]
fn summary_prefers_root_mount() {
    let now = Utc::now();
    let disk = |mount: &str, name: &str, value: f64| {
        Sample::new(SampleCategory::Disk, name, value, "bytes")
            .at(now)
            .with_tag("mountpoint", mount)
    };
    let batch = vec![
        Sample::new(SampleCategory::System, "memory_usage_percent", 40.0, "percent").at(now),
        disk("/data", "disk_total_bytes", 900.0),
        disk("/data", "disk_usage_percent", 90.0),
        disk("/", "disk_total_bytes", 100.0),
        disk("/", "disk_usage_percent", 25.0),
    ];
    let summary = summarize(&batch).unwrap();
    assert_eq!(summary.memory_usage_percent, 40.0);
    assert_eq!(summary.disk_total_bytes, 100.0);
    assert_eq!(summary.disk_usage_percent, 25.0);
    assert!(summarize(&[]).is_none());
}

#[test]
fn real_collectors_produce_samples() {
    let sampler = SystemSampler::new();
    let samples = sampler.collect_at(Utc::now());
    assert!(samples.iter().any(|s| s.name == "memory_total_bytes" && s.value > 0.0));
    assert!(samples.iter().any(|s| s.name == "load_average_1m"));
    assert!(samples.iter().any(|s| s.name == "process_count_total"));
}

// Runner

#[derive(Default)]
struct RecordingListener {
    batches: Mutex<Vec<usize>>,
}

#[async_trait]
impl SampleListener for RecordingListener {
    async fn on_samples(&self, samples: &[Sample]) {
        self.batches.lock().unwrap().push(samples.len());
    }
}

#[tokio::test]
async fn runner_persists_and_notifies() {
    let store = Arc::new(MemoryStore::default());
    let sampler = Arc::new(SystemSampler::with_collectors(vec![Box::new(StaticCollector {
        name: "cpu",
        fail: false,
    })]));
    let runner = Arc::new(
        SamplerRunner::new(sampler, std::time::Duration::from_millis(20)).with_store(store.clone()),
    );
    let listener = Arc::new(RecordingListener::default());
    runner.add_listener(listener.clone());

    assert_eq!(runner.run_once().await, 3);
    assert_eq!(*listener.batches.lock().unwrap(), vec![3]);

    let now = Utc::now();
    let stored = store
        .query_samples(&SampleQuery::range(now - Duration::minutes(1), now).name("cpu_usage_percent"))
        .unwrap();
    assert_eq!(stored.len(), 1);

    assert!(runner.start());
    assert!(!runner.start());
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    assert!(runner.stop(std::time::Duration::from_secs(1)).await);
    assert!(listener.batches.lock().unwrap().len() >= 2);
}
