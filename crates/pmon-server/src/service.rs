use crate::config::MonitorConfig;
use crate::export;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use pmon_alert::{AlertEngine, AlertRule, AlertSettings};
use pmon_collector::project::{ProjectRegistration, ProjectSampler};
use pmon_collector::runner::SamplerRunner;
use pmon_collector::system::SystemSampler;
use pmon_common::listener::{OutcomeListener, SampleListener};
use pmon_common::task::{spawn_periodic, TaskSlot};
use pmon_common::types::{
    Alert, AlertStatistics, HealthCheckOutcome, HealthStatus, ProjectPerformance, ProjectSnapshot,
    ProjectSummary, Sample, SampleCategory, SystemSummary,
};
use pmon_health::definition::HealthCheckDefinition;
use pmon_health::{CustomEvaluator, HealthProbeEngine, ProbeSettings};
use pmon_notify::plugin::ChannelRegistry;
use pmon_notify::NotificationChannel;
use pmon_storage::memory::MemoryStore;
use pmon_storage::retention::{CleanupStats, RetentionPolicy};
use pmon_storage::{MonitorStore, SampleQuery};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Samples newer than this feed the text export.
const EXPORT_WINDOW_MINUTES: i64 = 5;

/// Owns and wires every monitoring component and exposes the read/write
/// surface the API layer needs.
pub struct MonitoringService {
    store: Arc<dyn MonitorStore>,
    system: Arc<SystemSampler>,
    system_runner: Arc<SamplerRunner>,
    projects: Arc<ProjectSampler>,
    project_runner: Arc<SamplerRunner>,
    probes: Arc<HealthProbeEngine>,
    alerts: Arc<AlertEngine>,
    retention: RetentionPolicy,
    cleanup_interval: Duration,
    cleanup_task: TaskSlot,
    /// Health checks registered on behalf of each project.
    project_checks: Mutex<HashMap<String, Vec<String>>>,
}

impl MonitoringService {
    /// Builds the service with host collectors and the sysinfo process
    /// table, then loads channels, rules and checks from `config`.
    pub fn from_config(config: &MonitorConfig) -> Self {
        let projects = ProjectSampler::new()
            .with_history_limit(config.projects.history_limit)
            .with_probe_timeout(Duration::from_secs(config.projects.probe_timeout_secs));
        let service = Self::with_samplers(config, SystemSampler::new(), projects);
        service.load_definitions(config);
        service
    }

    /// Builds and wires the service around the given samplers. Channels,
    /// rules and checks from `config` are not loaded.
    pub fn with_samplers(config: &MonitorConfig, system: SystemSampler, projects: ProjectSampler) -> Self {
        let store: Arc<dyn MonitorStore> = Arc::new(MemoryStore::new(config.retention.store_capacity));

        let alerts = Arc::new(
            AlertEngine::new(AlertSettings {
                tick: Duration::from_secs(config.alerts.tick_secs.max(1)),
                history_limit: config.alerts.history_limit,
                send_timeout: Duration::from_secs(config.alerts.send_timeout_secs.max(1)),
            })
            .with_store(Arc::clone(&store)),
        );

        let probes = Arc::new(
            HealthProbeEngine::new(ProbeSettings {
                tick: Duration::from_secs(config.health.tick_secs.max(1)),
                history_limit: config.health.history_limit,
                max_concurrent: config.health.max_concurrent.max(1),
            })
            .with_store(Arc::clone(&store)),
        );
        probes.add_listener(Arc::clone(&alerts) as Arc<dyn OutcomeListener>);

        let system = Arc::new(system);
        let system_runner = Arc::new(
            SamplerRunner::new(system.clone(), config.system_interval()).with_store(Arc::clone(&store)),
        );
        system_runner.add_listener(Arc::clone(&alerts) as Arc<dyn SampleListener>);

        let projects = Arc::new(projects);
        let project_runner = Arc::new(
            SamplerRunner::new(projects.clone(), config.project_interval()).with_store(Arc::clone(&store)),
        );
        project_runner.add_listener(Arc::clone(&alerts) as Arc<dyn SampleListener>);

        Self {
            store,
            system,
            system_runner,
            projects,
            project_runner,
            probes,
            alerts,
            retention: config.retention.policy.clone(),
            cleanup_interval: config.cleanup_interval(),
            cleanup_task: TaskSlot::default(),
            project_checks: Mutex::new(HashMap::new()),
        }
    }

    /// Loads configured channels, rules and checks. Invalid entries are
    /// logged and skipped.
    pub fn load_definitions(&self, config: &MonitorConfig) {
        let registry = ChannelRegistry::default();
        for channel in &config.channels {
            match registry.create_channel(&channel.channel_type, &channel.name, &channel.config) {
                Ok(created) => self.alerts.add_channel(Arc::from(created)),
                Err(e) => tracing::warn!(
                    channel = %channel.name,
                    channel_type = %channel.channel_type,
                    error = %e,
                    "Skipping invalid channel"
                ),
            }
        }

        let loaded = self.alerts.load_rules(config.rules.iter().cloned());
        tracing::info!(loaded, configured = config.rules.len(), "Alert rules loaded");

        for definition in &config.health_checks {
            if let Err(e) = self.probes.add_check(definition.clone()) {
                tracing::warn!(check = %definition.name, error = %e, "Skipping invalid health check");
            }
        }
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    pub fn probes(&self) -> &Arc<HealthProbeEngine> {
        &self.probes
    }

    pub fn store(&self) -> &Arc<dyn MonitorStore> {
        &self.store
    }

    // ---- Registration ----

    /// Starts monitoring a project and registers its custom health checks,
    /// each tagged with the project. Checks from a previous registration of
    /// the same project are replaced.
    pub fn add_project(&self, registration: ProjectRegistration, checks: Vec<HealthCheckDefinition>) -> Result<()> {
        let name = registration.name.clone();
        self.projects.add_project(registration)?;

        let mut registered = Vec::new();
        for definition in checks {
            let definition = definition.with_tag("project", &name);
            let check_name = definition.name.clone();
            match self.probes.add_check(definition) {
                Ok(()) => registered.push(check_name),
                Err(e) => tracing::warn!(project = %name, check = %check_name, error = %e, "Skipping invalid project check"),
            }
        }

        let previous = self.lock_project_checks().insert(name.clone(), registered.clone());
        for stale in previous.unwrap_or_default() {
            if !registered.contains(&stale) {
                self.probes.remove_check(&stale);
            }
        }
        tracing::info!(project = %name, checks = registered.len(), "Project registered");
        Ok(())
    }

    /// Stops monitoring a project and removes its health checks.
    pub fn remove_project(&self, name: &str) -> bool {
        let checks = self.lock_project_checks().remove(name).unwrap_or_default();
        for check in &checks {
            self.probes.remove_check(check);
        }
        let removed = self.projects.remove_project(name);
        if removed {
            tracing::info!(project = %name, checks = checks.len(), "Project unregistered");
        }
        removed
    }

    pub fn update_pid(&self, project: &str, pid: Option<u32>) -> Result<()> {
        self.projects.update_pid(project, pid)?;
        Ok(())
    }

    pub fn record_custom_metric(&self, project: &str, name: &str, value: f64) -> bool {
        self.projects.record_custom_metric(project, name, value)
    }

    pub fn project_check_names(&self, project: &str) -> Vec<String> {
        self.lock_project_checks().get(project).cloned().unwrap_or_default()
    }

    pub fn add_rule(&self, rule: AlertRule) -> Result<()> {
        self.alerts.add_rule(rule)?;
        Ok(())
    }

    pub fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        self.alerts.add_channel(channel);
    }

    pub fn add_check(&self, definition: HealthCheckDefinition) -> Result<()> {
        self.probes.add_check(definition)?;
        Ok(())
    }

    pub fn register_evaluator(&self, name: &str, evaluator: Arc<dyn CustomEvaluator>) {
        self.probes.register_evaluator(name, evaluator);
    }

    // ---- System ----

    pub fn system_summary(&self) -> Option<SystemSummary> {
        self.system.summary()
    }

    /// Stored host samples (system, disk and network) from the last
    /// `window`, oldest first.
    pub fn system_history(&self, window: ChronoDuration) -> Vec<Sample> {
        let now = Utc::now();
        match self.store.query_samples(&SampleQuery::range(now - window, now)) {
            Ok(samples) => samples
                .into_iter()
                .filter(|s| {
                    matches!(
                        s.category,
                        SampleCategory::System | SampleCategory::Disk | SampleCategory::Network
                    )
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "System history query failed");
                Vec::new()
            }
        }
    }

    // ---- Projects ----

    pub fn project_summaries(&self) -> Vec<ProjectSummary> {
        self.projects.summaries()
    }

    pub fn project_snapshot(&self, name: &str) -> Option<ProjectSnapshot> {
        self.projects.latest(name)
    }

    pub fn project_history(&self, name: &str, window: ChronoDuration) -> Vec<ProjectSnapshot> {
        self.projects.history(name, window)
    }

    pub fn project_performance(&self, name: &str, window: ChronoDuration) -> Option<ProjectPerformance> {
        self.projects.performance(name, window)
    }

    // ---- Health ----

    pub fn health_latest(&self, check: &str) -> Option<HealthCheckOutcome> {
        self.probes.latest(check)
    }

    pub fn health_all_latest(&self) -> BTreeMap<String, HealthCheckOutcome> {
        self.probes.all_latest()
    }

    pub fn health_history(&self, check: &str, window: ChronoDuration) -> Vec<HealthCheckOutcome> {
        self.probes.history(check, window)
    }

    pub fn overall_health(&self) -> HealthStatus {
        self.probes.overall_status()
    }

    pub async fn run_check_now(&self, check: &str) -> Option<HealthCheckOutcome> {
        self.probes.run_check_now(check).await
    }

    // ---- Alerts ----

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts.active_alerts()
    }

    pub fn alert_history(&self, window: ChronoDuration) -> Vec<Alert> {
        self.alerts.alert_history(window)
    }

    pub fn acknowledge_alert(&self, alert_id: &str, actor: &str) -> bool {
        self.alerts.acknowledge(alert_id, actor)
    }

    pub async fn resolve_alert(&self, alert_id: &str, message: &str, actor: &str) -> bool {
        self.alerts.resolve(alert_id, message, actor).await
    }

    pub fn alert_statistics(&self) -> AlertStatistics {
        self.alerts.statistics()
    }

    // ---- Export ----

    /// Text exposition of the latest samples, project states and open
    /// alert counts.
    pub fn export_text(&self) -> String {
        let since = Utc::now() - ChronoDuration::minutes(EXPORT_WINDOW_MINUTES);
        let samples = self.store.latest_samples(since).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Latest sample query failed");
            Vec::new()
        });
        export::render(&samples, &self.projects.summaries(), &self.alerts.active_alerts())
    }

    // ---- Lifecycle ----

    /// Runs one collection cycle of both samplers outside the loops.
    pub async fn collect_once(&self) -> usize {
        self.system_runner.run_once().await + self.project_runner.run_once().await
    }

    pub fn cleanup(&self) -> Option<CleanupStats> {
        run_cleanup(self.store.as_ref(), &self.retention)
    }

    /// Starts every background loop. Already running loops are left alone.
    pub fn start(&self) {
        self.system_runner.start();
        self.project_runner.start();
        self.probes.start();
        self.alerts.start();

        let store = Arc::clone(&self.store);
        let policy = self.retention.clone();
        let interval = self.cleanup_interval;
        self.cleanup_task.start_with(|| {
            spawn_periodic("retention", interval, move || {
                let store = Arc::clone(&store);
                let policy = policy.clone();
                async move {
                    run_cleanup(store.as_ref(), &policy);
                }
            })
        });
        tracing::info!("Monitoring started");
    }

    /// Stops every loop, giving each up to `timeout`. Returns `false` if
    /// any loop had to be aborted.
    pub async fn stop(&self, timeout: Duration) -> bool {
        let (system, projects, probes, alerts, cleanup) = tokio::join!(
            self.system_runner.stop(timeout),
            self.project_runner.stop(timeout),
            self.probes.stop(timeout),
            self.alerts.stop(timeout),
            self.cleanup_task.stop(timeout),
        );
        let clean = system && projects && probes && alerts && cleanup;
        if clean {
            tracing::info!("Monitoring stopped");
        } else {
            tracing::warn!("Monitoring stopped; some loops were aborted");
        }
        clean
    }

    pub fn is_running(&self) -> bool {
        self.system_runner.is_running()
            || self.project_runner.is_running()
            || self.probes.is_running()
            || self.alerts.is_running()
            || self.cleanup_task.is_running()
    }

    fn lock_project_checks(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.project_checks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn run_cleanup(store: &dyn MonitorStore, policy: &RetentionPolicy) -> Option<CleanupStats> {
    match store.cleanup(policy, Utc::now()) {
        Ok(stats) => {
            if stats != CleanupStats::default() {
                tracing::info!(
                    samples = stats.samples_deleted,
                    alerts = stats.alerts_deleted,
                    outcomes = stats.outcomes_deleted,
                    "Cleaned up expired data"
                );
            }
            Some(stats)
        }
        Err(e) => {
            tracing::error!(error = %e, "Cleanup failed");
            None
        }
    }
}
