use crate::checks::custom::{self, CustomEvaluator};
use crate::checks::{log, network, outcome, process};
use crate::definition::{CheckKind, HealthCheckDefinition};
use crate::error::{HealthError, Result};
use chrono::{DateTime, Utc};
use pmon_common::listener::OutcomeListener;
use pmon_common::task::{spawn_periodic, TaskSlot};
use pmon_common::types::{HealthCheckOutcome, HealthStatus};
use pmon_storage::MonitorStore;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Scheduling knobs of a [`HealthProbeEngine`].
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// How often the loop looks for due checks.
    pub tick: Duration,
    /// Outcomes kept per check.
    pub history_limit: usize,
    /// Checks executing at the same time.
    pub max_concurrent: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            history_limit: 100,
            max_concurrent: 8,
        }
    }
}

#[derive(Default)]
struct ProbeState {
    checks: BTreeMap<String, HealthCheckDefinition>,
    results: BTreeMap<String, VecDeque<HealthCheckOutcome>>,
    last_run: HashMap<String, DateTime<Utc>>,
}

/// Runs registered health checks on their own intervals and keeps a
/// bounded outcome history per check.
pub struct HealthProbeEngine {
    state: Mutex<ProbeState>,
    evaluators: RwLock<HashMap<String, Arc<dyn CustomEvaluator>>>,
    listeners: RwLock<Vec<Arc<dyn OutcomeListener>>>,
    store: Option<Arc<dyn MonitorStore>>,
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    settings: ProbeSettings,
    task: TaskSlot,
}

impl HealthProbeEngine {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            state: Mutex::new(ProbeState::default()),
            evaluators: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            store: None,
            client: reqwest::Client::new(),
            permits: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
            settings,
            task: TaskSlot::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn MonitorStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_listener(&self, listener: Arc<dyn OutcomeListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub fn register_evaluator(&self, name: &str, evaluator: Arc<dyn CustomEvaluator>) {
        self.evaluators
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), evaluator);
    }

    pub fn remove_evaluator(&self, name: &str) -> bool {
        self.evaluators
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some()
    }

    /// Registers a check, replacing one with the same name. The check is
    /// due on the next tick.
    pub fn add_check(&self, definition: HealthCheckDefinition) -> Result<()> {
        definition.validate()?;
        let name = definition.name.clone();
        let kind = definition.kind.type_name();
        {
            let mut state = self.lock_state();
            state.results.entry(name.clone()).or_default();
            state.last_run.remove(&name);
            state.checks.insert(name.clone(), definition);
        }
        tracing::info!(check = %name, kind, "Added health check");
        Ok(())
    }

    /// Replaces the definition of an existing check; `definition.name` is
    /// overwritten with `name`.
    pub fn update_check(&self, name: &str, mut definition: HealthCheckDefinition) -> Result<()> {
        definition.name = name.to_string();
        definition.validate()?;
        let mut state = self.lock_state();
        if !state.checks.contains_key(name) {
            return Err(HealthError::UnknownCheck(name.to_string()));
        }
        state.last_run.remove(name);
        state.checks.insert(name.to_string(), definition);
        Ok(())
    }

    /// Removes a check and its history. Returns `false` if it did not exist.
    pub fn remove_check(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.lock_state();
            state.results.remove(name);
            state.last_run.remove(name);
            state.checks.remove(name).is_some()
        };
        if removed {
            tracing::info!(check = name, "Removed health check");
        }
        removed
    }

    pub fn get_check(&self, name: &str) -> Option<HealthCheckDefinition> {
        self.lock_state().checks.get(name).cloned()
    }

    pub fn list_checks(&self) -> Vec<HealthCheckDefinition> {
        self.lock_state().checks.values().cloned().collect()
    }

    /// Runs every enabled check whose interval has elapsed at `now`,
    /// at most `max_concurrent` at a time, and records the outcomes.
    pub async fn run_due_checks_at(self: &Arc<Self>, now: DateTime<Utc>) -> Vec<HealthCheckOutcome> {
        let due: Vec<HealthCheckDefinition> = {
            let mut state = self.lock_state();
            let due: Vec<HealthCheckDefinition> = state
                .checks
                .values()
                .filter(|c| c.enabled)
                .filter(|c| {
                    state.last_run.get(&c.name).map_or(true, |last| {
                        (now - *last).num_milliseconds() >= (c.interval_secs as i64) * 1000
                    })
                })
                .cloned()
                .collect();
            for check in &due {
                state.last_run.insert(check.name.clone(), now);
            }
            due
        };
        if due.is_empty() {
            return Vec::new();
        }

        let mut running = JoinSet::new();
        for definition in due {
            let engine = Arc::clone(self);
            let permits = Arc::clone(&self.permits);
            running.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                engine.execute(&definition).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(outcome) => {
                    self.record(&outcome).await;
                    outcomes.push(outcome);
                }
                Err(e) => tracing::error!(error = %e, "Health check task failed"),
            }
        }
        tracing::debug!(count = outcomes.len(), "Ran due health checks");
        outcomes
    }

    /// Runs one check immediately, outside its schedule, and records the
    /// outcome. `None` if no such check is registered.
    pub async fn run_check_now(&self, name: &str) -> Option<HealthCheckOutcome> {
        let definition = self.get_check(name)?;
        let outcome = self.execute(&definition).await;
        self.record(&outcome).await;
        Some(outcome)
    }

    /// Executes a definition with its timeout without recording anything.
    /// Never fails: errors and timeouts become `unknown` outcomes.
    pub async fn execute(&self, definition: &HealthCheckDefinition) -> HealthCheckOutcome {
        let started = Instant::now();
        let timeout = Duration::from_secs(definition.timeout_secs);
        let mut result = match tokio::time::timeout(timeout, self.dispatch(definition)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!(check = %definition.name, error = %e, "Health check failed");
                outcome(
                    &definition.name,
                    HealthStatus::Unknown,
                    format!("Check failed: {e}"),
                )
            }
            Err(_) => {
                tracing::warn!(check = %definition.name, timeout_secs = definition.timeout_secs, "Health check timed out");
                outcome(
                    &definition.name,
                    HealthStatus::Unknown,
                    format!("Check timed out after {}s", definition.timeout_secs),
                )
            }
        };
        result.latency_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        result.tags = definition.tags.clone();
        result
    }

    async fn dispatch(&self, definition: &HealthCheckDefinition) -> Result<HealthCheckOutcome> {
        let name = definition.name.as_str();
        match &definition.kind {
            CheckKind::Network(check) => {
                network::run(
                    &self.client,
                    name,
                    check,
                    Duration::from_secs(definition.timeout_secs),
                )
                .await
            }
            CheckKind::Process(check) => process::run(name, check).await,
            CheckKind::Log(check) => log::run(name, check).await,
            CheckKind::Custom(check) => {
                let evaluator = self
                    .evaluators
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&check.evaluator)
                    .cloned();
                Ok(custom::run(name, check, evaluator.as_deref()).await)
            }
        }
    }

    async fn record(&self, outcome: &HealthCheckOutcome) {
        {
            let mut state = self.lock_state();
            if !state.checks.contains_key(&outcome.check_name) {
                return;
            }
            let history = state.results.entry(outcome.check_name.clone()).or_default();
            history.push_back(outcome.clone());
            while history.len() > self.settings.history_limit {
                history.pop_front();
            }
        }

        if outcome.status != HealthStatus::Healthy {
            tracing::warn!(
                check = %outcome.check_name,
                status = %outcome.status,
                message = %outcome.message,
                "Health check not healthy"
            );
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.write_outcome(outcome) {
                tracing::warn!(check = %outcome.check_name, error = %e, "Failed to persist outcome");
            }
        }

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener.on_outcome(outcome).await;
        }
    }

    pub fn latest(&self, name: &str) -> Option<HealthCheckOutcome> {
        self.lock_state()
            .results
            .get(name)
            .and_then(|h| h.back().cloned())
    }

    /// Latest outcome of every registered check that has run.
    pub fn all_latest(&self) -> BTreeMap<String, HealthCheckOutcome> {
        let state = self.lock_state();
        state
            .checks
            .keys()
            .filter_map(|name| {
                state
                    .results
                    .get(name)
                    .and_then(|h| h.back())
                    .map(|o| (name.clone(), o.clone()))
            })
            .collect()
    }

    /// Outcomes of `name` within `window` before now, oldest first.
    pub fn history(&self, name: &str, window: chrono::Duration) -> Vec<HealthCheckOutcome> {
        let cutoff = Utc::now() - window;
        self.lock_state()
            .results
            .get(name)
            .map(|h| h.iter().filter(|o| o.timestamp >= cutoff).cloned().collect())
            .unwrap_or_default()
    }

    /// Worst latest status across checks (unhealthy > degraded > unknown >
    /// healthy); `unknown` when nothing has run.
    pub fn overall_status(&self) -> HealthStatus {
        HealthStatus::worst(self.all_latest().values().map(|o| o.status))
    }

    /// Starts the scheduling loop. Returns `false` if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let engine = Arc::clone(self);
        self.task.start_with(|| {
            spawn_periodic("health-probes", self.settings.tick, move || {
                let engine = Arc::clone(&engine);
                async move {
                    engine.run_due_checks_at(Utc::now()).await;
                }
            })
        })
    }

    pub async fn stop(&self, timeout: Duration) -> bool {
        self.task.stop(timeout).await
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

impl Default for HealthProbeEngine {
    fn default() -> Self {
        Self::new(ProbeSettings::default())
    }
}
