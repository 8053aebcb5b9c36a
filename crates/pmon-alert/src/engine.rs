use crate::error::{AlertError, Result};
use crate::rule::{AlertRule, AlertRuleConfig};
use crate::window::BreachWindow;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pmon_common::listener::{OutcomeListener, SampleListener};
use pmon_common::task::{spawn_periodic, TaskSlot};
use pmon_common::types::{
    Alert, AlertStatistics, AlertStatus, HealthCheckOutcome, Sample, Severity, Tags,
};
use pmon_notify::NotificationChannel;
use pmon_storage::MonitorStore;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// Period of the auto-resolve and housekeeping tick.
    pub tick: Duration,
    /// Resolved alerts kept in memory.
    pub history_limit: usize,
    /// Upper bound for one channel send.
    pub send_timeout: Duration,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(10),
            history_limit: 1000,
            send_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoticeKind {
    Triggered,
    Repeat,
    Escalation,
    Resolution,
}

/// A notification decided under the state lock and sent after it is
/// released.
struct Notice {
    kind: NoticeKind,
    alert: Alert,
    message: String,
    channels: Vec<String>,
}

/// What an observation contributes to a new or existing alert.
struct Observation<'a> {
    value: f64,
    title: String,
    description: String,
    project: Option<String>,
    tags: Tags,
    message: &'a str,
}

#[derive(Default)]
struct AlertState {
    rules: BTreeMap<String, AlertRule>,
    /// Open alerts by key.
    active: HashMap<String, Alert>,
    history: VecDeque<Alert>,
    suppressed: HashMap<String, DateTime<Utc>>,
    pending: BreachWindow,
}

impl AlertState {
    fn is_suppressed(&self, rule: &str, now: DateTime<Utc>) -> bool {
        self.suppressed.get(rule).is_some_and(|until| now < *until)
    }

    /// Lifts expired suppressions and reactivates the alerts they held.
    fn expire_suppressions(&mut self, now: DateTime<Utc>) -> Vec<Alert> {
        let expired: Vec<String> = self
            .suppressed
            .iter()
            .filter(|(_, until)| now >= **until)
            .map(|(rule, _)| rule.clone())
            .collect();
        let mut changed = Vec::new();
        for rule in expired {
            self.suppressed.remove(&rule);
            tracing::info!(rule = %rule, "Rule suppression expired");
            for alert in self.active.values_mut() {
                if alert.rule_name == rule && alert.status == AlertStatus::Suppressed {
                    alert.status = AlertStatus::Active;
                    alert.updated_at = now;
                    changed.push(alert.clone());
                }
            }
        }
        changed
    }

    fn key_of(&self, alert_id: &str) -> Option<String> {
        self.active
            .iter()
            .find(|(_, a)| a.id == alert_id)
            .map(|(key, _)| key.clone())
    }

    /// Moves the alert at `key` to history and plans its resolution notice.
    fn resolve_key(
        &mut self,
        key: &str,
        message: &str,
        actor: &str,
        now: DateTime<Utc>,
        history_limit: usize,
    ) -> Option<(Alert, Option<Notice>)> {
        let mut alert = self.active.remove(key)?;
        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(now);
        alert.resolved_by = Some(actor.to_string());
        alert.resolution_message = Some(message.to_string());
        alert.updated_at = now;
        self.push_history(alert.clone(), history_limit);
        tracing::info!(alert_id = %alert.id, key, resolved_by = actor, reason = message, "Alert resolved");

        let notice = self.rules.get(&alert.rule_name).and_then(|rule| {
            (!rule.notification_channels.is_empty()).then(|| Notice {
                kind: NoticeKind::Resolution,
                alert: alert.clone(),
                message: format!("Alert resolved: {message}"),
                channels: rule.notification_channels.clone(),
            })
        });
        Some((alert, notice))
    }

    fn push_history(&mut self, alert: Alert, limit: usize) {
        self.history.push_back(alert);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

/// Evaluates samples and health outcomes against alert rules and drives the
/// alert lifecycle: creation, repeat notification, escalation,
/// suppression, acknowledgement and resolution.
///
/// Evaluation runs on the caller's task. Decisions are taken under one
/// state lock; notifications are sent after it is released and
/// their bookkeeping is committed only when a channel accepted them.
pub struct AlertEngine {
    state: Mutex<AlertState>,
    channels: RwLock<BTreeMap<String, Arc<dyn NotificationChannel>>>,
    store: Option<Arc<dyn MonitorStore>>,
    /// Serializes decide/send/commit rounds.
    dispatch_gate: tokio::sync::Mutex<()>,
    settings: AlertSettings,
    task: TaskSlot,
}

impl AlertEngine {
    pub fn new(settings: AlertSettings) -> Self {
        Self {
            state: Mutex::new(AlertState::default()),
            channels: RwLock::new(BTreeMap::new()),
            store: None,
            dispatch_gate: tokio::sync::Mutex::new(()),
            settings,
            task: TaskSlot::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn MonitorStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, AlertState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Rules

    /// Adds a rule, replacing one with the same name.
    pub fn add_rule(&self, rule: AlertRule) -> Result<()> {
        rule.validate()?;
        let name = rule.name.clone();
        let mut state = self.lock_state();
        state.pending.clear_rule(&name);
        state.rules.insert(name.clone(), rule);
        tracing::info!(rule = %name, "Added alert rule");
        Ok(())
    }

    /// Replaces an existing rule; `rule.name` is overwritten with `name`.
    pub fn update_rule(&self, name: &str, mut rule: AlertRule) -> Result<()> {
        rule.name = name.to_string();
        rule.validate()?;
        let mut state = self.lock_state();
        if !state.rules.contains_key(name) {
            return Err(AlertError::UnknownRule(name.to_string()));
        }
        state.pending.clear_rule(name);
        state.rules.insert(name.to_string(), rule);
        tracing::info!(rule = name, "Updated alert rule");
        Ok(())
    }

    /// Converts and adds every config; invalid entries are skipped with a
    /// warning. Returns the number of rules added.
    pub fn load_rules(&self, configs: impl IntoIterator<Item = AlertRuleConfig>) -> usize {
        let mut loaded = 0;
        for cfg in configs {
            let name = cfg.name.clone();
            match AlertRule::try_from(cfg).and_then(|rule| self.add_rule(rule)) {
                Ok(()) => loaded += 1,
                Err(e) => tracing::warn!(rule = %name, error = %e, "Skipping alert rule"),
            }
        }
        loaded
    }

    /// Removes a rule and resolves its open alerts. Returns `false` if the
    /// rule did not exist.
    pub async fn remove_rule(&self, name: &str) -> bool {
        self.remove_rule_at(name, Utc::now()).await
    }

    pub async fn remove_rule_at(&self, name: &str, now: DateTime<Utc>) -> bool {
        let _gate = self.dispatch_gate.lock().await;
        let (resolved, notices) = {
            let mut state = self.lock_state();
            if !state.rules.contains_key(name) {
                return false;
            }
            let keys: Vec<String> = state
                .active
                .iter()
                .filter(|(_, a)| a.rule_name == name)
                .map(|(key, _)| key.clone())
                .collect();
            let mut resolved = Vec::new();
            let mut notices = Vec::new();
            for key in keys {
                if let Some((alert, notice)) =
                    state.resolve_key(&key, "Rule removed", "system", now, self.settings.history_limit)
                {
                    resolved.push(alert);
                    notices.extend(notice);
                }
            }
            state.rules.remove(name);
            state.suppressed.remove(name);
            state.pending.clear_rule(name);
            (resolved, notices)
        };
        tracing::info!(rule = name, resolved = resolved.len(), "Removed alert rule");
        self.persist(&resolved);
        self.deliver(notices, now).await;
        true
    }

    pub fn get_rule(&self, name: &str) -> Option<AlertRule> {
        self.lock_state().rules.get(name).cloned()
    }

    pub fn list_rules(&self) -> Vec<AlertRule> {
        self.lock_state().rules.values().cloned().collect()
    }

    // Channels

    /// Registers a channel under its own name, replacing any previous one.
    pub fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.name().to_string();
        tracing::info!(channel = %name, channel_type = channel.channel_type(), "Added notification channel");
        self.channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, channel);
    }

    pub fn remove_channel(&self, name: &str) -> bool {
        self.channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    // Ingestion

    pub async fn observe_metric(&self, sample: &Sample) {
        self.observe_metrics_at(std::slice::from_ref(sample), Utc::now()).await;
    }

    pub async fn observe_metric_at(&self, sample: &Sample, now: DateTime<Utc>) {
        self.observe_metrics_at(std::slice::from_ref(sample), now).await;
    }

    /// Evaluates a batch of samples against every enabled, unsuppressed
    /// rule. The scope of a sample is its `project` tag, or `system`; one
    /// alert is kept per rule and scope. The duration condition is tracked
    /// per series, so a calm sibling (another mount, core or interface)
    /// does not reset a breaching one.
    pub async fn observe_metrics_at(&self, samples: &[Sample], now: DateTime<Utc>) {
        let _gate = self.dispatch_gate.lock().await;
        let (changed, notices) = {
            let mut state = self.lock_state();
            let mut changed = state.expire_suppressions(now);
            let mut notices = Vec::new();
            let AlertState {
                rules,
                active,
                suppressed,
                pending,
                ..
            } = &mut *state;

            for sample in samples {
                for rule in rules.values() {
                    if !rule.enabled
                        || suppressed.get(&rule.name).is_some_and(|until| now < *until)
                        || !rule.applies_to_sample(sample)
                    {
                        continue;
                    }
                    let scope = sample.project().unwrap_or("system");
                    let key = format!("{}:{}", rule.name, scope);
                    let series = series_key(&key, sample);
                    if !pending.observe(&series, rule.breached(sample.value), rule.duration(), now) {
                        continue;
                    }
                    let observation = Observation {
                        value: sample.value,
                        title: format!("{}: {} = {}", rule.name, sample.name, sample.value),
                        description: rule.description.clone(),
                        project: sample.project().map(str::to_string),
                        tags: sample.tags.clone(),
                        message: "Alert triggered",
                    };
                    notices.extend(on_match(rule, active, &key, observation, now, &mut changed));
                }
            }
            (changed, notices)
        };
        self.persist(&changed);
        self.deliver(notices, now).await;
    }

    pub async fn observe_health(&self, outcome: &HealthCheckOutcome) {
        self.observe_health_at(outcome, Utc::now()).await;
    }

    /// Evaluates a health outcome against health-check rules, comparing the
    /// status ordinal (healthy 0 .. unknown 3) with the threshold. The scope
    /// is the check name.
    pub async fn observe_health_at(&self, outcome: &HealthCheckOutcome, now: DateTime<Utc>) {
        let _gate = self.dispatch_gate.lock().await;
        let (changed, notices) = {
            let mut state = self.lock_state();
            let mut changed = state.expire_suppressions(now);
            let mut notices = Vec::new();
            let AlertState {
                rules,
                active,
                suppressed,
                pending,
                ..
            } = &mut *state;

            let value = outcome.status.ordinal();
            for rule in rules.values() {
                if !rule.enabled
                    || suppressed.get(&rule.name).is_some_and(|until| now < *until)
                    || !rule.applies_to_outcome(outcome)
                {
                    continue;
                }
                let key = format!("{}:{}", rule.name, outcome.check_name);
                if !pending.observe(&key, rule.breached(value), rule.duration(), now) {
                    continue;
                }
                let mut tags = outcome.tags.clone();
                tags.insert("health_check".to_string(), outcome.check_name.clone());
                let observation = Observation {
                    value,
                    title: format!("{}: {} is {}", rule.name, outcome.check_name, outcome.status),
                    description: format!(
                        "{}\n\nHealth check message: {}",
                        rule.description, outcome.message
                    ),
                    project: outcome.tags.get("project").cloned(),
                    tags,
                    message: "Health check alert triggered",
                };
                notices.extend(on_match(rule, active, &key, observation, now, &mut changed));
            }
            (changed, notices)
        };
        self.persist(&changed);
        self.deliver(notices, now).await;
    }

    // Lifecycle

    pub async fn tick(&self) {
        self.tick_at(Utc::now()).await;
    }

    /// Auto-resolves alerts past their rule's `auto_resolve_after_minutes`,
    /// lifts expired suppressions and trims history.
    pub async fn tick_at(&self, now: DateTime<Utc>) {
        let _gate = self.dispatch_gate.lock().await;
        let (changed, notices) = {
            let mut state = self.lock_state();
            let mut changed = state.expire_suppressions(now);
            let due: Vec<String> = state
                .active
                .iter()
                .filter(|(_, alert)| {
                    state.rules.get(&alert.rule_name).is_some_and(|rule| {
                        rule.auto_resolve_after_minutes > 0
                            && now - alert.triggered_at
                                >= ChronoDuration::minutes(rule.auto_resolve_after_minutes as i64)
                    })
                })
                .map(|(key, _)| key.clone())
                .collect();

            let mut notices = Vec::new();
            for key in due {
                if let Some((alert, notice)) = state.resolve_key(
                    &key,
                    "Auto-resolved after timeout",
                    "system",
                    now,
                    self.settings.history_limit,
                ) {
                    changed.push(alert);
                    notices.extend(notice);
                }
            }
            while state.history.len() > self.settings.history_limit {
                state.history.pop_front();
            }
            state.pending.evict(now, ChronoDuration::days(1));
            (changed, notices)
        };
        if !changed.is_empty() {
            tracing::debug!(changed = changed.len(), "Alert tick");
        }
        self.persist(&changed);
        self.deliver(notices, now).await;
    }

    pub fn acknowledge(&self, alert_id: &str, actor: &str) -> bool {
        self.acknowledge_at(alert_id, actor, Utc::now())
    }

    /// Moves an `active` alert to `acknowledged`. Any other status is a
    /// no-op returning `false`.
    pub fn acknowledge_at(&self, alert_id: &str, actor: &str, now: DateTime<Utc>) -> bool {
        let acknowledged = {
            let mut state = self.lock_state();
            let Some(alert) = state
                .active
                .values_mut()
                .find(|a| a.id == alert_id && a.status == AlertStatus::Active)
            else {
                return false;
            };
            alert.status = AlertStatus::Acknowledged;
            alert.acknowledged_at = Some(now);
            alert.acknowledged_by = Some(actor.to_string());
            alert.updated_at = now;
            alert.clone()
        };
        tracing::info!(alert_id, acknowledged_by = actor, "Alert acknowledged");
        self.persist(std::slice::from_ref(&acknowledged));
        true
    }

    pub async fn resolve(&self, alert_id: &str, message: &str, actor: &str) -> bool {
        self.resolve_at(alert_id, message, actor, Utc::now()).await
    }

    /// Resolves an open alert of any status, notifying the rule's channels.
    /// Returns `false` if no open alert has `alert_id`.
    pub async fn resolve_at(&self, alert_id: &str, message: &str, actor: &str, now: DateTime<Utc>) -> bool {
        let _gate = self.dispatch_gate.lock().await;
        let resolved = {
            let mut state = self.lock_state();
            let Some(key) = state.key_of(alert_id) else {
                return false;
            };
            state.resolve_key(&key, message, actor, now, self.settings.history_limit)
        };
        let Some((alert, notice)) = resolved else {
            return false;
        };
        self.persist(std::slice::from_ref(&alert));
        self.deliver(notice.into_iter().collect(), now).await;
        true
    }

    pub fn suppress_rule(&self, name: &str, minutes: u32) -> bool {
        self.suppress_rule_at(name, minutes, Utc::now())
    }

    /// Stops `name` from matching for `minutes`. Its active alerts become
    /// `suppressed` and return to `active` when the suppression expires.
    /// Returns `false` for an unknown rule.
    pub fn suppress_rule_at(&self, name: &str, minutes: u32, now: DateTime<Utc>) -> bool {
        let changed = {
            let mut state = self.lock_state();
            if !state.rules.contains_key(name) {
                return false;
            }
            let until = now + ChronoDuration::minutes(minutes as i64);
            state.suppressed.insert(name.to_string(), until);
            state.pending.clear_rule(name);
            let mut changed = Vec::new();
            for alert in state.active.values_mut() {
                if alert.rule_name == name && alert.status == AlertStatus::Active {
                    alert.status = AlertStatus::Suppressed;
                    alert.updated_at = now;
                    changed.push(alert.clone());
                }
            }
            changed
        };
        tracing::info!(rule = name, minutes, alerts = changed.len(), "Suppressed alert rule");
        self.persist(&changed);
        true
    }

    // Queries

    /// Open alerts, newest first.
    pub fn active_alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.lock_state().active.values().cloned().collect();
        alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        alerts
    }

    /// An open or historical alert by id.
    pub fn get_alert(&self, alert_id: &str) -> Option<Alert> {
        let state = self.lock_state();
        state
            .active
            .values()
            .find(|a| a.id == alert_id)
            .or_else(|| state.history.iter().rev().find(|a| a.id == alert_id))
            .cloned()
    }

    /// Open and resolved alerts triggered within `window` before now,
    /// newest first.
    pub fn alert_history(&self, window: ChronoDuration) -> Vec<Alert> {
        let cutoff = Utc::now() - window;
        let state = self.lock_state();
        let mut alerts: Vec<Alert> = state
            .active
            .values()
            .chain(state.history.iter())
            .filter(|a| a.triggered_at >= cutoff)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        alerts
    }

    pub fn statistics(&self) -> AlertStatistics {
        let now = Utc::now();
        let state = self.lock_state();
        let mut by_severity: BTreeMap<String, usize> = [Severity::Critical, Severity::Warning, Severity::Info]
            .iter()
            .map(|s| (s.to_string(), 0))
            .collect();
        let mut by_status: BTreeMap<String, usize> = [
            AlertStatus::Active,
            AlertStatus::Acknowledged,
            AlertStatus::Suppressed,
        ]
        .iter()
        .map(|s| (s.to_string(), 0))
        .collect();
        for alert in state.active.values() {
            *by_severity.entry(alert.severity.to_string()).or_default() += 1;
            *by_status.entry(alert.status.to_string()).or_default() += 1;
        }
        let mut suppressed_rules: Vec<String> = state
            .suppressed
            .iter()
            .filter(|(_, until)| now < **until)
            .map(|(rule, _)| rule.clone())
            .collect();
        suppressed_rules.sort();

        AlertStatistics {
            active_alerts: state.active.len(),
            by_severity,
            by_status,
            suppressed_rules,
            total_rules: state.rules.len(),
            enabled_rules: state.rules.values().filter(|r| r.enabled).count(),
            history_size: state.history.len(),
        }
    }

    pub fn is_suppressed(&self, rule: &str) -> bool {
        self.lock_state().is_suppressed(rule, Utc::now())
    }

    // Background tick

    /// Starts the periodic tick. Returns `false` if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let engine = Arc::clone(self);
        self.task.start_with(|| {
            spawn_periodic("alert-tick", self.settings.tick, move || {
                let engine = Arc::clone(&engine);
                async move { engine.tick().await }
            })
        })
    }

    pub async fn stop(&self, timeout: Duration) -> bool {
        self.task.stop(timeout).await
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    // Dispatch

    fn persist(&self, alerts: &[Alert]) {
        let Some(store) = &self.store else {
            return;
        };
        for alert in alerts {
            if let Err(e) = store.upsert_alert(alert) {
                tracing::warn!(alert_id = %alert.id, error = %e, "Failed to persist alert");
            }
        }
    }

    /// Sends each notice to its channels, one bounded send per channel, and
    /// commits its bookkeeping if at least one channel accepted it.
    async fn deliver(&self, notices: Vec<Notice>, now: DateTime<Utc>) {
        for notice in notices {
            let channels: Vec<Arc<dyn NotificationChannel>> = {
                let registry = self.channels.read().unwrap_or_else(|e| e.into_inner());
                notice
                    .channels
                    .iter()
                    .filter_map(|name| {
                        let channel = registry.get(name).cloned();
                        if channel.is_none() {
                            tracing::warn!(channel = %name, rule = %notice.alert.rule_name, "Notification channel not found");
                        }
                        channel
                    })
                    .collect()
            };

            let mut accepted = 0usize;
            for channel in &channels {
                match tokio::time::timeout(
                    self.settings.send_timeout,
                    channel.send(&notice.alert, &notice.message),
                )
                .await
                {
                    Ok(true) => accepted += 1,
                    Ok(false) => {}
                    Err(_) => tracing::error!(
                        channel = channel.name(),
                        alert_id = %notice.alert.id,
                        timeout_secs = self.settings.send_timeout.as_secs_f64(),
                        "Notification send timed out"
                    ),
                }
            }

            if accepted == 0 {
                tracing::warn!(
                    alert_id = %notice.alert.id,
                    rule = %notice.alert.rule_name,
                    "No channel accepted the notification"
                );
                continue;
            }
            tracing::info!(
                alert_id = %notice.alert.id,
                channels = accepted,
                notice = %notice.message,
                "Notifications sent"
            );
            if let Some(updated) = self.commit(&notice, now) {
                self.persist(std::slice::from_ref(&updated));
            }
        }
    }

    fn commit(&self, notice: &Notice, now: DateTime<Utc>) -> Option<Alert> {
        let mut state = self.lock_state();
        let alert = if notice.kind == NoticeKind::Resolution {
            state.history.iter_mut().rev().find(|a| a.id == notice.alert.id)?
        } else {
            state.active.get_mut(&notice.alert.key).filter(|a| a.id == notice.alert.id)?
        };
        alert.notification_count += 1;
        alert.last_notified_at = Some(now);
        if notice.kind == NoticeKind::Escalation {
            alert.escalated = true;
        }
        Some(alert.clone())
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(AlertSettings::default())
    }
}

/// Window key of one series under an alert key: the metric name plus the
/// sample's full tag set, which is already sorted.
fn series_key(alert_key: &str, sample: &Sample) -> String {
    let tags: Vec<String> = sample.tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{alert_key}|{}|{}", sample.name, tags.join(","))
}

/// Creates the alert for `key` or updates the open one, and decides which
/// notification, if any, is due.
fn on_match(
    rule: &AlertRule,
    active: &mut HashMap<String, Alert>,
    key: &str,
    observation: Observation<'_>,
    now: DateTime<Utc>,
    changed: &mut Vec<Alert>,
) -> Option<Notice> {
    let Some(alert) = active.get_mut(key) else {
        let alert = Alert {
            id: pmon_common::id::next_id(),
            key: key.to_string(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            status: AlertStatus::Active,
            title: observation.title,
            description: observation.description,
            triggered_at: now,
            metric_value: Some(observation.value),
            threshold_value: Some(rule.threshold),
            project: observation.project,
            tags: observation.tags,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            resolution_message: None,
            last_notified_at: None,
            notification_count: 0,
            escalated: false,
            updated_at: now,
        };
        tracing::warn!(alert_id = %alert.id, key, severity = %alert.severity, title = %alert.title, "Alert triggered");
        active.insert(key.to_string(), alert.clone());
        changed.push(alert.clone());
        if rule.max_notifications == 0 || rule.notification_channels.is_empty() {
            return None;
        }
        return Some(Notice {
            kind: NoticeKind::Triggered,
            alert,
            message: observation.message.to_string(),
            channels: rule.notification_channels.clone(),
        });
    };

    alert.metric_value = Some(observation.value);
    alert.updated_at = now;
    if alert.status != AlertStatus::Active || alert.notification_count >= rule.max_notifications {
        return None;
    }

    let escalation_due = !alert.escalated
        && rule.escalate_after_minutes > 0
        && !rule.escalation_channels.is_empty()
        && now - alert.triggered_at >= ChronoDuration::minutes(rule.escalate_after_minutes as i64);
    if escalation_due {
        tracing::warn!(alert_id = %alert.id, key, "Alert escalated");
        return Some(Notice {
            kind: NoticeKind::Escalation,
            alert: alert.clone(),
            message: "Alert escalated".to_string(),
            channels: rule.escalation_channels.clone(),
        });
    }

    let repeat_due = alert.last_notified_at.map_or(true, |last| {
        now - last >= ChronoDuration::minutes(rule.repeat_interval_minutes as i64)
    });
    if !repeat_due {
        return None;
    }
    let channels = if alert.escalated {
        rule.escalation_channels.clone()
    } else {
        rule.notification_channels.clone()
    };
    if channels.is_empty() {
        return None;
    }
    let kind = if alert.notification_count == 0 {
        NoticeKind::Triggered
    } else {
        NoticeKind::Repeat
    };
    let message = if kind == NoticeKind::Triggered {
        observation.message.to_string()
    } else {
        "Alert still active".to_string()
    };
    Some(Notice {
        kind,
        alert: alert.clone(),
        message,
        channels,
    })
}

#[async_trait]
impl SampleListener for AlertEngine {
    async fn on_samples(&self, samples: &[Sample]) {
        self.observe_metrics_at(samples, Utc::now()).await;
    }
}

#[async_trait]
impl OutcomeListener for AlertEngine {
    async fn on_outcome(&self, outcome: &HealthCheckOutcome) {
        self.observe_health(outcome).await;
    }
}
