use async_trait::async_trait;
use pmon_common::listener::SampleListener;
use pmon_common::task::{spawn_periodic, TaskSlot};
use pmon_common::types::Sample;
use pmon_storage::MonitorStore;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Something that produces a batch of samples per tick.
///
/// `sample` never fails: sub-collections that error contribute no samples
/// and are logged by the implementation.
#[async_trait]
pub trait Sampler: Send + Sync {
    fn name(&self) -> &str;

    async fn sample(&self) -> Vec<Sample>;
}

/// Drives a [`Sampler`] on a fixed interval: collect, persist, notify.
pub struct SamplerRunner {
    sampler: Arc<dyn Sampler>,
    interval: Duration,
    store: Option<Arc<dyn MonitorStore>>,
    listeners: RwLock<Vec<Arc<dyn SampleListener>>>,
    task: TaskSlot,
}

impl SamplerRunner {
    pub fn new(sampler: Arc<dyn Sampler>, interval: Duration) -> Self {
        Self {
            sampler,
            interval,
            store: None,
            listeners: RwLock::new(Vec::new()),
            task: TaskSlot::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn MonitorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn add_listener(&self, listener: Arc<dyn SampleListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Runs one collection cycle and returns the number of samples produced.
    pub async fn run_once(&self) -> usize {
        let samples = self.sampler.sample().await;
        if samples.is_empty() {
            return 0;
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.write_samples(&samples) {
                tracing::warn!(sampler = self.sampler.name(), error = %e, "Failed to persist samples");
            }
        }

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener.on_samples(&samples).await;
        }

        tracing::debug!(sampler = self.sampler.name(), count = samples.len(), "Collected samples");
        samples.len()
    }

    /// Starts the background loop. Returns `false` if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let runner = Arc::clone(self);
        let name = format!("sampler:{}", self.sampler.name());
        self.task.start_with(|| {
            spawn_periodic(name, self.interval, move || {
                let runner = Arc::clone(&runner);
                async move {
                    runner.run_once().await;
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
