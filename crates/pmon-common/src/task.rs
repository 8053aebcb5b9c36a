//! Background loop plumbing shared by the samplers, the probe engine, the
//! alert engine and the retention task.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A spawned loop together with its shutdown signal.
pub struct TaskHandle {
    shutdown_tx: watch::Sender<bool>,
    join_handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawns `body`, handing it the shutdown receiver it must watch.
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join_handle = tokio::spawn(body(shutdown_rx));
        Self {
            shutdown_tx,
            join_handle,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Raises the shutdown flag and waits up to `timeout` for the loop to
    /// exit. A loop still running after that is aborted and `false` is
    /// returned.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);
        let abort = self.join_handle.abort_handle();
        match tokio::time::timeout(timeout, self.join_handle).await {
            Ok(_) => true,
            Err(_) => {
                abort.abort();
                false
            }
        }
    }
}

/// Resolves once the shutdown flag is set or the sender is gone.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Runs `tick` every `period` until shutdown. A tick in progress always
/// completes; shutdown is only observed between ticks.
pub fn spawn_periodic<F, Fut>(task: impl Into<String>, period: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let task = task.into();
    TaskHandle::spawn(move |mut shutdown_rx| async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(task = %task, period_secs = period.as_secs_f64(), "Background task started");
        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                _ = shutdown_requested(&mut shutdown_rx) => break,
            }
        }
        tracing::info!(task = %task, "Background task stopped");
    })
}

/// Holds at most one running [`TaskHandle`], giving components an
/// idempotent `start` and a bounded `stop`.
#[derive(Default)]
pub struct TaskSlot {
    handle: Mutex<Option<TaskHandle>>,
}

impl TaskSlot {
    pub fn is_running(&self) -> bool {
        let guard = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Starts the task built by `start` unless one is already running.
    /// Returns `false` if nothing was started.
    pub fn start_with(&self, start: impl FnOnce() -> TaskHandle) -> bool {
        let mut guard = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *guard = Some(start());
        true
    }

    /// Stops the running task, if any. Returns `false` only if the task had
    /// to be aborted after `timeout`.
    pub async fn stop(&self, timeout: Duration) -> bool {
        let handle = {
            let mut guard = self.handle.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        match handle {
            Some(handle) => handle.shutdown(timeout).await,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn periodic_task_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let slot = TaskSlot::default();

        assert!(slot.start_with(|| {
            spawn_periodic("test", Duration::from_millis(10), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
        }));
        assert!(slot.is_running());
        assert!(!slot.start_with(|| unreachable!("second start must be ignored")));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(slot.stop(Duration::from_secs(1)).await);
        assert!(!slot.is_running());

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let slot = TaskSlot::default();
        assert!(slot.stop(Duration::from_millis(10)).await);
    }
}
