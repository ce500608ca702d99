//! Background task lifecycle.
//!
//! Every background task the bridge spawns (MQTT driver, export loop,
//! command forwarder, release check) is registered here by name and
//! cancelled deterministically on shutdown: a cooperative stop signal
//! first, then an abort for anything that does not wind down within the
//! grace period.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct NamedTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Registry owning every background task handle.
pub struct TaskRegistry {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<NamedTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            tasks: Vec::new(),
        }
    }

    /// A receiver that flips to `true` when shutdown begins. Cooperative
    /// tasks select on it.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// Spawn a task and keep its handle.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "spawning background task");
        self.tasks.push(NamedTask {
            name,
            handle: tokio::spawn(future),
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal every task to stop and wait up to `grace` for each; tasks
    /// that keep running past the grace period are aborted. In-flight
    /// network calls are left to fail via their own timeouts.
    pub async fn shutdown(mut self, grace: Duration) {
        let _ = self.stop_tx.send(true);

        for NamedTask { name, handle } in self.tasks.drain(..) {
            let abort = handle.abort_handle();
            match tokio::time::timeout(grace, handle).await {
                Ok(_) => debug!(task = name, "task stopped"),
                Err(_) => {
                    warn!(task = name, "task did not stop in time, aborting");
                    abort.abort();
                }
            }
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn cooperative_tasks_stop_on_signal() {
        let mut registry = TaskRegistry::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let mut stop = registry.stop_signal();
        let flag = stopped.clone();
        registry.spawn("cooperative", async move {
            loop {
                stop.changed().await.ok();
                if *stop.borrow() {
                    flag.store(true, Ordering::SeqCst);
                    return;
                }
            }
        });
        assert_eq!(registry.len(), 1);

        registry.shutdown(Duration::from_secs(1)).await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stubborn_tasks_are_aborted_after_the_grace_period() {
        let mut registry = TaskRegistry::new();
        registry.spawn("stubborn", async {
            std::future::pending::<()>().await;
        });

        // Must return despite the task never observing the stop signal.
        registry.shutdown(Duration::from_millis(50)).await;
    }
}
