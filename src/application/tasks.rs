//! Supervision of long-lived background tasks.
//!
//! Tasks receive a [`Shutdown`] handle and are expected to check it between units of work.
//! [`TaskSupervisor::shutdown`] signals every task and joins it; tasks that do not finish
//! within the grace period are aborted.

use std::time::Duration;

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, timeout_at},
};
use tracing::{error, info, warn};

/// Cooperative cancellation signal handed to each supervised task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested (or the supervisor is gone).
    pub async fn triggered(&mut self) {
        // An error means the sender was dropped, which also ends the task's useful life.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

pub struct TaskSupervisor {
    tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx,
            tasks: Vec::new(),
        }
    }

    /// A handle for work that is not spawned here but must observe the same signal.
    pub fn shutdown_handle(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }

    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.shutdown_handle()));
        info!(task = name, "background task started");
        self.tasks.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal shutdown and join every task, aborting those still running after `grace`.
    pub async fn shutdown(self, grace: Duration) {
        self.tx.send_replace(true);
        let deadline = Instant::now() + grace;

        for (name, mut handle) in self.tasks {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => info!(task = name, "background task stopped"),
                Ok(Err(err)) if err.is_panic() => {
                    error!(task = name, error = %err, "background task panicked")
                }
                Ok(Err(err)) => warn!(task = name, error = %err, "background task cancelled"),
                Err(_) => {
                    warn!(
                        task = name,
                        grace_ms = grace.as_millis() as u64,
                        "background task exceeded shutdown grace period, aborting"
                    );
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }
    }
}
