//! Cancellable background-job runner.
//!
//! Every background loop in the core (assignment scheduler tick, sweep
//! daily reset, priority re-check) runs as a [`Job`] on a [`JobRunner`].
//! Shutdown is a watch channel: after [`JobRunner::shutdown`] returns, no
//! job body starts again, though one already running may finish.

use chrono::Utc;
use shared::localtime::next_local_midnight;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// When a job fires.
#[derive(Debug, Clone, Copy)]
pub enum Schedule {
    /// Fixed period between runs.
    Every(Duration),
    /// At each local midnight for the given fixed UTC offset.
    ///
    /// The delay is recomputed before every sleep, so the firing re-anchors
    /// to the next midnight even after clock drift or a long job run.
    LocalMidnight { offset_secs: i32 },
}

impl Schedule {
    /// Delay until the next firing, measured from now.
    pub fn next_delay(&self) -> Duration {
        match self {
            Schedule::Every(period) => *period,
            Schedule::LocalMidnight { offset_secs } => {
                let now = Utc::now();
                let next = next_local_midnight(now, *offset_secs);
                (next - now).to_std().unwrap_or(Duration::from_secs(1))
            }
        }
    }
}

/// A background job owned by a runner.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Name used for logging.
    fn name(&self) -> &'static str;

    fn schedule(&self) -> Schedule;

    /// One firing. Failures are logged; the loop keeps ticking.
    async fn run(&self) -> anyhow::Result<()>;
}

/// Runs registered jobs until shut down.
pub struct JobRunner {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobRunner {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    /// Spawn a job loop immediately.
    pub fn spawn(&mut self, job: Arc<dyn Job>) {
        let mut shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let name = job.name();
            info!(job = name, "Job scheduled");

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                let delay = job.schedule().next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        let start = std::time::Instant::now();
                        match job.run().await {
                            Ok(()) => debug!(
                                job = name,
                                elapsed_ms = start.elapsed().as_millis() as u64,
                                "Job completed"
                            ),
                            Err(e) => error!(
                                job = name,
                                elapsed_ms = start.elapsed().as_millis() as u64,
                                error = %e,
                                "Job failed"
                            ),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!(job = name, "Job shutting down");
                            break;
                        }
                    }
                }
            }
        });

        self.handles.push(handle);
    }

    /// Signal all job loops to stop. Returns after signaling; no job body
    /// starts after this call.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all job loops to exit, bounded by `timeout`.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        let drain = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!("Job task panicked: {}", e);
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("Job shutdown timed out after {:?}", timeout);
        }
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}
