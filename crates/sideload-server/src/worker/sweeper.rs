//! Periodic retention sweep of the working directories.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use sideload_core::config::RetentionPolicy;
use sideload_core::retention::{SweepReport, sweep_all};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Handle for managing the sweeper worker.
pub struct SweeperHandle {
    /// Handle to the worker task.
    pub task_handle: tokio::task::JoinHandle<()>,
    /// Sender for the shutdown signal.
    shutdown_tx: watch::Sender<bool>,
}

impl SweeperHandle {
    /// Signals the worker to shut down and waits for it to finish.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        let _ = self.shutdown_tx.send(true);
        self.task_handle.await
    }
}

/// Starts the retention sweeper.
///
/// The first sweep runs immediately, then one every `policy.interval`.
pub fn start_retention_sweeper(dirs: Vec<PathBuf>, policy: RetentionPolicy) -> SweeperHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        run_sweeper(dirs, policy, shutdown_rx).await;
    });

    SweeperHandle {
        task_handle: handle,
        shutdown_tx,
    }
}

/// Runs a single sweep over `dirs` using the current time.
pub async fn sweep_once(dirs: &[PathBuf], max_age: Duration) -> SweepReport {
    sweep_all(dirs, max_age, SystemTime::now()).await
}

async fn run_sweeper(dirs: Vec<PathBuf>, policy: RetentionPolicy, mut shutdown_rx: watch::Receiver<bool>) {
    tracing::info!(
        "Retention sweeper started (max age {}s, every {}s)",
        policy.max_age.as_secs(),
        policy.interval.as_secs()
    );

    let mut interval = tokio::time::interval(policy.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Retention sweeper received shutdown signal");
                    break;
                }
            }
            _ = interval.tick() => {
                sweep_once(&dirs, policy.max_age).await;
            }
        }
    }
}
