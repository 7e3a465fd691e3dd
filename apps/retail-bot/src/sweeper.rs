//! # Session Sweeper
//!
//! Background task that expires idle sessions and releases reservations
//! nobody owns any more.
//!
//! Every `sweep_interval_secs` it tears down sessions idle for at least
//! `idle_timeout_secs` (skipping busy ones) and then releases journalled
//! reservations older than twice the idle timeout whose draft no live session
//! holds.

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::dispatcher::Dispatcher;

pub struct Sweeper {
    dispatcher: Dispatcher,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running [`Sweeper`].
#[derive(Clone)]
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Asks the sweeper to stop. A sweeper that already stopped is fine.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Sweeper already stopped");
        }
    }
}

impl Sweeper {
    pub fn new(dispatcher: Dispatcher) -> (Self, SweeperHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let sweeper = Sweeper {
            dispatcher,
            shutdown_rx,
        };

        (sweeper, SweeperHandle { shutdown_tx })
    }

    /// Runs until shut down. Spawn this as a background task.
    pub async fn run(mut self) {
        let period = self.dispatcher.context().config.session.sweep_interval();
        info!(?period, "Session sweeper starting");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.sweep().await,

                _ = self.shutdown_rx.recv() => {
                    info!("Session sweeper shutting down");
                    break;
                }
            }
        }

        info!("Session sweeper stopped");
    }

    async fn sweep(&self) {
        let expired = self.dispatcher.expire_idle(Instant::now()).await;
        if expired > 0 {
            info!(expired, "Expired idle sessions");
        }

        if let Err(e) = self.dispatcher.release_orphans().await {
            error!(error = %e, "Failed to release orphaned reservations");
        }
    }
}
