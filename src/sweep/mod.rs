//! Recurring background sweeps.
//!
//! One task per job: the queue sweep (expire stale ONGOING tokens, promote
//! waiters) and the seat-hold sweep (release lapsed holds). A failed cycle
//! logs and the next tick retries; nothing here is fatal to the process.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::config::SweepConfig;
use crate::services::queue::QueueManager;
use crate::services::reservation::SeatReservationCoordinator;

pub struct Sweeper {
    queue: Arc<QueueManager>,
    coordinator: Arc<SeatReservationCoordinator>,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new(
        queue: Arc<QueueManager>,
        coordinator: Arc<SeatReservationCoordinator>,
        config: SweepConfig,
    ) -> Self {
        Self {
            queue,
            coordinator,
            config,
        }
    }

    /// Start both sweep tasks. Run `recover_pending` before calling this so
    /// interrupted finalizes are settled before holds start lapsing.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let queue = self.queue;
        let mut queue_shutdown = shutdown_rx.clone();
        let queue_interval = self.config.interval;
        let queue_task = tokio::spawn(async move {
            let mut ticker = interval(queue_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = queue.sweep_expired().await {
                            err.log();
                        }
                    }
                    _ = queue_shutdown.changed() => break,
                }
            }
        });

        let coordinator = self.coordinator;
        let mut hold_shutdown = shutdown_rx;
        let hold_interval = self.config.interval;
        let hold_task = tokio::spawn(async move {
            let mut ticker = interval(hold_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = coordinator.release_expired_holds().await {
                            err.log();
                        }
                    }
                    _ = hold_shutdown.changed() => break,
                }
            }
        });

        info!(interval = ?self.config.interval, "Background sweeper started");
        SweeperHandle {
            shutdown: shutdown_tx,
            tasks: vec![queue_task, hold_task],
        }
    }
}

pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Background sweeper stopped");
    }
}
