use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::SyncEngine;

/// Periodic sync driver
pub struct SyncWorker {
    engine: SyncEngine,
    interval: Duration,
    shutdown: CancellationToken,
}

impl SyncWorker {
    pub fn new(engine: SyncEngine, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            engine,
            interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Sync worker started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Sync worker shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    let report = self.engine.sync().await;
                    tracing::trace!(?report, "Periodic sync tick");
                }
            }
        }

        tracing::info!("Sync worker stopped");
    }
}
