//! Background refresh service.
//!
//! Runs [`Synchronizer::synchronize`] every `sync_interval` and whenever the
//! trigger is notified, until stopped. The trigger is shared with the
//! synchronizer, which notifies it when a coalesced request is pending.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::sync::synchronizer::{SyncOutcome, Synchronizer};

/// Periodic and on-demand refresher
pub struct SyncService {
    synchronizer: Arc<Synchronizer>,
    trigger: Arc<Notify>,
    period: Duration,
    /// Shutdown signal
    shutdown: Arc<RwLock<bool>>,
}

impl SyncService {
    /// Create a service refreshing every `period` and on `trigger`
    pub fn new(synchronizer: Arc<Synchronizer>, trigger: Arc<Notify>, period: Duration) -> Self {
        Self {
            synchronizer,
            trigger,
            period,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the service (returns immediately, runs in background)
    pub fn start(&self) -> JoinHandle<()> {
        let synchronizer = Arc::clone(&self.synchronizer);
        let trigger = Arc::clone(&self.trigger);
        let shutdown = Arc::clone(&self.shutdown);
        let period = self.period;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The mount refresh has already run
            ticker.tick().await;

            loop {
                let reason = tokio::select! {
                    _ = ticker.tick() => "interval",
                    _ = trigger.notified() => "request",
                };

                if *shutdown.read().await {
                    break;
                }

                match synchronizer.synchronize().await {
                    Ok(SyncOutcome::Completed) => {
                        tracing::debug!(reason, "Refresh completed");
                    }
                    Ok(SyncOutcome::Coalesced) => {
                        tracing::debug!(reason, "Refresh coalesced");
                    }
                    Err(e) => {
                        tracing::warn!(reason, error = %e, "Refresh failed, retrying on next tick");
                    }
                }
            }

            tracing::info!("Sync service stopped");
        })
    }

    /// Stop the service; it exits before its next refresh
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        self.trigger.notify_one();
    }
}
