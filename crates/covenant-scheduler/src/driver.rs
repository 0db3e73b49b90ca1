//! Tokio driver for the reconciliation pass
//!
//! The loop only feeds wall-clock time into `run_pass`; all scheduling logic
//! stays in the deterministic pass. A manual trigger channel lets callers
//! force an immediate pass, e.g. right after a renewal lands.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Duration};

use crate::NotificationScheduler;

pub struct SchedulerDriver {
    scheduler: Arc<NotificationScheduler>,
    trigger_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
}

impl SchedulerDriver {
    pub fn new(scheduler: Arc<NotificationScheduler>) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (trigger_tx, trigger_rx) = mpsc::channel(10);
        let driver = Arc::new(Self {
            scheduler,
            trigger_tx,
            running: Arc::new(RwLock::new(false)),
        });
        (driver, trigger_rx)
    }

    /// Request an immediate reconciliation pass.
    pub async fn trigger(&self) {
        let _ = self.trigger_tx.send(()).await;
    }

    /// Run the periodic loop until `stop` is called.
    pub async fn start(self: Arc<Self>, mut trigger_rx: mpsc::Receiver<()>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }
        tracing::info!("notification scheduler driver started");

        let mut tick = interval(Duration::from_secs(
            self.scheduler.config().reconcile_interval_secs,
        ));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(error) = self.scheduler.run_pass(chrono::Utc::now()) {
                        tracing::error!(error = %error, "reconciliation pass failed");
                    }
                }
                Some(_) = trigger_rx.recv() => {
                    if let Err(error) = self.scheduler.run_pass(chrono::Utc::now()) {
                        tracing::error!(error = %error, "triggered reconciliation pass failed");
                    }
                }
                else => break,
            }

            let running = self.running.read().await;
            if !*running {
                break;
            }
        }

        tracing::info!("notification scheduler driver stopped");
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_gate::AuthorizationGate;
    use covenant_ledger::AuditLedger;
    use covenant_lifecycle::{ContractStore, LifecycleEngine};
    use crate::SchedulerConfig;

    fn scheduler() -> Arc<NotificationScheduler> {
        let store = Arc::new(ContractStore::new());
        let gate = Arc::new(AuthorizationGate::new());
        let ledger = Arc::new(AuditLedger::new());
        let lifecycle = Arc::new(LifecycleEngine::new(store, gate, ledger));
        Arc::new(NotificationScheduler::new(
            lifecycle,
            SchedulerConfig {
                reconcile_interval_secs: 1,
                ..SchedulerConfig::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_trigger_and_stop() {
        let (driver, trigger_rx) = SchedulerDriver::new(scheduler());

        let handle = tokio::spawn(Arc::clone(&driver).start(trigger_rx));
        driver.trigger().await;
        driver.stop().await;
        // One more trigger unblocks the select so the loop observes the flag.
        driver.trigger().await;

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("driver should stop")
            .unwrap();
    }
}
