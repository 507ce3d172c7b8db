//! Periodic warmup triggers.
//!
//! Runs the two recurring jobs on a dedicated background thread: the daily
//! batch once the configured send time has passed, and the pending-check
//! sweep on a fixed interval. A broadcast channel lets request handlers
//! fire either job manually.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::NaiveTime;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::db;

use super::WarmupEngine;

/// Interval between pending-check sweeps.
pub const CHECK_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// How often the daily send time is re-evaluated.
const BATCH_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Manually fired jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    DailyBatch,
    CheckPending,
}

/// Snapshot of the last job runs, for the scheduler-status surface.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub last_batch_at: Option<String>,
    pub last_batch_outcome: Option<String>,
    pub last_check_at: Option<String>,
    pub last_checked_count: Option<u32>,
}

/// Drives the engine's periodic operations.
pub struct WarmupScheduler {
    engine: Arc<tokio::sync::Mutex<WarmupEngine>>,
    daily_send_time: NaiveTime,
    check_interval: Duration,
    shutdown: Arc<AtomicBool>,
    status: Arc<Mutex<JobStatus>>,
}

impl WarmupScheduler {
    /// Creates a scheduler firing the batch at `daily_send_time` (UTC) and
    /// the check sweep every [`CHECK_SWEEP_INTERVAL`].
    pub fn new(engine: Arc<tokio::sync::Mutex<WarmupEngine>>, daily_send_time: NaiveTime) -> Self {
        Self {
            engine,
            daily_send_time,
            check_interval: CHECK_SWEEP_INTERVAL,
            shutdown: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(JobStatus::default())),
        }
    }

    /// Overrides the check-sweep interval. Used by tests.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Snapshot of the last job runs.
    pub fn status(&self) -> JobStatus {
        match self.status.lock() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Starts the job loop in a background thread.
    /// Accepts a trigger receiver for manual job requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<Trigger>) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let shutdown = Arc::clone(&self.shutdown);
        let status = Arc::clone(&self.status);
        let daily_send_time = self.daily_send_time;
        let check_interval = self.check_interval;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to build scheduler runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut batch_poll = tokio::time::interval(BATCH_POLL_INTERVAL);
                let mut check_tick = tokio::time::interval(check_interval);
                batch_poll.tick().await; // skip immediate first tick
                check_tick.tick().await;

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    let job = tokio::select! {
                        _ = batch_poll.tick() => {
                            if chrono::Utc::now().time() >= daily_send_time {
                                Some(Trigger::DailyBatch)
                            } else {
                                None
                            }
                        },
                        _ = check_tick.tick() => Some(Trigger::CheckPending),
                        Ok(trigger) = trigger_rx.recv() => {
                            info!("Manual {:?} triggered", trigger);
                            Some(trigger)
                        },
                    };

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    match job {
                        Some(Trigger::DailyBatch) => {
                            run_batch(&engine, &status).await;
                        }
                        Some(Trigger::CheckPending) => {
                            run_check(&engine, &status).await;
                        }
                        None => {}
                    }
                }
            });
        })
    }

    /// Signals the scheduler to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

async fn run_batch(engine: &tokio::sync::Mutex<WarmupEngine>, status: &Mutex<JobStatus>) {
    let mut engine = engine.lock().await;

    // The cheap guard keeps the minute poll quiet once today is done.
    match engine.should_send_today() {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            error!("Failed to evaluate send guard: {}", e);
            return;
        }
    }

    let outcome = match engine.send_daily_batch().await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Daily batch failed: {}", e);
            return;
        }
    };

    let summary = serde_json::to_string(&outcome)
        .unwrap_or_else(|_| "unserializable outcome".to_string());

    if let Ok(mut status) = status.lock() {
        status.last_batch_at = Some(db::now_rfc3339());
        status.last_batch_outcome = Some(summary);
    }
}

async fn run_check(engine: &tokio::sync::Mutex<WarmupEngine>, status: &Mutex<JobStatus>) {
    let mut engine = engine.lock().await;

    let report = match engine.check_pending_emails().await {
        Ok(report) => report,
        Err(e) => {
            error!("Pending-check sweep failed: {}", e);
            return;
        }
    };

    if let Ok(mut status) = status.lock() {
        status.last_check_at = Some(db::now_rfc3339());
        status.last_checked_count = Some(report.checked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::secrets::CredentialCipher;
    use crate::types::DeliveryStatus;
    use crate::warmup::testing::{StubChecker, StubGenerator, StubSender};
    use crate::warmup::WarmupSettings;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn test_engine() -> WarmupEngine {
        let db = Database::open_in_memory().unwrap();
        WarmupEngine::new(
            db,
            WarmupSettings {
                sender_addresses: vec!["a@s.example".to_string()],
                recipient_addresses: vec!["b@r.example".to_string()],
                min_send_delay_secs: 0,
                max_send_delay_secs: 0,
                check_delay_minutes: 0,
            },
            Arc::new(StubSender::default()),
            Arc::new(StubChecker::returning(DeliveryStatus::Inbox)),
            Arc::new(StubGenerator),
            Some(CredentialCipher::from_hex_key(TEST_KEY).unwrap()),
            StdRng::seed_from_u64(7),
        )
    }

    #[test]
    fn test_scheduler_shutdown() {
        let engine = Arc::new(tokio::sync::Mutex::new(test_engine()));
        let scheduler = WarmupScheduler::new(
            engine,
            NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
        )
        .with_check_interval(Duration::from_millis(50));

        let (trigger_tx, trigger_rx) = broadcast::channel(16);
        let handle = scheduler.start(trigger_rx);

        // Let it run briefly then stop.
        std::thread::sleep(Duration::from_millis(120));
        scheduler.stop();

        // Send a trigger to wake up the select loop so it sees the shutdown.
        let _ = trigger_tx.send(Trigger::CheckPending);

        handle.join().expect("scheduler thread panicked");
    }

    #[test]
    fn test_manual_check_updates_status() {
        let engine = Arc::new(tokio::sync::Mutex::new(test_engine()));
        let scheduler = WarmupScheduler::new(
            engine,
            NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
        )
        .with_check_interval(Duration::from_secs(3600));

        let (trigger_tx, trigger_rx) = broadcast::channel(16);
        let handle = scheduler.start(trigger_rx);

        trigger_tx.send(Trigger::CheckPending).unwrap();

        // Wait for the sweep to land in the status snapshot.
        let mut ran = false;
        for _ in 0..50 {
            std::thread::sleep(Duration::from_millis(20));
            if scheduler.status().last_check_at.is_some() {
                ran = true;
                break;
            }
        }
        assert!(ran, "manual check never ran");
        assert_eq!(scheduler.status().last_checked_count, Some(0));

        scheduler.stop();
        let _ = trigger_tx.send(Trigger::CheckPending);
        handle.join().expect("scheduler thread panicked");
    }
}
