//! Stale payment link reaper
//!
//! Scheduled sweep that expires abandoned PENDING records. The sweep and
//! any concurrent manual cleanup race harmlessly: the store's bulk expiry
//! is one conditional update, so records already expired by a competing
//! caller simply no longer match.

use crate::config::AppConfig;
use crate::infrastructure::adapters::notifications::{NotificationEvent, NotificationSink};
use crate::infrastructure::adapters::payment_store::PaymentLinkStore;
use crate::shared::error::AppResult;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Errors remembered for the health report
const MAX_RECENT_ERRORS: usize = 10;

/// Result of one cleanup pass
#[derive(Debug, Clone, Serialize)]
pub struct CleanupOutcome {
    pub expired: usize,
    pub affected_phones: usize,
    pub duration_ms: u64,
}

/// Rolling statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CleanupStats {
    pub total_runs: u64,
    pub total_expired: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub interval_minutes: u32,
    pub staleness_minutes: u32,
}

/// Health report for the reaper
#[derive(Debug, Clone, Serialize)]
pub struct ReaperHealth {
    pub is_running: bool,
    pub is_healthy: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub minutes_since_last_run: Option<i64>,
    pub recent_errors: Vec<String>,
}

/// Pending-record summary relative to the staleness threshold
#[derive(Debug, Clone, Serialize)]
pub struct PendingSummary {
    pub total: usize,
    pub stale: usize,
    pub active: usize,
}

/// State shared between the service handle and the spawned sweep task
struct SweepContext {
    config: Arc<AppConfig>,
    store: Arc<PaymentLinkStore>,
    notifications: Arc<dyn NotificationSink>,
    total_runs: AtomicU64,
    total_expired: AtomicU64,
    /// Epoch millis of the last successful run; 0 = never ran
    last_run_epoch_ms: AtomicU64,
    recent_errors: Mutex<Vec<String>>,
}

impl SweepContext {
    /// One sweep: expire all PENDING records older than the staleness
    /// threshold in a single conditional bulk update.
    async fn run_sweep(&self, trigger: &str) -> AppResult<CleanupOutcome> {
        let started = std::time::Instant::now();
        let now = Utc::now();
        let staleness = self.config.cleanup.staleness_minutes;
        let cutoff = now - chrono::Duration::minutes(staleness as i64);
        let reason = format!("auto-expired after {} minutes of inactivity", staleness);

        match self.store.expire_stale(cutoff, &reason, None).await {
            Ok(batch) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.total_runs.fetch_add(1, Ordering::Relaxed);
                self.total_expired.fetch_add(batch.expired as u64, Ordering::Relaxed);
                self.last_run_epoch_ms
                    .store(now.timestamp_millis() as u64, Ordering::Relaxed);

                info!(
                    trigger = %trigger,
                    expired = batch.expired,
                    affected_phones = batch.phones.len(),
                    duration_ms = duration_ms,
                    "Payment cleanup completed"
                );

                if batch.expired > self.config.cleanup.notable_threshold {
                    self.notifications
                        .notify(NotificationEvent::cleanup_summary(
                            batch.expired,
                            batch.phones.len(),
                            trigger,
                            duration_ms,
                        ))
                        .await;
                }

                Ok(CleanupOutcome {
                    expired: batch.expired,
                    affected_phones: batch.phones.len(),
                    duration_ms,
                })
            }
            Err(e) => {
                let mut errors = self.recent_errors.lock().await;
                errors.push(format!("{}: {}", trigger, e));
                let overflow = errors.len().saturating_sub(MAX_RECENT_ERRORS);
                if overflow > 0 {
                    errors.drain(..overflow);
                }
                Err(e)
            }
        }
    }

    fn last_run(&self) -> Option<DateTime<Utc>> {
        let ms = self.last_run_epoch_ms.load(Ordering::Relaxed);
        if ms == 0 {
            return None;
        }
        Utc.timestamp_millis_opt(ms as i64).single()
    }
}

/// Scheduled reaper for abandoned PENDING payment links
pub struct CleanupService {
    context: Arc<SweepContext>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupService {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<PaymentLinkStore>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            context: Arc::new(SweepContext {
                config,
                store,
                notifications,
                total_runs: AtomicU64::new(0),
                total_expired: AtomicU64::new(0),
                last_run_epoch_ms: AtomicU64::new(0),
                recent_errors: Mutex::new(Vec::new()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start the scheduled sweep. Idempotent: a second start is a warning,
    /// not a second task.
    pub async fn start_auto_cleanup(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Payment cleanup service is already running");
            return;
        }
        info!(
            interval_minutes = self.context.config.cleanup.interval_minutes,
            "Starting payment cleanup service"
        );
        let context = Arc::clone(&self.context);
        *task = Some(tokio::spawn(async move {
            let period =
                Duration::from_secs(context.config.cleanup.interval_minutes as u64 * 60);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = context.run_sweep("scheduled").await {
                    error!(error = %e, "Scheduled payment cleanup failed");
                }
            }
        }));
    }

    /// Stop the scheduled sweep.
    pub async fn stop_auto_cleanup(&self) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
            info!("Payment cleanup service stopped");
        }
    }

    /// Run one sweep now, outside the schedule.
    pub async fn perform_cleanup(&self, trigger: &str) -> AppResult<CleanupOutcome> {
        self.context.run_sweep(trigger).await
    }

    /// Manually trigger a full sweep.
    pub async fn force_cleanup(&self) -> AppResult<CleanupOutcome> {
        self.perform_cleanup("manual_force").await
    }

    /// Targeted sweep for a single phone's stale PENDING records.
    pub async fn cleanup_for_phone(&self, phone: &str) -> AppResult<usize> {
        let staleness = self.context.config.cleanup.staleness_minutes;
        let cutoff = Utc::now() - chrono::Duration::minutes(staleness as i64);
        let batch = self
            .context
            .store
            .expire_stale(cutoff, "auto-expired during targeted cleanup", Some(phone))
            .await?;
        info!(phone = %phone, expired = batch.expired, "Targeted cleanup completed");
        Ok(batch.expired)
    }

    pub async fn get_stats(&self) -> CleanupStats {
        CleanupStats {
            total_runs: self.context.total_runs.load(Ordering::Relaxed),
            total_expired: self.context.total_expired.load(Ordering::Relaxed),
            last_run: self.context.last_run(),
            is_running: self.task.lock().await.is_some(),
            interval_minutes: self.context.config.cleanup.interval_minutes,
            staleness_minutes: self.context.config.cleanup.staleness_minutes,
        }
    }

    /// Healthy iff the sweep is scheduled and the last successful run is
    /// within the health window (a reaper that has not yet run its first
    /// sweep counts as healthy).
    pub async fn health_check(&self) -> ReaperHealth {
        let is_running = self.task.lock().await.is_some();
        let last_run = self.context.last_run();
        let minutes_since = last_run.map(|at| (Utc::now() - at).num_minutes());
        let window = self.context.config.cleanup.health_window_minutes as i64;
        let is_healthy = is_running && minutes_since.map_or(true, |m| m < window);
        let recent_errors = {
            let errors = self.context.recent_errors.lock().await;
            errors.iter().rev().take(3).cloned().collect()
        };
        ReaperHealth {
            is_running,
            is_healthy,
            last_run,
            minutes_since_last_run: minutes_since,
            recent_errors,
        }
    }

    /// Snapshot of PENDING records relative to the staleness threshold.
    pub async fn pending_summary(&self) -> AppResult<PendingSummary> {
        let staleness = self.context.config.cleanup.staleness_minutes;
        let cutoff = Utc::now() - chrono::Duration::minutes(staleness as i64);
        let (total, stale) = self.context.store.pending_counts(cutoff).await?;
        Ok(PendingSummary {
            total,
            stale,
            active: total - stale,
        })
    }
}
