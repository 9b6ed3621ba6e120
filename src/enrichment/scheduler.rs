//! Enrichment retry scheduler
//!
//! Each tick selects due enrichment rows, claims them one by one through the
//! store's conditional update, and hands every successful claim to the
//! processor. Any number of schedulers may poll the same store: a claim that
//! loses the race affects zero rows and the item is skipped.

use crate::config::EnrichmentRetryConfig;
use crate::enrichment::{EnrichmentKey, JobDetailEnrichment, RetryBackoff};
use crate::state::EnrichmentStatus;
use crate::storage::{EnrichmentStore, StorageResult};
use crate::ConfigError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Failure reported by a processor when it cannot take a claimed item
#[derive(Debug, Clone, Error)]
#[error("Enrichment {id} could not be dispatched: {message}")]
pub struct DispatchError {
    pub id: i64,
    pub message: String,
}

/// Consumer of claimed enrichment work
#[async_trait]
pub trait EnrichmentProcessor: Send + Sync {
    /// Starts processing a claimed row
    ///
    /// The processor owns the row from here on and reports back through
    /// [`EnrichmentRetryScheduler::record_outcome`].
    async fn process(&self, enrichment: &JobDetailEnrichment) -> Result<(), DispatchError>;
}

/// Counters for one scheduler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub candidates: usize,
    pub claimed: usize,
    pub conflicts: usize,
    pub guarded: usize,
    pub dispatch_failures: usize,
}

/// Periodically claims and re-dispatches due enrichment rows
pub struct EnrichmentRetryScheduler {
    store: Arc<dyn EnrichmentStore>,
    processor: Arc<dyn EnrichmentProcessor>,
    config: EnrichmentRetryConfig,
    key: EnrichmentKey,
    backoff: RetryBackoff,
}

impl EnrichmentRetryScheduler {
    /// Creates a scheduler for the enrichment key named in `config`
    pub fn new(
        store: Arc<dyn EnrichmentStore>,
        processor: Arc<dyn EnrichmentProcessor>,
        config: EnrichmentRetryConfig,
    ) -> Result<Self, ConfigError> {
        let key = EnrichmentKey::from_db_string(&config.enrichment_key).ok_or_else(|| {
            ConfigError::Validation(format!(
                "Unknown enrichment key '{}'",
                config.enrichment_key
            ))
        })?;
        let backoff = RetryBackoff::from_config(&config);

        Ok(Self {
            store,
            processor,
            config,
            key,
            backoff,
        })
    }

    pub fn key(&self) -> EnrichmentKey {
        self.key
    }

    pub fn backoff(&self) -> &RetryBackoff {
        &self.backoff
    }

    /// Runs one tick at the current time
    pub async fn dispatch_retries(&self) -> StorageResult<DispatchReport> {
        self.dispatch_retries_at(Utc::now()).await
    }

    /// Runs one tick as if the clock read `now`
    ///
    /// Rows are taken from the retry-scheduled set first, then from pending
    /// rows, up to the configured batch size in total.
    pub async fn dispatch_retries_at(&self, now: DateTime<Utc>) -> StorageResult<DispatchReport> {
        let mut report = DispatchReport::default();
        if !self.backoff.retries_enabled() {
            return Ok(report);
        }

        let guard_cutoff = in_flight_cutoff(now, &self.config);
        let limit = self.config.batch_size.max(1);

        let mut candidates = Vec::new();
        for status in [EnrichmentStatus::RetryScheduled, EnrichmentStatus::Pending] {
            let remaining = limit - candidates.len();
            if remaining == 0 {
                break;
            }
            candidates.extend(self.store.find_due(self.key, status, now, remaining)?);
        }
        report.candidates = candidates.len();

        for candidate in candidates {
            if let Some(cutoff) = guard_cutoff {
                if candidate.attempted_since(cutoff) {
                    report.guarded += 1;
                    continue;
                }
            }

            let updated = self.store.mark_retrying(
                candidate.id,
                candidate.status,
                EnrichmentStatus::Retrying,
                now,
            )?;
            if updated == 0 {
                tracing::debug!(
                    enrichment_id = candidate.id,
                    "Enrichment already claimed elsewhere, skipping"
                );
                report.conflicts += 1;
                continue;
            }
            report.claimed += 1;

            let claimed = JobDetailEnrichment {
                status: EnrichmentStatus::Retrying,
                last_attempt_at: Some(now),
                next_retry_at: None,
                updated_at: now,
                ..candidate
            };

            match self.processor.process(&claimed).await {
                Ok(()) => {
                    tracing::info!(
                        enrichment_id = claimed.id,
                        job_id = claimed.job_id,
                        retry_count = claimed.retry_count,
                        "Dispatched enrichment retry"
                    );
                }
                Err(e) => {
                    tracing::warn!(enrichment_id = claimed.id, "{}", e);
                    report.dispatch_failures += 1;
                    self.record_outcome(&claimed, false, now).await?;
                }
            }
        }

        Ok(report)
    }

    /// Writes the result of a processed attempt
    ///
    /// A success is terminal. A failure is rescheduled with backoff until the
    /// attempt budget is spent, then marked failed.
    ///
    /// # Returns
    ///
    /// The status written to the store
    pub async fn record_outcome(
        &self,
        enrichment: &JobDetailEnrichment,
        succeeded: bool,
        now: DateTime<Utc>,
    ) -> StorageResult<EnrichmentStatus> {
        if succeeded {
            self.store.record_attempt(
                enrichment.id,
                EnrichmentStatus::Done,
                enrichment.retry_count,
                None,
                now,
            )?;
            return Ok(EnrichmentStatus::Done);
        }

        let attempts = enrichment.retry_count.saturating_add(1);
        if !self.backoff.retries_enabled() || attempts >= self.backoff.max_attempts() {
            self.store
                .record_attempt(enrichment.id, EnrichmentStatus::Failed, attempts, None, now)?;
            tracing::warn!(
                enrichment_id = enrichment.id,
                attempts,
                "Enrichment gave up after exhausting attempts"
            );
            return Ok(EnrichmentStatus::Failed);
        }

        let delay = ChronoDuration::from_std(self.backoff.delay_for(attempts))
            .unwrap_or_else(|_| ChronoDuration::weeks(52));
        let next_retry_at = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.store.record_attempt(
            enrichment.id,
            EnrichmentStatus::RetryScheduled,
            attempts,
            Some(next_retry_at),
            now,
        )?;
        Ok(EnrichmentStatus::RetryScheduled)
    }

    /// Ticks on the configured interval until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.backoff.retries_enabled() {
            tracing::info!("Enrichment retries disabled, scheduler not started");
            return;
        }

        let mut ticker = tokio::time::interval(self.config.scheduler_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.dispatch_retries().await {
                        Ok(report) if report.candidates > 0 => {
                            tracing::info!(
                                candidates = report.candidates,
                                claimed = report.claimed,
                                conflicts = report.conflicts,
                                guarded = report.guarded,
                                "Enrichment retry tick"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!("Enrichment retry tick failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Enrichment retry scheduler stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// Rows attempted after the returned instant are still considered in flight
fn in_flight_cutoff(now: DateTime<Utc>, config: &EnrichmentRetryConfig) -> Option<DateTime<Utc>> {
    if config.in_flight_guard_ms == 0 {
        return None;
    }
    let guard = ChronoDuration::from_std(config.in_flight_guard()).ok()?;
    now.checked_sub_signed(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProcessor {
        seen: Mutex<Vec<i64>>,
        fail: bool,
    }

    #[async_trait]
    impl EnrichmentProcessor for RecordingProcessor {
        async fn process(&self, enrichment: &JobDetailEnrichment) -> Result<(), DispatchError> {
            self.seen.lock().unwrap().push(enrichment.id);
            if self.fail {
                return Err(DispatchError {
                    id: enrichment.id,
                    message: "queue offline".to_string(),
                });
            }
            Ok(())
        }
    }

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
    }

    fn config() -> EnrichmentRetryConfig {
        EnrichmentRetryConfig {
            batch_size: 10,
            in_flight_guard_ms: 5 * 60_000,
            max_attempts: 3,
            initial_delay_ms: 60_000,
            ..EnrichmentRetryConfig::default()
        }
    }

    fn scheduler(
        store: Arc<SqliteStore>,
        processor: Arc<RecordingProcessor>,
        config: EnrichmentRetryConfig,
    ) -> EnrichmentRetryScheduler {
        EnrichmentRetryScheduler::new(store, processor, config).unwrap()
    }

    #[tokio::test]
    async fn test_dispatches_due_rows_once() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let processor = Arc::new(RecordingProcessor::default());
        let due = store
            .insert_enrichment(1, EnrichmentKey::Status, EnrichmentStatus::RetryScheduled, Some(ts(0)))
            .unwrap();
        store
            .insert_enrichment(2, EnrichmentKey::Status, EnrichmentStatus::RetryScheduled, Some(ts(50)))
            .unwrap();

        let sched = scheduler(store.clone(), processor.clone(), config());
        let report = sched.dispatch_retries_at(ts(10)).await.unwrap();

        assert_eq!(report.candidates, 1);
        assert_eq!(report.claimed, 1);
        assert_eq!(*processor.seen.lock().unwrap(), vec![due]);

        let again = sched.dispatch_retries_at(ts(11)).await.unwrap();
        assert_eq!(again.claimed, 0);
        assert_eq!(processor.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_guard_skips_recent_attempts() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let processor = Arc::new(RecordingProcessor::default());
        let id = store
            .insert_enrichment(1, EnrichmentKey::Status, EnrichmentStatus::Retrying, None)
            .unwrap();
        store
            .record_attempt(id, EnrichmentStatus::RetryScheduled, 1, Some(ts(9)), ts(8))
            .unwrap();

        let sched = scheduler(store.clone(), processor.clone(), config());
        let report = sched.dispatch_retries_at(ts(10)).await.unwrap();

        assert_eq!(report.guarded, 1);
        assert_eq!(report.claimed, 0);
        assert!(processor.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_retries_do_nothing() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let processor = Arc::new(RecordingProcessor::default());
        store
            .insert_enrichment(1, EnrichmentKey::Status, EnrichmentStatus::RetryScheduled, Some(ts(0)))
            .unwrap();

        let cfg = EnrichmentRetryConfig {
            enabled: false,
            ..config()
        };
        let report = scheduler(store, processor.clone(), cfg)
            .dispatch_retries_at(ts(10))
            .await
            .unwrap();

        assert_eq!(report, DispatchReport::default());
        assert!(processor.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_schedulers_claim_each_row_once() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        for job_id in 0..6 {
            store
                .insert_enrichment(
                    job_id,
                    EnrichmentKey::Status,
                    EnrichmentStatus::RetryScheduled,
                    Some(ts(0)),
                )
                .unwrap();
        }

        let processor = Arc::new(RecordingProcessor::default());
        let a = Arc::new(scheduler(store.clone(), processor.clone(), config()));
        let b = Arc::new(scheduler(store.clone(), processor.clone(), config()));

        let (ra, rb) = tokio::join!(
            {
                let a = a.clone();
                async move { a.dispatch_retries_at(ts(10)).await.unwrap() }
            },
            {
                let b = b.clone();
                async move { b.dispatch_retries_at(ts(10)).await.unwrap() }
            }
        );

        assert_eq!(ra.claimed + rb.claimed, 6);
        let mut seen = processor.seen.lock().unwrap().clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 6);
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_rescheduled_then_failed() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let processor = Arc::new(RecordingProcessor {
            fail: true,
            ..RecordingProcessor::default()
        });
        let id = store
            .insert_enrichment(1, EnrichmentKey::Status, EnrichmentStatus::Pending, Some(ts(0)))
            .unwrap();
        let cfg = EnrichmentRetryConfig {
            in_flight_guard_ms: 0,
            max_attempts: 2,
            ..config()
        };
        let sched = scheduler(store.clone(), processor, cfg);

        let report = sched.dispatch_retries_at(ts(1)).await.unwrap();
        assert_eq!(report.dispatch_failures, 1);
        let row = store.get_enrichment(id).unwrap().unwrap();
        assert_eq!(row.status, EnrichmentStatus::RetryScheduled);
        assert_eq!(row.retry_count, 1);
        assert_eq!(row.next_retry_at, Some(ts(2)));

        sched.dispatch_retries_at(ts(2)).await.unwrap();
        let row = store.get_enrichment(id).unwrap().unwrap();
        assert_eq!(row.status, EnrichmentStatus::Failed);
        assert_eq!(row.retry_count, 2);
    }

    #[tokio::test]
    async fn test_record_success_is_terminal() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let processor = Arc::new(RecordingProcessor::default());
        let id = store
            .insert_enrichment(1, EnrichmentKey::Status, EnrichmentStatus::Retrying, None)
            .unwrap();
        let sched = scheduler(store.clone(), processor, config());
        let row = store.get_enrichment(id).unwrap().unwrap();

        let status = sched.record_outcome(&row, true, ts(3)).await.unwrap();
        assert_eq!(status, EnrichmentStatus::Done);
        assert!(store.get_enrichment(id).unwrap().unwrap().status.is_terminal());
    }

    #[tokio::test]
    async fn test_run_ticks_until_shutdown() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let processor = Arc::new(RecordingProcessor::default());
        let id = store
            .insert_enrichment(7, EnrichmentKey::Status, EnrichmentStatus::Pending, Some(ts(0)))
            .unwrap();
        let cfg = EnrichmentRetryConfig {
            scheduler_interval_ms: 10,
            ..config()
        };
        let sched = Arc::new(scheduler(store.clone(), processor.clone(), cfg));

        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn({
            let sched = sched.clone();
            async move { sched.run(shutdown).await }
        });

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while processor.seen.lock().unwrap().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        stop.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(*processor.seen.lock().unwrap(), vec![id]);
        let row = store.get_enrichment(id).unwrap().unwrap();
        assert_eq!(row.status, EnrichmentStatus::Retrying);
    }
}
