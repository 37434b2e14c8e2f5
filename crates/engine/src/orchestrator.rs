//! Historical sync job orchestrator.
//!
//! Jobs fan out into one checkpoint per location; a periodic, single-flight
//! worker claims one checkpoint per tick and advances it through its state
//! machine. The in-memory busy flag is only a fast path: the durable
//! coordination mechanism is the status column on the job/checkpoint rows,
//! which is why startup recovery resets anything left `active` by a crash.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use tillsync_core::{Channel, CheckpointId, DomainError, SyncJobId};
use tillsync_infra::{CheckpointStatus, JobStatus, Store, SyncCheckpoint, SyncJob};
use tillsync_merchants::ExternalMerchantRef;

use crate::engine::{SyncEngine, SyncOptions, SyncReport};
use crate::error::SyncError;

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Worker tick cadence.
    pub tick_interval: std::time::Duration,
    /// Failures before a checkpoint goes terminally failed.
    pub max_retries: u32,
    /// Backoff base; actual delay is base × 2^attempt.
    pub backoff_base: chrono::Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval: std::time::Duration::from_secs(30),
            max_retries: 5,
            backoff_base: chrono::Duration::seconds(30),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_tick_interval(mut self, interval: std::time::Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_base(mut self, base: chrono::Duration) -> Self {
        self.backoff_base = base;
        self
    }
}

/// Request to backfill a date range across all active locations.
#[derive(Debug, Clone)]
pub struct HistoricalSyncRequest {
    pub channel: Channel,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub force_full_sync: bool,
}

/// What one worker tick did, mostly for tests and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// Another tick is still running (single-flight guard).
    Busy,
    /// No open job.
    Idle,
    /// Open job, but every claimable checkpoint is still in backoff.
    Waiting,
    JobCompleted(SyncJobId),
    CheckpointCompleted(CheckpointId),
    CheckpointFailed(CheckpointId),
}

/// Owns the worker loop for historical sync jobs.
pub struct JobOrchestrator {
    store: Arc<dyn Store>,
    engine: Arc<SyncEngine>,
    config: OrchestratorConfig,
    busy: AtomicBool,
}

impl JobOrchestrator {
    pub fn new(store: Arc<dyn Store>, engine: Arc<SyncEngine>, config: OrchestratorConfig) -> Self {
        Self {
            store,
            engine,
            config,
            busy: AtomicBool::new(false),
        }
    }

    /// Create the job and one pending checkpoint per active location, then
    /// return immediately; processing happens on worker ticks.
    pub async fn start_historical_sync(
        &self,
        request: HistoricalSyncRequest,
    ) -> Result<SyncJobId, SyncError> {
        if request.range_start >= request.range_end {
            return Err(SyncError::Domain(DomainError::validation(
                "range_start must precede range_end",
            )));
        }

        let locations = self.store.list_active_locations(request.channel).await?;
        if locations.is_empty() {
            return Err(SyncError::Domain(DomainError::validation(
                "no active locations to sync",
            )));
        }

        let now = Utc::now();
        let job = SyncJob::new(
            request.channel,
            request.range_start,
            request.range_end,
            request.force_full_sync,
            now,
        );
        self.store.insert_job(&job).await?;

        for location in &locations {
            // The internal link comes from the explicit mapping; when absent
            // the checkpoint keeps a null link but retains the external id.
            let checkpoint = SyncCheckpoint::new(
                job.id,
                &location.external_merchant_id,
                &location.name,
                location.location_id,
                now,
            );
            self.store.insert_checkpoint(&checkpoint).await?;
        }

        tracing::info!(
            job_id = %job.id,
            channel = %request.channel,
            locations = locations.len(),
            "historical sync job created"
        );
        Ok(job.id)
    }

    /// Startup recovery: rows left `active` by a prior crash re-enter the
    /// claim queue. Must run before the first tick.
    pub async fn recover(&self) -> Result<u64, SyncError> {
        let reset = self.store.reset_stale_active(Utc::now()).await?;
        if reset > 0 {
            tracing::warn!(reset, "reset stale active jobs/checkpoints to pending");
        }
        Ok(reset)
    }

    /// One worker tick: claim the oldest open job, advance one checkpoint.
    pub async fn tick(&self) -> Result<TickOutcome, SyncError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Ok(TickOutcome::Busy);
        }
        let outcome = self.tick_inner().await;
        self.busy.store(false, Ordering::SeqCst);
        outcome
    }

    async fn tick_inner(&self) -> Result<TickOutcome, SyncError> {
        let Some(mut job) = self.store.find_oldest_open_job().await? else {
            return Ok(TickOutcome::Idle);
        };
        let now = Utc::now();

        if job.status == JobStatus::Pending {
            job.mark_active(now);
            self.store.update_job(&job).await?;
        }

        let Some(mut checkpoint) = self.store.claim_next_checkpoint(job.id, now).await? else {
            let checkpoints = self.store.checkpoints_for_job(job.id).await?;
            let open = checkpoints.iter().any(|c| {
                matches!(
                    c.status,
                    CheckpointStatus::Pending | CheckpointStatus::Retry | CheckpointStatus::Active
                )
            });
            if open {
                // Claimable rows exist but their backoff has not elapsed.
                return Ok(TickOutcome::Waiting);
            }
            job.mark_completed(now);
            self.store.update_job(&job).await?;
            tracing::info!(
                job_id = %job.id,
                processed = job.processed_orders,
                total = job.total_orders,
                "historical sync job completed"
            );
            return Ok(TickOutcome::JobCompleted(job.id));
        };

        match self.process_checkpoint(&job, &checkpoint).await {
            Ok(report) => {
                let finished = Utc::now();
                checkpoint.mark_completed(
                    report.orders_persisted(),
                    report.orders_fetched,
                    finished,
                );
                self.store.update_checkpoint(&checkpoint).await?;

                job.add_processed(report.orders_persisted(), report.orders_fetched, finished);
                self.store.update_job(&job).await?;

                tracing::info!(
                    job_id = %job.id,
                    checkpoint_id = %checkpoint.id,
                    location = %checkpoint.location_name,
                    persisted = report.orders_persisted(),
                    "checkpoint completed"
                );
                Ok(TickOutcome::CheckpointCompleted(checkpoint.id))
            }
            Err(e) => {
                // Processing failures drive the retry/failed transition
                // instead of crashing the worker loop.
                checkpoint.record_failure(
                    e.to_string(),
                    self.config.max_retries,
                    self.config.backoff_base,
                    Utc::now(),
                );
                self.store.update_checkpoint(&checkpoint).await?;

                tracing::warn!(
                    job_id = %job.id,
                    checkpoint_id = %checkpoint.id,
                    location = %checkpoint.location_name,
                    status = checkpoint.status.as_str(),
                    retry_count = checkpoint.retry_count,
                    error = %e,
                    "checkpoint processing failed"
                );
                Ok(TickOutcome::CheckpointFailed(checkpoint.id))
            }
        }
    }

    async fn process_checkpoint(
        &self,
        job: &SyncJob,
        checkpoint: &SyncCheckpoint,
    ) -> Result<SyncReport, SyncError> {
        let external = ExternalMerchantRef::new(&checkpoint.external_merchant_id, job.channel)?
            .with_name(&checkpoint.location_name);
        let merchant = self.engine.resolver().resolve(&external).await?;

        // Resume from the checkpoint's last confirmed position when set.
        let start = checkpoint
            .last_synced_at
            .map(|at| at.max(job.range_start))
            .unwrap_or(job.range_start);

        let options = SyncOptions {
            range: Some((start, job.range_end)),
            batch_size: None,
            force_full_sync: job.force_full_sync,
            cancel: None,
        };
        self.engine.sync_merchant(merchant.id, options).await
    }

    /// Cooperative cancellation: pending/retry checkpoints flip to
    /// cancelled; an active checkpoint finishes its current unit of work.
    pub async fn cancel_job(&self, job_id: SyncJobId) -> Result<(), SyncError> {
        let now = Utc::now();
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(SyncError::JobNotFound(job_id))?;

        job.mark_cancelled(now);
        self.store.update_job(&job).await?;
        let cancelled = self.store.cancel_open_checkpoints(job_id, now).await?;

        tracing::info!(job_id = %job_id, checkpoints_cancelled = cancelled, "job cancelled");
        Ok(())
    }

    /// Spawn the periodic worker loop: recovery pass first, then ticks until
    /// `shutdown` is notified.
    pub fn spawn(self: Arc<Self>, shutdown: Arc<Notify>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.recover().await {
                tracing::error!(error = %e, "startup recovery failed");
            }

            let mut interval = tokio::time::interval(self.config.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!("job worker started");

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("job worker received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        match self.tick().await {
                            Ok(TickOutcome::Idle) | Ok(TickOutcome::Busy) => {}
                            Ok(outcome) => tracing::debug!(?outcome, "worker tick"),
                            Err(e) => tracing::error!(error = %e, "worker tick failed"),
                        }
                    }
                }
            }

            tracing::info!("job worker stopped");
        })
    }
}
