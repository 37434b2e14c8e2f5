//! Sync-state records: cursors, jobs and checkpoints.
//!
//! Status transitions live on the types as `mark_*`/`record_*` methods so
//! every caller moves through the same state machine. The status column is
//! the durable lease: a row found `active` at startup is evidence of a crash
//! and must be reset to `pending` by the recovery pass.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tillsync_core::{Channel, CheckpointId, LocationId, MerchantId, SyncJobId};

/// Which upstream dataset a cursor tracks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorDataType {
    Orders,
    Inventory,
}

impl CursorDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorDataType::Orders => "orders",
            CursorDataType::Inventory => "inventory",
        }
    }
}

impl core::str::FromStr for CursorDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orders" => Ok(CursorDataType::Orders),
            "inventory" => Ok(CursorDataType::Inventory),
            other => Err(format!("unknown cursor data type: {other}")),
        }
    }
}

/// Incremental watermark for one (merchant, channel, data type) stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub merchant_id: MerchantId,
    pub channel: Channel,
    pub data_type: CursorDataType,
    /// Upstream modification-time watermark (epoch ms). Monotonically
    /// non-decreasing except on an explicit forced full sync.
    pub last_modified_ms: i64,
    pub batch_size: u32,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl SyncCursor {
    pub fn new(
        merchant_id: MerchantId,
        channel: Channel,
        data_type: CursorDataType,
        batch_size: u32,
    ) -> Self {
        Self {
            merchant_id,
            channel,
            data_type,
            last_modified_ms: 0,
            batch_size,
            error_count: 0,
            last_error: None,
            last_run_at: None,
            last_success_at: None,
        }
    }

    /// Advance after a successful run. The watermark only ever moves
    /// forward here; callers that need a full re-sync go through
    /// [`SyncCursor::reset_for_full_sync`].
    pub fn record_success(&mut self, watermark_ms: i64, now: DateTime<Utc>) {
        self.last_modified_ms = self.last_modified_ms.max(watermark_ms);
        self.error_count = 0;
        self.last_error = None;
        self.last_run_at = Some(now);
        self.last_success_at = Some(now);
    }

    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.error_count += 1;
        self.last_error = Some(error.into());
        self.last_run_at = Some(now);
    }

    /// Explicit full-sync escape hatch: the only path that rewinds.
    pub fn reset_for_full_sync(&mut self) {
        self.last_modified_ms = 0;
    }
}

/// Historical sync job lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Active)
    }
}

impl core::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "active" => Ok(JobStatus::Active),
            "completed" => Ok(JobStatus::Completed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A historical sync spanning a date range and a set of locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: SyncJobId,
    pub channel: Channel,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub force_full_sync: bool,
    pub status: JobStatus,
    pub processed_orders: u64,
    pub total_orders: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn new(
        channel: Channel,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        force_full_sync: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SyncJobId::new(),
            channel,
            range_start,
            range_end,
            force_full_sync,
            status: JobStatus::Pending,
            processed_orders: 0,
            total_orders: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_active(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Active;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.updated_at = now;
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.updated_at = now;
    }

    pub fn add_processed(&mut self, processed: u64, total: u64, now: DateTime<Utc>) {
        self.processed_orders += processed;
        self.total_orders += total;
        self.updated_at = now;
    }
}

/// Per-location checkpoint lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Pending,
    Active,
    Completed,
    Retry,
    Failed,
    Cancelled,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Active => "active",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Retry => "retry",
            CheckpointStatus::Failed => "failed",
            CheckpointStatus::Cancelled => "cancelled",
        }
    }

    /// Eligible for a worker claim.
    pub fn is_claimable(&self) -> bool {
        matches!(self, CheckpointStatus::Pending | CheckpointStatus::Retry)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckpointStatus::Completed | CheckpointStatus::Failed | CheckpointStatus::Cancelled
        )
    }
}

impl core::str::FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CheckpointStatus::Pending),
            "active" => Ok(CheckpointStatus::Active),
            "completed" => Ok(CheckpointStatus::Completed),
            "retry" => Ok(CheckpointStatus::Retry),
            "failed" => Ok(CheckpointStatus::Failed),
            "cancelled" => Ok(CheckpointStatus::Cancelled),
            other => Err(format!("unknown checkpoint status: {other}")),
        }
    }
}

/// One location's share of a historical sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub id: CheckpointId,
    pub job_id: SyncJobId,
    /// Always retained, even when no internal location mapping exists.
    pub external_merchant_id: String,
    pub location_id: Option<LocationId>,
    pub location_name: String,
    pub status: CheckpointStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub processed_orders: u64,
    pub total_orders: u64,
    /// Resume point: the engine continues from here after a partial run.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Earliest time the next claim may pick this row up (backoff).
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncCheckpoint {
    pub fn new(
        job_id: SyncJobId,
        external_merchant_id: impl Into<String>,
        location_name: impl Into<String>,
        location_id: Option<LocationId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CheckpointId::new(),
            job_id,
            external_merchant_id: external_merchant_id.into(),
            location_id,
            location_name: location_name.into(),
            status: CheckpointStatus::Pending,
            retry_count: 0,
            last_error: None,
            processed_orders: 0,
            total_orders: 0,
            last_synced_at: None,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_active(&mut self, now: DateTime<Utc>) {
        self.status = CheckpointStatus::Active;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, processed: u64, total: u64, now: DateTime<Utc>) {
        self.status = CheckpointStatus::Completed;
        self.processed_orders = processed;
        self.total_orders = total;
        self.last_error = None;
        self.next_attempt_at = None;
        self.last_synced_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = CheckpointStatus::Cancelled;
        self.next_attempt_at = None;
        self.updated_at = now;
    }

    /// Record a processing failure: retry with exponential backoff below
    /// `max_retries`, terminal `failed` at the cap.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        max_retries: u32,
        backoff_base: Duration,
        now: DateTime<Utc>,
    ) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.updated_at = now;

        if self.retry_count < max_retries {
            // backoff_base × 2^attempt, capped so the shift cannot overflow.
            let factor = 1i64 << self.retry_count.min(16);
            self.status = CheckpointStatus::Retry;
            self.next_attempt_at = Some(now + backoff_base * factor as i32);
        } else {
            self.status = CheckpointStatus::Failed;
            self.next_attempt_at = None;
        }
    }

    /// Whether a claim at `now` may pick this checkpoint up.
    pub fn is_runnable(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable()
            && self.next_attempt_at.is_none_or(|at| at <= now)
    }

    /// Progress as a whole percentage, for the operational surface.
    pub fn progress_percent(&self) -> u8 {
        if self.total_orders == 0 {
            return match self.status {
                CheckpointStatus::Completed => 100,
                _ => 0,
            };
        }
        ((self.processed_orders * 100) / self.total_orders).min(100) as u8
    }
}
