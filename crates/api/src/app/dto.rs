use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tillsync_infra::{SyncCheckpoint, SyncCursor, SyncJob};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct StartJobRequest {
    pub channel: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    #[serde(default)]
    pub force_full_sync: bool,
}

#[derive(Debug, Deserialize)]
pub struct CursorQuery {
    /// "orders" (default) or "inventory".
    pub data_type: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct CheckpointView {
    pub id: String,
    pub location_name: String,
    pub external_merchant_id: String,
    pub location_id: Option<String>,
    pub status: String,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub processed_orders: u64,
    pub total_orders: u64,
    pub progress_percent: u8,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl From<&SyncCheckpoint> for CheckpointView {
    fn from(checkpoint: &SyncCheckpoint) -> Self {
        Self {
            id: checkpoint.id.to_string(),
            location_name: checkpoint.location_name.clone(),
            external_merchant_id: checkpoint.external_merchant_id.clone(),
            location_id: checkpoint.location_id.map(|id| id.to_string()),
            status: checkpoint.status.as_str().to_string(),
            retry_count: checkpoint.retry_count,
            last_error: checkpoint.last_error.clone(),
            processed_orders: checkpoint.processed_orders,
            total_orders: checkpoint.total_orders,
            progress_percent: checkpoint.progress_percent(),
            last_synced_at: checkpoint.last_synced_at,
            next_attempt_at: checkpoint.next_attempt_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub id: String,
    pub channel: String,
    pub status: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub force_full_sync: bool,
    pub processed_orders: u64,
    pub total_orders: u64,
    pub progress_percent: u8,
    pub locations: Vec<CheckpointView>,
}

impl JobStatusResponse {
    pub fn from_parts(job: &SyncJob, checkpoints: &[SyncCheckpoint]) -> Self {
        let progress_percent = if job.total_orders == 0 {
            match job.status {
                tillsync_infra::JobStatus::Completed => 100,
                _ => 0,
            }
        } else {
            ((job.processed_orders * 100) / job.total_orders).min(100) as u8
        };

        Self {
            id: job.id.to_string(),
            channel: job.channel.to_string(),
            status: job.status.as_str().to_string(),
            range_start: job.range_start,
            range_end: job.range_end,
            force_full_sync: job.force_full_sync,
            processed_orders: job.processed_orders,
            total_orders: job.total_orders,
            progress_percent,
            locations: checkpoints.iter().map(CheckpointView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CursorView {
    pub data_type: String,
    pub last_modified_ms: i64,
    pub batch_size: u32,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl From<&SyncCursor> for CursorView {
    fn from(cursor: &SyncCursor) -> Self {
        Self {
            data_type: cursor.data_type.as_str().to_string(),
            last_modified_ms: cursor.last_modified_ms,
            batch_size: cursor.batch_size,
            error_count: cursor.error_count,
            last_error: cursor.last_error.clone(),
            last_run_at: cursor.last_run_at,
            last_success_at: cursor.last_success_at,
        }
    }
}
