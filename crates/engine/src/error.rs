//! Engine error model.

use thiserror::Error;

use tillsync_core::{DomainError, MerchantId, SyncJobId};
use tillsync_infra::StoreError;
use tillsync_upstream::UpstreamError;

/// Failures that abort a whole sync run (per-record failures never surface
/// here; they are folded into the run's report instead).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("merchant {0} not found")]
    MerchantNotFound(MerchantId),

    /// Configuration error: the merchant has no upstream credential.
    #[error("merchant {0} has no upstream credentials")]
    MissingCredentials(MerchantId),

    #[error("job {0} not found")]
    JobNotFound(SyncJobId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// An order upsert reported success but the row could not be read back.
    #[error("order {external_order_id} failed write verification")]
    VerificationFailed { external_order_id: String },
}
