//! Store traits the sync pipeline depends on.
//!
//! One trait per concern; the [`Store`] supertrait bundles them so callers
//! can hold a single `Arc<dyn Store>`. Implementations must make every
//! upsert idempotent on its natural key; the engine leans on that for all
//! of its consistency guarantees.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use tillsync_core::{Channel, CheckpointId, Money, MerchantId, OrderId, SyncJobId};
use tillsync_inventory::{CostObservation, StockLevel};
use tillsync_merchants::{ExternalMerchantRef, Merchant, PosLocation};
use tillsync_orders::{
    DailySales, Discount, Order, OrderChildren, OrderFinancials, OrderLineItem, Payment, Refund,
};

use crate::records::{CursorDataType, SyncCheckpoint, SyncCursor, SyncJob};

/// Storage-layer error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Whether an upsert inserted a new row or updated an existing one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Canonical merchants, keyed (external_id, channel).
#[async_trait]
pub trait MerchantStore: Send + Sync {
    /// Idempotent lookup-or-create. Concurrent callers racing on the same
    /// external identity must converge on one row; that is the
    /// implementation's responsibility, not the caller's.
    async fn upsert_merchant(&self, external: &ExternalMerchantRef) -> StoreResult<Merchant>;

    async fn get_merchant(&self, id: MerchantId) -> StoreResult<Option<Merchant>>;

    async fn find_merchant_by_external_id(
        &self,
        external_id: &str,
        channel: Channel,
    ) -> StoreResult<Option<Merchant>>;

    /// Operator provisioning of the upstream credential.
    async fn set_merchant_token(&self, id: MerchantId, token: Option<String>) -> StoreResult<()>;
}

/// Orders and their children.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Natural-key upsert. On update the existing row keeps its id,
    /// `created_at` and derived financials (those are recomputed separately
    /// via [`OrderStore::update_financials`]).
    async fn upsert_order(&self, order: &Order) -> StoreResult<UpsertOutcome>;

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>>;

    async fn find_order_by_external_id(
        &self,
        merchant_id: MerchantId,
        external_id: &str,
        channel: Channel,
    ) -> StoreResult<Option<Order>>;

    /// Child upserts, each keyed (order_id, external_id). A line item's
    /// cost-at-sale snapshot is immutable: an update never overwrites an
    /// existing `unit_cost`.
    async fn upsert_line_item(&self, line: &OrderLineItem) -> StoreResult<UpsertOutcome>;
    async fn upsert_payment(&self, payment: &Payment) -> StoreResult<UpsertOutcome>;
    async fn upsert_discount(&self, discount: &Discount) -> StoreResult<UpsertOutcome>;
    async fn upsert_refund(&self, refund: &Refund) -> StoreResult<UpsertOutcome>;

    async fn children_of(&self, order_id: OrderId) -> StoreResult<OrderChildren>;

    async fn update_financials(
        &self,
        order_id: OrderId,
        financials: &OrderFinancials,
    ) -> StoreResult<()>;

    /// Orders (with children) whose `placed_at` falls in `[start, end)`.
    async fn orders_in_range(
        &self,
        merchant_id: MerchantId,
        channel: Channel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<(Order, OrderChildren)>>;
}

/// Append-only item cost observations.
#[async_trait]
pub trait CostStore: Send + Sync {
    async fn append_cost_observation(&self, observation: &CostObservation) -> StoreResult<()>;

    /// Latest observed cost at or before `at`.
    async fn cost_at(
        &self,
        merchant_id: MerchantId,
        item_external_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Money>>;

    async fn latest_cost(
        &self,
        merchant_id: MerchantId,
        item_external_id: &str,
    ) -> StoreResult<Option<Money>>;
}

/// Current stock levels.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn upsert_stock_level(&self, level: &StockLevel) -> StoreResult<()>;
    async fn stock_levels_for(&self, merchant_id: MerchantId) -> StoreResult<Vec<StockLevel>>;
}

/// Daily sales aggregates, keyed (merchant, channel, date).
#[async_trait]
pub trait DailySalesStore: Send + Sync {
    async fn upsert_daily_sales(&self, row: &DailySales) -> StoreResult<()>;

    async fn get_daily_sales(
        &self,
        merchant_id: MerchantId,
        channel: Channel,
        date: NaiveDate,
    ) -> StoreResult<Option<DailySales>>;
}

/// Sync cursors, keyed (merchant, channel, data type).
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get_cursor(
        &self,
        merchant_id: MerchantId,
        channel: Channel,
        data_type: CursorDataType,
    ) -> StoreResult<Option<SyncCursor>>;

    async fn put_cursor(&self, cursor: &SyncCursor) -> StoreResult<()>;
}

/// Jobs and checkpoints. The status column is the durable lease.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &SyncJob) -> StoreResult<()>;
    async fn get_job(&self, id: SyncJobId) -> StoreResult<Option<SyncJob>>;
    async fn update_job(&self, job: &SyncJob) -> StoreResult<()>;

    /// Oldest job still in pending/active status.
    async fn find_oldest_open_job(&self) -> StoreResult<Option<SyncJob>>;

    async fn insert_checkpoint(&self, checkpoint: &SyncCheckpoint) -> StoreResult<()>;
    async fn get_checkpoint(&self, id: CheckpointId) -> StoreResult<Option<SyncCheckpoint>>;
    async fn update_checkpoint(&self, checkpoint: &SyncCheckpoint) -> StoreResult<()>;
    async fn checkpoints_for_job(&self, job_id: SyncJobId) -> StoreResult<Vec<SyncCheckpoint>>;

    /// Atomically claim the next runnable checkpoint of `job_id`: the oldest
    /// row in pending/retry whose backoff has elapsed flips to active in the
    /// same operation. Claiming must be a single conditional update so that
    /// two workers can never claim the same row.
    async fn claim_next_checkpoint(
        &self,
        job_id: SyncJobId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<SyncCheckpoint>>;

    /// Startup recovery: reset every job/checkpoint left `active` by a
    /// crashed process back to `pending`. Returns how many rows were reset.
    async fn reset_stale_active(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Cooperative cancellation: flip a job's pending/retry checkpoints to
    /// cancelled (active ones finish their current unit of work).
    async fn cancel_open_checkpoints(
        &self,
        job_id: SyncJobId,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;
}

/// Active upstream locations and their explicit internal mapping.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn upsert_location(&self, location: &PosLocation) -> StoreResult<()>;
    async fn list_active_locations(&self, channel: Channel) -> StoreResult<Vec<PosLocation>>;
    async fn find_location_by_external_id(
        &self,
        external_id: &str,
        channel: Channel,
    ) -> StoreResult<Option<PosLocation>>;
}

/// The full storage interface the pipeline consumes.
pub trait Store:
    MerchantStore
    + OrderStore
    + CostStore
    + StockStore
    + DailySalesStore
    + CursorStore
    + JobStore
    + LocationStore
{
}

impl<T> Store for T where
    T: MerchantStore
        + OrderStore
        + CostStore
        + StockStore
        + DailySalesStore
        + CursorStore
        + JobStore
        + LocationStore
{
}
