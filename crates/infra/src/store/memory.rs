//! In-memory store for tests and dev.
//!
//! Natural keys are the map keys, so idempotent-upsert semantics fall out of
//! `HashMap` insertion. Lock discipline: every method takes the single
//! `RwLock` once and never awaits while holding it.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use tillsync_core::{Channel, CheckpointId, Money, MerchantId, OrderId, SyncJobId};
use tillsync_inventory::{CostObservation, ItemCostHistory, StockLevel};
use tillsync_merchants::{ExternalMerchantRef, Merchant, PosLocation};
use tillsync_orders::{
    DailySales, Discount, Order, OrderChildren, OrderFinancials, OrderLineItem, Payment, Refund,
};

use crate::records::{CheckpointStatus, CursorDataType, JobStatus, SyncCheckpoint, SyncCursor, SyncJob};

use super::traits::{
    CostStore, CursorStore, DailySalesStore, JobStore, LocationStore, MerchantStore, OrderStore,
    StockStore, StoreError, StoreResult, UpsertOutcome,
};

#[derive(Debug, Default)]
struct Inner {
    merchants: HashMap<(String, Channel), Merchant>,
    orders: HashMap<OrderId, Order>,
    order_keys: HashMap<(MerchantId, String, Channel), OrderId>,
    line_items: HashMap<(OrderId, String), OrderLineItem>,
    payments: HashMap<(OrderId, String), Payment>,
    discounts: HashMap<(OrderId, String), Discount>,
    refunds: HashMap<(OrderId, String), Refund>,
    costs: HashMap<(MerchantId, String), ItemCostHistory>,
    stock: HashMap<(MerchantId, String), StockLevel>,
    daily_sales: HashMap<(MerchantId, Channel, NaiveDate), DailySales>,
    cursors: HashMap<(MerchantId, Channel, CursorDataType), SyncCursor>,
    jobs: HashMap<SyncJobId, SyncJob>,
    checkpoints: HashMap<CheckpointId, SyncCheckpoint>,
    locations: HashMap<(String, Channel), PosLocation>,
}

/// In-memory implementation of the full [`super::traits::Store`] interface.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MerchantStore for MemoryStore {
    async fn upsert_merchant(&self, external: &ExternalMerchantRef) -> StoreResult<Merchant> {
        let mut inner = self.inner.write().unwrap();
        let key = (external.external_id.clone(), external.channel);

        if let Some(existing) = inner.merchants.get_mut(&key) {
            if let Some(name) = &external.name {
                existing.name = name.clone();
                existing.updated_at = Utc::now();
            }
            return Ok(existing.clone());
        }

        let merchant = Merchant::from_external(external, Utc::now());
        inner.merchants.insert(key, merchant.clone());
        Ok(merchant)
    }

    async fn get_merchant(&self, id: MerchantId) -> StoreResult<Option<Merchant>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.merchants.values().find(|m| m.id == id).cloned())
    }

    async fn find_merchant_by_external_id(
        &self,
        external_id: &str,
        channel: Channel,
    ) -> StoreResult<Option<Merchant>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .merchants
            .get(&(external_id.to_string(), channel))
            .cloned())
    }

    async fn set_merchant_token(&self, id: MerchantId, token: Option<String>) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        let merchant = inner
            .merchants
            .values_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::NotFound)?;
        merchant.api_token = token;
        merchant.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn upsert_order(&self, order: &Order) -> StoreResult<UpsertOutcome> {
        let mut inner = self.inner.write().unwrap();
        let key = (
            order.merchant_id,
            order.external_id.clone(),
            order.channel,
        );

        if let Some(existing_id) = inner.order_keys.get(&key).copied() {
            let existing = inner
                .orders
                .get_mut(&existing_id)
                .ok_or_else(|| StoreError::Backend("order index out of sync".to_string()))?;
            // Raw fields track upstream; identity, creation time and derived
            // financials stay put.
            existing.state = order.state.clone();
            existing.currency = order.currency.clone();
            existing.total = order.total;
            existing.placed_at = order.placed_at;
            existing.modified_at_ms = order.modified_at_ms;
            existing.note = order.note.clone();
            existing.updated_at = order.updated_at;
            return Ok(UpsertOutcome::Updated);
        }

        inner.order_keys.insert(key, order.id);
        inner.orders.insert(order.id, order.clone());
        Ok(UpsertOutcome::Created)
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.orders.get(&id).cloned())
    }

    async fn find_order_by_external_id(
        &self,
        merchant_id: MerchantId,
        external_id: &str,
        channel: Channel,
    ) -> StoreResult<Option<Order>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .order_keys
            .get(&(merchant_id, external_id.to_string(), channel))
            .and_then(|id| inner.orders.get(id))
            .cloned())
    }

    async fn upsert_line_item(&self, line: &OrderLineItem) -> StoreResult<UpsertOutcome> {
        let mut inner = self.inner.write().unwrap();
        let key = (line.order_id, line.external_id.clone());

        if let Some(existing) = inner.line_items.get_mut(&key) {
            let snapshot_cost = existing.unit_cost;
            let snapshot_cogs = existing.line_cogs;
            *existing = line.clone();
            // Cost-at-sale snapshot is immutable once taken.
            if snapshot_cost.is_some() {
                existing.unit_cost = snapshot_cost;
                existing.line_cogs = snapshot_cogs;
            }
            return Ok(UpsertOutcome::Updated);
        }

        inner.line_items.insert(key, line.clone());
        Ok(UpsertOutcome::Created)
    }

    async fn upsert_payment(&self, payment: &Payment) -> StoreResult<UpsertOutcome> {
        let mut inner = self.inner.write().unwrap();
        let key = (payment.order_id, payment.external_id.clone());
        let outcome = if inner.payments.contains_key(&key) {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        };
        inner.payments.insert(key, payment.clone());
        Ok(outcome)
    }

    async fn upsert_discount(&self, discount: &Discount) -> StoreResult<UpsertOutcome> {
        let mut inner = self.inner.write().unwrap();
        let key = (discount.order_id, discount.external_id.clone());
        let outcome = if inner.discounts.contains_key(&key) {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        };
        inner.discounts.insert(key, discount.clone());
        Ok(outcome)
    }

    async fn upsert_refund(&self, refund: &Refund) -> StoreResult<UpsertOutcome> {
        let mut inner = self.inner.write().unwrap();
        let key = (refund.order_id, refund.external_id.clone());
        let outcome = if inner.refunds.contains_key(&key) {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        };
        inner.refunds.insert(key, refund.clone());
        Ok(outcome)
    }

    async fn children_of(&self, order_id: OrderId) -> StoreResult<OrderChildren> {
        let inner = self.inner.read().unwrap();

        let mut children = OrderChildren {
            line_items: inner
                .line_items
                .iter()
                .filter(|((id, _), _)| *id == order_id)
                .map(|(_, l)| l.clone())
                .collect(),
            payments: inner
                .payments
                .iter()
                .filter(|((id, _), _)| *id == order_id)
                .map(|(_, p)| p.clone())
                .collect(),
            discounts: inner
                .discounts
                .iter()
                .filter(|((id, _), _)| *id == order_id)
                .map(|(_, d)| d.clone())
                .collect(),
            refunds: inner
                .refunds
                .iter()
                .filter(|((id, _), _)| *id == order_id)
                .map(|(_, r)| r.clone())
                .collect(),
        };

        // Deterministic ordering for callers that fold over children.
        children.line_items.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        children.payments.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        children.discounts.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        children.refunds.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        Ok(children)
    }

    async fn update_financials(
        &self,
        order_id: OrderId,
        financials: &OrderFinancials,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        let order = inner.orders.get_mut(&order_id).ok_or(StoreError::NotFound)?;
        order.financials = *financials;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn orders_in_range(
        &self,
        merchant_id: MerchantId,
        channel: Channel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<(Order, OrderChildren)>> {
        let order_ids: Vec<OrderId> = {
            let inner = self.inner.read().unwrap();
            let mut orders: Vec<&Order> = inner
                .orders
                .values()
                .filter(|o| {
                    o.merchant_id == merchant_id
                        && o.channel == channel
                        && o.placed_at >= start
                        && o.placed_at < end
                })
                .collect();
            orders.sort_by_key(|o| o.placed_at);
            orders.iter().map(|o| o.id).collect()
        };

        let mut result = Vec::with_capacity(order_ids.len());
        for id in order_ids {
            let order = {
                let inner = self.inner.read().unwrap();
                inner.orders.get(&id).cloned()
            };
            if let Some(order) = order {
                let children = self.children_of(id).await?;
                result.push((order, children));
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl CostStore for MemoryStore {
    async fn append_cost_observation(&self, observation: &CostObservation) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .costs
            .entry((observation.merchant_id, observation.item_external_id.clone()))
            .or_default()
            .append(observation.clone());
        Ok(())
    }

    async fn cost_at(
        &self,
        merchant_id: MerchantId,
        item_external_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Money>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .costs
            .get(&(merchant_id, item_external_id.to_string()))
            .and_then(|history| history.cost_at(at)))
    }

    async fn latest_cost(
        &self,
        merchant_id: MerchantId,
        item_external_id: &str,
    ) -> StoreResult<Option<Money>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .costs
            .get(&(merchant_id, item_external_id.to_string()))
            .and_then(|history| history.latest().map(|o| o.cost)))
    }
}

#[async_trait]
impl StockStore for MemoryStore {
    async fn upsert_stock_level(&self, level: &StockLevel) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .stock
            .insert((level.merchant_id, level.item_external_id.clone()), level.clone());
        Ok(())
    }

    async fn stock_levels_for(&self, merchant_id: MerchantId) -> StoreResult<Vec<StockLevel>> {
        let inner = self.inner.read().unwrap();
        let mut levels: Vec<StockLevel> = inner
            .stock
            .iter()
            .filter(|((m, _), _)| *m == merchant_id)
            .map(|(_, level)| level.clone())
            .collect();
        levels.sort_by(|a, b| a.item_external_id.cmp(&b.item_external_id));
        Ok(levels)
    }
}

#[async_trait]
impl DailySalesStore for MemoryStore {
    async fn upsert_daily_sales(&self, row: &DailySales) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .daily_sales
            .insert((row.merchant_id, row.channel, row.date), row.clone());
        Ok(())
    }

    async fn get_daily_sales(
        &self,
        merchant_id: MerchantId,
        channel: Channel,
        date: NaiveDate,
    ) -> StoreResult<Option<DailySales>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.daily_sales.get(&(merchant_id, channel, date)).cloned())
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn get_cursor(
        &self,
        merchant_id: MerchantId,
        channel: Channel,
        data_type: CursorDataType,
    ) -> StoreResult<Option<SyncCursor>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.cursors.get(&(merchant_id, channel, data_type)).cloned())
    }

    async fn put_cursor(&self, cursor: &SyncCursor) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner.cursors.insert(
            (cursor.merchant_id, cursor.channel, cursor.data_type),
            cursor.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &SyncJob) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::Constraint(format!("job {} already exists", job.id)));
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: SyncJobId) -> StoreResult<Option<SyncJob>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.jobs.get(&id).cloned())
    }

    async fn update_job(&self, job: &SyncJob) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.jobs.contains_key(&job.id) {
            return Err(StoreError::NotFound);
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_oldest_open_job(&self) -> StoreResult<Option<SyncJob>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .jobs
            .values()
            .filter(|j| j.status.is_open())
            .min_by_key(|j| j.created_at)
            .cloned())
    }

    async fn insert_checkpoint(&self, checkpoint: &SyncCheckpoint) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.checkpoints.contains_key(&checkpoint.id) {
            return Err(StoreError::Constraint(format!(
                "checkpoint {} already exists",
                checkpoint.id
            )));
        }
        inner.checkpoints.insert(checkpoint.id, checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoint(&self, id: CheckpointId) -> StoreResult<Option<SyncCheckpoint>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.checkpoints.get(&id).cloned())
    }

    async fn update_checkpoint(&self, checkpoint: &SyncCheckpoint) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.checkpoints.contains_key(&checkpoint.id) {
            return Err(StoreError::NotFound);
        }
        inner.checkpoints.insert(checkpoint.id, checkpoint.clone());
        Ok(())
    }

    async fn checkpoints_for_job(&self, job_id: SyncJobId) -> StoreResult<Vec<SyncCheckpoint>> {
        let inner = self.inner.read().unwrap();
        let mut checkpoints: Vec<SyncCheckpoint> = inner
            .checkpoints
            .values()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect();
        checkpoints.sort_by_key(|c| c.created_at);
        Ok(checkpoints)
    }

    async fn claim_next_checkpoint(
        &self,
        job_id: SyncJobId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<SyncCheckpoint>> {
        // Single write-locked pass: the filter and the status flip cannot be
        // interleaved with another claimer.
        let mut inner = self.inner.write().unwrap();
        let candidate = inner
            .checkpoints
            .values()
            .filter(|c| c.job_id == job_id && c.is_runnable(now))
            .min_by_key(|c| c.created_at)
            .map(|c| c.id);

        match candidate {
            Some(id) => {
                let checkpoint = inner
                    .checkpoints
                    .get_mut(&id)
                    .ok_or(StoreError::NotFound)?;
                checkpoint.mark_active(now);
                Ok(Some(checkpoint.clone()))
            }
            None => Ok(None),
        }
    }

    async fn reset_stale_active(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.write().unwrap();
        let mut reset = 0u64;

        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Active {
                job.status = JobStatus::Pending;
                job.updated_at = now;
                reset += 1;
            }
        }
        for checkpoint in inner.checkpoints.values_mut() {
            if checkpoint.status == CheckpointStatus::Active {
                checkpoint.status = CheckpointStatus::Pending;
                checkpoint.updated_at = now;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn cancel_open_checkpoints(
        &self,
        job_id: SyncJobId,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut inner = self.inner.write().unwrap();
        let mut cancelled = 0u64;
        for checkpoint in inner.checkpoints.values_mut() {
            if checkpoint.job_id == job_id && checkpoint.status.is_claimable() {
                checkpoint.mark_cancelled(now);
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn upsert_location(&self, location: &PosLocation) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        inner.locations.insert(
            (location.external_merchant_id.clone(), location.channel),
            location.clone(),
        );
        Ok(())
    }

    async fn list_active_locations(&self, channel: Channel) -> StoreResult<Vec<PosLocation>> {
        let inner = self.inner.read().unwrap();
        let mut locations: Vec<PosLocation> = inner
            .locations
            .values()
            .filter(|l| l.channel == channel && l.active)
            .cloned()
            .collect();
        locations.sort_by(|a, b| a.external_merchant_id.cmp(&b.external_merchant_id));
        Ok(locations)
    }

    async fn find_location_by_external_id(
        &self,
        external_id: &str,
        channel: Channel,
    ) -> StoreResult<Option<PosLocation>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .locations
            .get(&(external_id.to_string(), channel))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tillsync_core::Money;

    fn order(merchant_id: MerchantId, external_id: &str, modified_ms: i64) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            merchant_id,
            external_id: external_id.to_string(),
            channel: Channel::Clover,
            state: Some("open".to_string()),
            currency: "USD".to_string(),
            total: Money::from_minor_units(1000),
            placed_at: now,
            modified_at_ms: modified_ms,
            note: None,
            financials: OrderFinancials::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn order_upsert_is_idempotent_on_natural_key() {
        let store = MemoryStore::new();
        let merchant_id = MerchantId::new();

        let first = order(merchant_id, "ORD1", 100);
        assert_eq!(store.upsert_order(&first).await.unwrap(), UpsertOutcome::Created);

        // Same natural key, different row id: must update the existing row.
        let second = order(merchant_id, "ORD1", 200);
        assert_eq!(store.upsert_order(&second).await.unwrap(), UpsertOutcome::Updated);

        let stored = store
            .find_order_by_external_id(merchant_id, "ORD1", Channel::Clover)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.modified_at_ms, 200);
    }

    #[tokio::test]
    async fn line_item_cost_snapshot_survives_reupsert() {
        let store = MemoryStore::new();
        let order_id = OrderId::new();

        let line = OrderLineItem {
            order_id,
            external_id: "L1".to_string(),
            name: "Latte".to_string(),
            sku: None,
            item_external_id: Some("ITEM1".to_string()),
            quantity: 2,
            unit_price: Money::from_minor_units(999),
            line_total: Money::from_minor_units(1998),
            tax_amount: Money::ZERO,
            unit_cost: Some(Money::from_minor_units(400)),
            line_cogs: Money::from_minor_units(800),
        };
        store.upsert_line_item(&line).await.unwrap();

        let mut resync = line.clone();
        resync.unit_cost = Some(Money::from_minor_units(999));
        resync.line_cogs = Money::from_minor_units(1998);
        resync.quantity = 3;
        store.upsert_line_item(&resync).await.unwrap();

        let children = store.children_of(order_id).await.unwrap();
        assert_eq!(children.line_items.len(), 1);
        assert_eq!(children.line_items[0].quantity, 3);
        assert_eq!(children.line_items[0].unit_cost, Some(Money::from_minor_units(400)));
        assert_eq!(children.line_items[0].line_cogs, Money::from_minor_units(800));
    }

    #[tokio::test]
    async fn merchant_upsert_converges_on_one_row() {
        let store = MemoryStore::new();
        let external = ExternalMerchantRef::new("MER1", Channel::Clover).unwrap();

        let first = store.upsert_merchant(&external).await.unwrap();
        let second = store.upsert_merchant(&external).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn claim_next_checkpoint_is_exclusive_and_respects_backoff() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let job = SyncJob::new(Channel::Clover, now, now, false, now);
        store.insert_job(&job).await.unwrap();

        let mut cp1 = SyncCheckpoint::new(job.id, "MER1", "One", None, now);
        let cp2 = SyncCheckpoint::new(job.id, "MER2", "Two", None, now + Duration::seconds(1));
        cp1.record_failure("boom", 5, Duration::seconds(30), now);
        store.insert_checkpoint(&cp1).await.unwrap();
        store.insert_checkpoint(&cp2).await.unwrap();

        // cp1 is in backoff; the claim must skip to cp2.
        let claimed = store.claim_next_checkpoint(job.id, now).await.unwrap().unwrap();
        assert_eq!(claimed.id, cp2.id);
        assert_eq!(claimed.status, CheckpointStatus::Active);

        // Nothing else is runnable right now.
        assert!(store.claim_next_checkpoint(job.id, now).await.unwrap().is_none());

        // After the backoff elapses cp1 becomes claimable.
        let later = now + Duration::seconds(120);
        let claimed = store.claim_next_checkpoint(job.id, later).await.unwrap().unwrap();
        assert_eq!(claimed.id, cp1.id);
    }

    #[tokio::test]
    async fn reset_stale_active_returns_rows_to_pending() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut job = SyncJob::new(Channel::Clover, now, now, false, now);
        job.mark_active(now);
        store.insert_job(&job).await.unwrap();

        let mut cp = SyncCheckpoint::new(job.id, "MER1", "One", None, now);
        cp.mark_active(now);
        store.insert_checkpoint(&cp).await.unwrap();

        let reset = store.reset_stale_active(now).await.unwrap();
        assert_eq!(reset, 2);
        assert_eq!(store.get_job(job.id).await.unwrap().unwrap().status, JobStatus::Pending);
        assert_eq!(
            store.get_checkpoint(cp.id).await.unwrap().unwrap().status,
            CheckpointStatus::Pending
        );
    }

    #[tokio::test]
    async fn cancel_open_checkpoints_spares_active_ones() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let job = SyncJob::new(Channel::Clover, now, now, false, now);
        store.insert_job(&job).await.unwrap();

        let pending = SyncCheckpoint::new(job.id, "MER1", "One", None, now);
        let mut active = SyncCheckpoint::new(job.id, "MER2", "Two", None, now);
        active.mark_active(now);
        store.insert_checkpoint(&pending).await.unwrap();
        store.insert_checkpoint(&active).await.unwrap();

        let cancelled = store.cancel_open_checkpoints(job.id, now).await.unwrap();
        assert_eq!(cancelled, 1);
        assert_eq!(
            store.get_checkpoint(pending.id).await.unwrap().unwrap().status,
            CheckpointStatus::Cancelled
        );
        assert_eq!(
            store.get_checkpoint(active.id).await.unwrap().unwrap().status,
            CheckpointStatus::Active
        );
    }

    #[tokio::test]
    async fn cursor_round_trips() {
        let store = MemoryStore::new();
        let merchant_id = MerchantId::new();
        let mut cursor = SyncCursor::new(merchant_id, Channel::Clover, CursorDataType::Orders, 100);
        cursor.record_success(1234, Utc::now());

        store.put_cursor(&cursor).await.unwrap();
        let loaded = store
            .get_cursor(merchant_id, Channel::Clover, CursorDataType::Orders)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.last_modified_ms, 1234);
    }
}
