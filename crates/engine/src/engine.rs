//! The POS sync engine.
//!
//! One `sync_merchant` run fetches bounded time-windows of upstream orders
//! in ascending modification order, upserts each order and its children
//! idempotently, advances the merchant's cursor, and recomputes the daily
//! sales aggregates the run touched. Per-record failures never abort a
//! batch; only configuration errors and an unreachable upstream do.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use tillsync_core::{Channel, Money, MerchantId};
use tillsync_infra::{CursorDataType, Store, SyncCursor, UpsertOutcome};
use tillsync_inventory::{CostObservation, StockLevel};
use tillsync_merchants::{ExternalMerchantRef, Merchant};
use tillsync_orders::{
    aggregate_daily_sales, Discount, Order, OrderFinancials, OrderLineItem, Payment, Refund,
};
use tillsync_upstream::{
    OrderPageQuery, PosApi, PosCredentials, StockPageQuery, UpstreamOrder,
};

use crate::error::SyncError;
use crate::resolver::MerchantResolver;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Page size when the cursor does not carry one.
    pub default_batch_size: u32,
    /// How far back a full sync reaches.
    pub historical_sync_days: i64,
    /// Incremental syncs restart this far before the watermark to tolerate
    /// late-arriving updates.
    pub incremental_overlap: chrono::Duration,
    /// Inter-page delay (upstream rate limiting).
    pub page_delay: Duration,
    /// Safety valve against a runaway paging loop.
    pub max_pages_per_run: u32,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 100,
            historical_sync_days: 365,
            incremental_overlap: chrono::Duration::minutes(5),
            page_delay: Duration::from_millis(500),
            max_pages_per_run: 1_000,
        }
    }
}

impl SyncEngineConfig {
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.default_batch_size = batch_size;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_historical_sync_days(mut self, days: i64) -> Self {
        self.historical_sync_days = days;
        self
    }
}

/// Per-run options.
#[derive(Debug, Default, Clone)]
pub struct SyncOptions {
    /// Explicit window; when absent the cursor decides.
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub batch_size: Option<u32>,
    /// Rewind the cursor and re-sync the full historical depth.
    pub force_full_sync: bool,
    /// Cooperative cancellation, checked between units of work.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl SyncOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// One order that could not be (fully) persisted.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSyncError {
    pub external_order_id: String,
    pub message: String,
}

/// Outcome of one `sync_merchant` run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub merchant_id: MerchantId,
    pub success: bool,
    pub orders_fetched: u64,
    pub orders_created: u64,
    pub orders_updated: u64,
    pub errors: Vec<OrderSyncError>,
    /// Cursor watermark after the run (epoch ms).
    pub watermark_ms: i64,
}

impl SyncReport {
    fn new(merchant_id: MerchantId) -> Self {
        Self {
            merchant_id,
            success: false,
            orders_fetched: 0,
            orders_created: 0,
            orders_updated: 0,
            errors: Vec::new(),
            watermark_ms: 0,
        }
    }

    pub fn orders_persisted(&self) -> u64 {
        self.orders_created + self.orders_updated
    }

    /// A batch that processed records but persisted none is a systemic
    /// persistence failure (database unreachable), a different condition
    /// from "zero orders changed".
    pub fn is_systemic_failure(&self) -> bool {
        self.orders_fetched > 0 && self.orders_persisted() == 0
    }
}

/// Outcome of one `sync_inventory` run.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryReport {
    pub merchant_id: MerchantId,
    pub items_synced: u64,
    pub cost_observations: u64,
    pub errors: u64,
}

struct ProcessedOrder {
    outcome: UpsertOutcome,
    placed_date: NaiveDate,
    child_errors: Vec<String>,
}

/// The sync engine. Depends only on the store traits and the upstream
/// `PosApi`; never on a concrete storage technology.
pub struct SyncEngine {
    store: Arc<dyn Store>,
    pos: Arc<dyn PosApi>,
    resolver: MerchantResolver,
    config: SyncEngineConfig,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn Store>, pos: Arc<dyn PosApi>, config: SyncEngineConfig) -> Self {
        let resolver = MerchantResolver::new(store.clone());
        Self {
            store,
            pos,
            resolver,
            config,
        }
    }

    pub fn resolver(&self) -> &MerchantResolver {
        &self.resolver
    }

    /// Synchronize one merchant's orders.
    ///
    /// The cursor only advances past *successfully processed* orders, so a
    /// failed order stays inside the next incremental window and is retried
    /// on the following run; its external id is surfaced in the report's
    /// error list for reconciliation.
    pub async fn sync_merchant(
        &self,
        merchant_id: MerchantId,
        options: SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        let merchant = self
            .store
            .get_merchant(merchant_id)
            .await?
            .ok_or(SyncError::MerchantNotFound(merchant_id))?;
        let channel = merchant.channel;
        let now = Utc::now();

        let mut cursor = self
            .store
            .get_cursor(merchant_id, channel, CursorDataType::Orders)
            .await?
            .unwrap_or_else(|| {
                SyncCursor::new(
                    merchant_id,
                    channel,
                    CursorDataType::Orders,
                    self.config.default_batch_size,
                )
            });
        let batch_size = options.batch_size.unwrap_or(cursor.batch_size).max(1);
        cursor.batch_size = batch_size;

        let credentials = match self.credentials_for(&merchant) {
            Ok(c) => c,
            Err(e) => {
                cursor.record_failure(e.to_string(), now);
                self.store.put_cursor(&cursor).await?;
                return Err(e);
            }
        };

        if options.force_full_sync {
            cursor.reset_for_full_sync();
        }

        let (window_start_ms, window_end_ms) = self.sync_window(&cursor, &options, now);
        tracing::info!(
            merchant_id = %merchant_id,
            %channel,
            window_start_ms,
            window_end_ms,
            batch_size,
            force_full = options.force_full_sync,
            "starting order sync"
        );

        let mut report = SyncReport::new(merchant_id);
        let mut max_modified_ok: i64 = 0;
        let mut touched_dates: BTreeSet<NaiveDate> = BTreeSet::new();
        let mut query = OrderPageQuery {
            modified_time_min: window_start_ms,
            modified_time_max: window_end_ms,
            limit: batch_size,
            offset: 0,
            expand_children: true,
        };
        let mut pages = 0u32;

        loop {
            if options.is_cancelled() {
                tracing::info!(merchant_id = %merchant_id, "sync cancelled between pages");
                break;
            }

            let page = match self.pos.fetch_orders(&credentials, &query).await {
                Ok(page) => page,
                Err(e) => {
                    // Upstream unreachable aborts the run; everything
                    // processed so far keeps its cursor progress.
                    cursor.last_modified_ms = cursor.last_modified_ms.max(max_modified_ok);
                    cursor.record_failure(e.to_string(), Utc::now());
                    self.store.put_cursor(&cursor).await?;
                    return Err(SyncError::Upstream(e));
                }
            };
            if page.is_empty() {
                break;
            }
            let page_len = page.len();

            for upstream_order in &page {
                if options.is_cancelled() {
                    break;
                }
                report.orders_fetched += 1;

                match self.process_order(&merchant, &credentials, upstream_order).await {
                    Ok(processed) => {
                        match processed.outcome {
                            UpsertOutcome::Created => report.orders_created += 1,
                            UpsertOutcome::Updated => report.orders_updated += 1,
                        }
                        max_modified_ok = max_modified_ok.max(upstream_order.modified_time);
                        touched_dates.insert(processed.placed_date);
                        for message in processed.child_errors {
                            report.errors.push(OrderSyncError {
                                external_order_id: upstream_order.id.clone(),
                                message,
                            });
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            merchant_id = %merchant_id,
                            external_order_id = %upstream_order.id,
                            error = %e,
                            "order failed to persist; batch continues"
                        );
                        report.errors.push(OrderSyncError {
                            external_order_id: upstream_order.id.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }

            if page_len < batch_size as usize {
                break;
            }
            pages += 1;
            if pages >= self.config.max_pages_per_run {
                tracing::warn!(
                    merchant_id = %merchant_id,
                    pages,
                    "page limit reached; remaining orders picked up next run"
                );
                break;
            }
            query = query.next_page();
            tokio::time::sleep(self.config.page_delay).await;
        }

        let finished_at = Utc::now();
        if report.is_systemic_failure() {
            tracing::error!(
                merchant_id = %merchant_id,
                fetched = report.orders_fetched,
                "systemic persistence failure: batch processed orders but persisted none"
            );
            cursor.record_failure(
                format!(
                    "systemic persistence failure: {} orders fetched, none persisted",
                    report.orders_fetched
                ),
                finished_at,
            );
            report.success = false;
        } else {
            cursor.record_success(max_modified_ok, finished_at);
            report.success = true;
        }
        self.store.put_cursor(&cursor).await?;
        report.watermark_ms = cursor.last_modified_ms;

        if let (Some(first), Some(last)) = (touched_dates.first(), touched_dates.last()) {
            let start = first
                .and_hms_opt(0, 0, 0)
                .map(|t| t.and_utc())
                .unwrap_or(finished_at);
            let end = last
                .succ_opt()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|t| t.and_utc())
                .unwrap_or(finished_at);
            self.aggregate_daily_sales(merchant_id, channel, start, end)
                .await?;
        }

        tracing::info!(
            merchant_id = %merchant_id,
            created = report.orders_created,
            updated = report.orders_updated,
            errors = report.errors.len(),
            watermark_ms = report.watermark_ms,
            "order sync finished"
        );
        Ok(report)
    }

    /// Persist one upstream order and its children.
    ///
    /// The order row is the commitment boundary: its upsert is verified by
    /// re-read, while child upserts are best-effort. A related-data failure
    /// degrades completeness without losing the order itself.
    async fn process_order(
        &self,
        merchant: &Merchant,
        credentials: &PosCredentials,
        upstream: &UpstreamOrder,
    ) -> Result<ProcessedOrder, SyncError> {
        // Resolve the canonical merchant; orders can reference a different
        // upstream identity than the one the run was started for.
        let external_id = upstream
            .merchant_id
            .as_deref()
            .unwrap_or(&merchant.external_id);
        let external = ExternalMerchantRef::new(external_id, merchant.channel)?;
        let canonical = self.resolver.resolve(&external).await?;

        let now = Utc::now();
        let placed_at = DateTime::from_timestamp_millis(upstream.created_time).unwrap_or(now);
        let order = Order {
            id: tillsync_core::OrderId::new(),
            merchant_id: canonical.id,
            external_id: upstream.id.clone(),
            channel: canonical.channel,
            state: upstream.state.clone(),
            currency: upstream.currency.clone().unwrap_or_else(|| "USD".to_string()),
            total: Money::from_minor_units(upstream.total),
            placed_at,
            modified_at_ms: upstream.modified_time,
            note: upstream.note.clone(),
            financials: OrderFinancials::default(),
            created_at: now,
            updated_at: now,
        };

        let outcome = self.store.upsert_order(&order).await?;

        // Verify by re-read: a silent persistence failure must not count as
        // a processed order.
        let persisted = self
            .store
            .find_order_by_external_id(canonical.id, &upstream.id, canonical.channel)
            .await?
            .ok_or_else(|| SyncError::VerificationFailed {
                external_order_id: upstream.id.clone(),
            })?;

        let mut child_errors = Vec::new();

        for line in upstream.line_items() {
            let mut unit_cost = match &line.item_id {
                Some(item) => match self
                    .store
                    .cost_at(canonical.id, item, persisted.placed_at)
                    .await
                {
                    Ok(cost) => cost,
                    Err(e) => {
                        child_errors.push(format!("line {}: cost lookup failed: {e}", line.id));
                        None
                    }
                },
                None => None,
            };

            // No history yet: fall back to a catalog lookup by SKU and seed
            // the history with what the item costs today.
            if unit_cost.is_none() {
                if let Some(sku) = &line.sku {
                    match self
                        .catalog_cost_by_sku(canonical.id, credentials, sku, persisted.placed_at)
                        .await
                    {
                        Ok(cost) => unit_cost = cost,
                        Err(e) => {
                            child_errors.push(format!("line {}: sku lookup failed: {e}", line.id))
                        }
                    }
                }
            }

            let unit_price = Money::from_minor_units(line.price);
            let row = OrderLineItem {
                order_id: persisted.id,
                external_id: line.id.clone(),
                name: line.name.clone().unwrap_or_else(|| line.id.clone()),
                sku: line.sku.clone(),
                item_external_id: line.item_id.clone(),
                quantity: line.quantity,
                unit_price,
                line_total: unit_price.times(line.quantity),
                tax_amount: Money::from_minor_units(line.tax_amount),
                unit_cost: None,
                line_cogs: Money::ZERO,
            }
            .with_cost_snapshot(unit_cost);

            if let Err(e) = self.store.upsert_line_item(&row).await {
                child_errors.push(format!("line {}: {e}", line.id));
            }
        }

        for payment in upstream.payments() {
            let row = Payment {
                order_id: persisted.id,
                external_id: payment.id.clone(),
                method: payment.tender.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
                amount: Money::from_minor_units(payment.amount),
                tip_amount: Money::from_minor_units(payment.tip_amount),
                tax_amount: Money::from_minor_units(payment.tax_amount),
                paid_at: payment
                    .created_time
                    .and_then(DateTime::from_timestamp_millis),
            };
            if let Err(e) = self.store.upsert_payment(&row).await {
                child_errors.push(format!("payment {}: {e}", payment.id));
            }
        }

        for discount in upstream.discounts() {
            let row = Discount {
                order_id: persisted.id,
                external_id: discount.id.clone(),
                name: discount.name.clone(),
                amount: Money::from_minor_units(discount.amount),
            };
            if let Err(e) = self.store.upsert_discount(&row).await {
                child_errors.push(format!("discount {}: {e}", discount.id));
            }
        }

        for refund in upstream.refunds() {
            let row = Refund {
                order_id: persisted.id,
                external_id: refund.id.clone(),
                amount: Money::from_minor_units(refund.amount),
                reason: refund.reason.clone(),
                refunded_at: refund.created_time.and_then(DateTime::from_timestamp_millis),
            };
            if let Err(e) = self.store.upsert_refund(&row).await {
                child_errors.push(format!("refund {}: {e}", refund.id));
            }
        }

        // Recompute derived financials from whatever children exist now.
        match self.store.children_of(persisted.id).await {
            Ok(children) => {
                let financials = OrderFinancials::recompute(&children);
                if let Err(e) = self.store.update_financials(persisted.id, &financials).await {
                    child_errors.push(format!("financial recompute failed: {e}"));
                }
            }
            Err(e) => child_errors.push(format!("financial recompute failed: {e}")),
        }

        Ok(ProcessedOrder {
            outcome,
            placed_date: persisted.placed_at.date_naive(),
            child_errors,
        })
    }

    /// Recompute the daily sales rows for `[start, end)` from scratch.
    ///
    /// Calling this twice with unchanged orders produces identical rows.
    pub async fn aggregate_daily_sales(
        &self,
        merchant_id: MerchantId,
        channel: Channel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, SyncError> {
        let orders = self
            .store
            .orders_in_range(merchant_id, channel, start, end)
            .await?;
        let rows = aggregate_daily_sales(merchant_id, channel, &orders);
        let count = rows.len() as u64;

        for row in &rows {
            self.store.upsert_daily_sales(row).await?;
        }
        tracing::debug!(
            merchant_id = %merchant_id,
            days = count,
            "daily sales recomputed"
        );
        Ok(count)
    }

    /// Synchronize one merchant's stock levels, recording a cost observation
    /// whenever an item reports a cost different from the latest known one.
    pub async fn sync_inventory(&self, merchant_id: MerchantId) -> Result<InventoryReport, SyncError> {
        let merchant = self
            .store
            .get_merchant(merchant_id)
            .await?
            .ok_or(SyncError::MerchantNotFound(merchant_id))?;
        let now = Utc::now();

        let mut cursor = self
            .store
            .get_cursor(merchant_id, merchant.channel, CursorDataType::Inventory)
            .await?
            .unwrap_or_else(|| {
                SyncCursor::new(
                    merchant_id,
                    merchant.channel,
                    CursorDataType::Inventory,
                    self.config.default_batch_size,
                )
            });

        let credentials = match self.credentials_for(&merchant) {
            Ok(c) => c,
            Err(e) => {
                cursor.record_failure(e.to_string(), now);
                self.store.put_cursor(&cursor).await?;
                return Err(e);
            }
        };

        let mut report = InventoryReport {
            merchant_id,
            items_synced: 0,
            cost_observations: 0,
            errors: 0,
        };
        let mut query = StockPageQuery::first(cursor.batch_size.max(1));

        loop {
            let page = match self.pos.fetch_stock_levels(&credentials, &query).await {
                Ok(page) => page,
                Err(e) => {
                    cursor.record_failure(e.to_string(), Utc::now());
                    self.store.put_cursor(&cursor).await?;
                    return Err(SyncError::Upstream(e));
                }
            };
            if page.is_empty() {
                break;
            }
            let page_len = page.len();

            for stock in &page {
                let level = StockLevel {
                    merchant_id,
                    item_external_id: stock.item_id.clone(),
                    sku: stock.sku.clone(),
                    name: stock.name.clone(),
                    quantity: stock.quantity,
                    as_of: now,
                };
                if let Err(e) = self.store.upsert_stock_level(&level).await {
                    tracing::warn!(
                        merchant_id = %merchant_id,
                        item = %stock.item_id,
                        error = %e,
                        "stock level failed to persist; batch continues"
                    );
                    report.errors += 1;
                    continue;
                }
                report.items_synced += 1;

                if let Some(cost_cents) = stock.cost {
                    let cost = Money::from_minor_units(cost_cents);
                    let latest = self.store.latest_cost(merchant_id, &stock.item_id).await?;
                    if latest != Some(cost) {
                        self.store
                            .append_cost_observation(&CostObservation {
                                merchant_id,
                                item_external_id: stock.item_id.clone(),
                                cost,
                                observed_at: now,
                            })
                            .await?;
                        report.cost_observations += 1;
                    }
                }
            }

            if page_len < query.limit as usize {
                break;
            }
            query = query.next_page();
            tokio::time::sleep(self.config.page_delay).await;
        }

        cursor.record_success(now.timestamp_millis(), Utc::now());
        self.store.put_cursor(&cursor).await?;

        tracing::info!(
            merchant_id = %merchant_id,
            items = report.items_synced,
            cost_observations = report.cost_observations,
            errors = report.errors,
            "inventory sync finished"
        );
        Ok(report)
    }

    /// Upstream catalog fallback for cost-at-sale: look the item up by SKU
    /// and append its current cost as the first history observation.
    async fn catalog_cost_by_sku(
        &self,
        merchant_id: MerchantId,
        credentials: &PosCredentials,
        sku: &str,
        sold_at: DateTime<Utc>,
    ) -> Result<Option<Money>, SyncError> {
        let Some(item) = self.pos.find_item_by_sku(credentials, sku).await? else {
            return Ok(None);
        };
        let Some(cost_cents) = item.cost else {
            return Ok(None);
        };

        let cost = Money::from_minor_units(cost_cents);
        // Idempotent under resync: only a changed cost appends.
        if self.store.latest_cost(merchant_id, &item.id).await? != Some(cost) {
            self.store
                .append_cost_observation(&CostObservation {
                    merchant_id,
                    item_external_id: item.id,
                    cost,
                    observed_at: sold_at,
                })
                .await?;
        }
        Ok(Some(cost))
    }

    fn credentials_for(&self, merchant: &Merchant) -> Result<PosCredentials, SyncError> {
        let token = merchant
            .api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(SyncError::MissingCredentials(merchant.id))?;
        Ok(PosCredentials {
            external_merchant_id: merchant.external_id.clone(),
            api_token: token.to_string(),
        })
    }

    /// The modification-time window for this run.
    ///
    /// Full sync (no watermark yet, or forced) reaches back the configured
    /// historical depth; incremental sync restarts just before the watermark.
    fn sync_window(
        &self,
        cursor: &SyncCursor,
        options: &SyncOptions,
        now: DateTime<Utc>,
    ) -> (i64, i64) {
        if let Some((start, end)) = options.range {
            return (start.timestamp_millis(), end.timestamp_millis());
        }

        let start_ms = if cursor.last_modified_ms == 0 {
            (now - chrono::Duration::days(self.config.historical_sync_days)).timestamp_millis()
        } else {
            (cursor.last_modified_ms - self.config.incremental_overlap.num_milliseconds()).max(0)
        };
        (start_ms, now.timestamp_millis())
    }
}
