//! Postgres-backed store.
//!
//! Natural-key idempotency is enforced by the database itself: every upsert
//! is a single `INSERT .. ON CONFLICT .. DO UPDATE`, and the checkpoint
//! claim is one conditional `UPDATE .. RETURNING`, so two workers can never
//! claim the same row even if this process is ever scaled out.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use tillsync_core::{Channel, CheckpointId, Money, MerchantId, OrderId, SyncJobId};
use tillsync_inventory::{CostObservation, StockLevel};
use tillsync_merchants::{ExternalMerchantRef, Merchant, PosLocation};
use tillsync_orders::{
    DailySales, Discount, Order, OrderChildren, OrderFinancials, OrderLineItem, Payment, Refund,
};

use crate::records::{CursorDataType, SyncCheckpoint, SyncCursor, SyncJob};

use super::schema::SCHEMA;
use super::traits::{
    CostStore, CursorStore, DailySalesStore, JobStore, LocationStore, MerchantStore, OrderStore,
    StockStore, StoreError, StoreResult, UpsertOutcome,
};

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn decode(e: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("row decode failed: {e}"))
}

/// Postgres implementation of the full [`super::traits::Store`] interface.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled DDL. Idempotent; run once at startup.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        tracing::debug!("schema ensured");
        Ok(())
    }
}

fn channel_of(row: &PgRow, column: &str) -> StoreResult<Channel> {
    let raw: String = row.try_get(column).map_err(backend)?;
    Channel::from_str(&raw).map_err(decode)
}

fn merchant_from_row(row: &PgRow) -> StoreResult<Merchant> {
    Ok(Merchant {
        id: row.try_get::<Uuid, _>("id").map_err(backend)?.into(),
        external_id: row.try_get("external_id").map_err(backend)?,
        channel: channel_of(row, "channel")?,
        name: row.try_get("name").map_err(backend)?,
        api_token: row.try_get("api_token").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    Ok(Order {
        id: row.try_get::<Uuid, _>("id").map_err(backend)?.into(),
        merchant_id: row.try_get::<Uuid, _>("merchant_id").map_err(backend)?.into(),
        external_id: row.try_get("external_id").map_err(backend)?,
        channel: channel_of(row, "channel")?,
        state: row.try_get("state").map_err(backend)?,
        currency: row.try_get("currency").map_err(backend)?,
        total: Money::from_minor_units(row.try_get("total_cents").map_err(backend)?),
        placed_at: row.try_get("placed_at").map_err(backend)?,
        modified_at_ms: row.try_get("modified_at_ms").map_err(backend)?,
        note: row.try_get("note").map_err(backend)?,
        financials: OrderFinancials {
            subtotal: Money::from_minor_units(row.try_get("subtotal_cents").map_err(backend)?),
            tax_amount: Money::from_minor_units(row.try_get("tax_cents").map_err(backend)?),
            tip_amount: Money::from_minor_units(row.try_get("tip_cents").map_err(backend)?),
            discount_amount: Money::from_minor_units(
                row.try_get("discount_cents").map_err(backend)?,
            ),
            refund_amount: Money::from_minor_units(row.try_get("refund_cents").map_err(backend)?),
            cogs: Money::from_minor_units(row.try_get("cogs_cents").map_err(backend)?),
            gross_margin: Money::from_minor_units(
                row.try_get("gross_margin_cents").map_err(backend)?,
            ),
        },
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn line_from_row(row: &PgRow) -> StoreResult<OrderLineItem> {
    Ok(OrderLineItem {
        order_id: row.try_get::<Uuid, _>("order_id").map_err(backend)?.into(),
        external_id: row.try_get("external_id").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        sku: row.try_get("sku").map_err(backend)?,
        item_external_id: row.try_get("item_external_id").map_err(backend)?,
        quantity: row.try_get("quantity").map_err(backend)?,
        unit_price: Money::from_minor_units(row.try_get("unit_price_cents").map_err(backend)?),
        line_total: Money::from_minor_units(row.try_get("line_total_cents").map_err(backend)?),
        tax_amount: Money::from_minor_units(row.try_get("tax_cents").map_err(backend)?),
        unit_cost: row
            .try_get::<Option<i64>, _>("unit_cost_cents")
            .map_err(backend)?
            .map(Money::from_minor_units),
        line_cogs: Money::from_minor_units(row.try_get("line_cogs_cents").map_err(backend)?),
    })
}

fn payment_from_row(row: &PgRow) -> StoreResult<Payment> {
    Ok(Payment {
        order_id: row.try_get::<Uuid, _>("order_id").map_err(backend)?.into(),
        external_id: row.try_get("external_id").map_err(backend)?,
        method: row.try_get("method").map_err(backend)?,
        amount: Money::from_minor_units(row.try_get("amount_cents").map_err(backend)?),
        tip_amount: Money::from_minor_units(row.try_get("tip_cents").map_err(backend)?),
        tax_amount: Money::from_minor_units(row.try_get("tax_cents").map_err(backend)?),
        paid_at: row.try_get("paid_at").map_err(backend)?,
    })
}

fn discount_from_row(row: &PgRow) -> StoreResult<Discount> {
    Ok(Discount {
        order_id: row.try_get::<Uuid, _>("order_id").map_err(backend)?.into(),
        external_id: row.try_get("external_id").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        amount: Money::from_minor_units(row.try_get("amount_cents").map_err(backend)?),
    })
}

fn refund_from_row(row: &PgRow) -> StoreResult<Refund> {
    Ok(Refund {
        order_id: row.try_get::<Uuid, _>("order_id").map_err(backend)?.into(),
        external_id: row.try_get("external_id").map_err(backend)?,
        amount: Money::from_minor_units(row.try_get("amount_cents").map_err(backend)?),
        reason: row.try_get("reason").map_err(backend)?,
        refunded_at: row.try_get("refunded_at").map_err(backend)?,
    })
}

fn cursor_from_row(row: &PgRow) -> StoreResult<SyncCursor> {
    let data_type: String = row.try_get("data_type").map_err(backend)?;
    Ok(SyncCursor {
        merchant_id: row.try_get::<Uuid, _>("merchant_id").map_err(backend)?.into(),
        channel: channel_of(row, "channel")?,
        data_type: data_type.parse().map_err(decode)?,
        last_modified_ms: row.try_get("last_modified_ms").map_err(backend)?,
        batch_size: row.try_get::<i32, _>("batch_size").map_err(backend)?.max(0) as u32,
        error_count: row.try_get::<i32, _>("error_count").map_err(backend)?.max(0) as u32,
        last_error: row.try_get("last_error").map_err(backend)?,
        last_run_at: row.try_get("last_run_at").map_err(backend)?,
        last_success_at: row.try_get("last_success_at").map_err(backend)?,
    })
}

fn job_from_row(row: &PgRow) -> StoreResult<SyncJob> {
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(SyncJob {
        id: row.try_get::<Uuid, _>("id").map_err(backend)?.into(),
        channel: channel_of(row, "channel")?,
        range_start: row.try_get("range_start").map_err(backend)?,
        range_end: row.try_get("range_end").map_err(backend)?,
        force_full_sync: row.try_get("force_full_sync").map_err(backend)?,
        status: status.parse().map_err(decode)?,
        processed_orders: row.try_get::<i64, _>("processed_orders").map_err(backend)?.max(0) as u64,
        total_orders: row.try_get::<i64, _>("total_orders").map_err(backend)?.max(0) as u64,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn checkpoint_from_row(row: &PgRow) -> StoreResult<SyncCheckpoint> {
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(SyncCheckpoint {
        id: row.try_get::<Uuid, _>("id").map_err(backend)?.into(),
        job_id: row.try_get::<Uuid, _>("job_id").map_err(backend)?.into(),
        external_merchant_id: row.try_get("external_merchant_id").map_err(backend)?,
        location_id: row
            .try_get::<Option<Uuid>, _>("location_id")
            .map_err(backend)?
            .map(Into::into),
        location_name: row.try_get("location_name").map_err(backend)?,
        status: status.parse().map_err(decode)?,
        retry_count: row.try_get::<i32, _>("retry_count").map_err(backend)?.max(0) as u32,
        last_error: row.try_get("last_error").map_err(backend)?,
        processed_orders: row.try_get::<i64, _>("processed_orders").map_err(backend)?.max(0) as u64,
        total_orders: row.try_get::<i64, _>("total_orders").map_err(backend)?.max(0) as u64,
        last_synced_at: row.try_get("last_synced_at").map_err(backend)?,
        next_attempt_at: row.try_get("next_attempt_at").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn location_from_row(row: &PgRow) -> StoreResult<PosLocation> {
    Ok(PosLocation {
        external_merchant_id: row.try_get("external_merchant_id").map_err(backend)?,
        channel: channel_of(row, "channel")?,
        name: row.try_get("name").map_err(backend)?,
        active: row.try_get("active").map_err(backend)?,
        location_id: row
            .try_get::<Option<Uuid>, _>("location_id")
            .map_err(backend)?
            .map(Into::into),
    })
}

fn stock_from_row(row: &PgRow) -> StoreResult<StockLevel> {
    Ok(StockLevel {
        merchant_id: row.try_get::<Uuid, _>("merchant_id").map_err(backend)?.into(),
        item_external_id: row.try_get("item_external_id").map_err(backend)?,
        sku: row.try_get("sku").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        quantity: row.try_get("quantity").map_err(backend)?,
        as_of: row.try_get("as_of").map_err(backend)?,
    })
}

fn daily_from_row(row: &PgRow) -> StoreResult<DailySales> {
    let breakdown: serde_json::Value = row.try_get("payment_breakdown").map_err(backend)?;
    let payment_breakdown: BTreeMap<String, Money> =
        serde_json::from_value(breakdown).map_err(decode)?;

    Ok(DailySales {
        merchant_id: row.try_get::<Uuid, _>("merchant_id").map_err(backend)?.into(),
        channel: channel_of(row, "channel")?,
        date: row.try_get("date").map_err(backend)?,
        order_count: row.try_get::<i64, _>("order_count").map_err(backend)?.max(0) as u64,
        gross_sales: Money::from_minor_units(row.try_get("gross_cents").map_err(backend)?),
        net_sales: Money::from_minor_units(row.try_get("net_cents").map_err(backend)?),
        tax_total: Money::from_minor_units(row.try_get("tax_cents").map_err(backend)?),
        tip_total: Money::from_minor_units(row.try_get("tip_cents").map_err(backend)?),
        discount_total: Money::from_minor_units(row.try_get("discount_cents").map_err(backend)?),
        refund_total: Money::from_minor_units(row.try_get("refund_cents").map_err(backend)?),
        cogs_total: Money::from_minor_units(row.try_get("cogs_cents").map_err(backend)?),
        gross_margin: Money::from_minor_units(row.try_get("gross_margin_cents").map_err(backend)?),
        payment_breakdown,
    })
}

const CHECKPOINT_COLUMNS: &str = "id, job_id, external_merchant_id, location_id, location_name, \
     status, retry_count, last_error, processed_orders, total_orders, last_synced_at, \
     next_attempt_at, created_at, updated_at";

#[async_trait]
impl MerchantStore for PostgresStore {
    async fn upsert_merchant(&self, external: &ExternalMerchantRef) -> StoreResult<Merchant> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO merchants (id, external_id, channel, name, api_token, created_at, updated_at)
            VALUES ($1, $2, $3, COALESCE($4, $2), NULL, $5, $5)
            ON CONFLICT (external_id, channel)
            DO UPDATE SET name = COALESCE($4, merchants.name),
                          updated_at = $5
            RETURNING id, external_id, channel, name, api_token, created_at, updated_at
            "#,
        )
        .bind(*MerchantId::new().as_uuid())
        .bind(&external.external_id)
        .bind(external.channel.as_str())
        .bind(&external.name)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        merchant_from_row(&row)
    }

    async fn get_merchant(&self, id: MerchantId) -> StoreResult<Option<Merchant>> {
        let row = sqlx::query("SELECT * FROM merchants WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(merchant_from_row).transpose()
    }

    async fn find_merchant_by_external_id(
        &self,
        external_id: &str,
        channel: Channel,
    ) -> StoreResult<Option<Merchant>> {
        let row = sqlx::query("SELECT * FROM merchants WHERE external_id = $1 AND channel = $2")
            .bind(external_id)
            .bind(channel.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(merchant_from_row).transpose()
    }

    async fn set_merchant_token(&self, id: MerchantId, token: Option<String>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE merchants SET api_token = $2, updated_at = $3 WHERE id = $1")
            .bind(*id.as_uuid())
            .bind(token)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn upsert_order(&self, order: &Order) -> StoreResult<UpsertOutcome> {
        // `xmax = 0` distinguishes a fresh insert from a conflict-update.
        // Financial columns are deliberately absent from DO UPDATE: they are
        // owned by update_financials.
        let row = sqlx::query(
            r#"
            INSERT INTO orders (
                id, merchant_id, external_id, channel, state, currency, total_cents,
                placed_at, modified_at_ms, note, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            ON CONFLICT (merchant_id, external_id, channel)
            DO UPDATE SET state = EXCLUDED.state,
                          currency = EXCLUDED.currency,
                          total_cents = EXCLUDED.total_cents,
                          placed_at = EXCLUDED.placed_at,
                          modified_at_ms = EXCLUDED.modified_at_ms,
                          note = EXCLUDED.note,
                          updated_at = EXCLUDED.updated_at
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(*order.id.as_uuid())
        .bind(*order.merchant_id.as_uuid())
        .bind(&order.external_id)
        .bind(order.channel.as_str())
        .bind(&order.state)
        .bind(&order.currency)
        .bind(order.total.minor_units())
        .bind(order.placed_at)
        .bind(order.modified_at_ms)
        .bind(&order.note)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let inserted: bool = row.try_get("inserted").map_err(backend)?;
        Ok(if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn find_order_by_external_id(
        &self,
        merchant_id: MerchantId,
        external_id: &str,
        channel: Channel,
    ) -> StoreResult<Option<Order>> {
        let row = sqlx::query(
            "SELECT * FROM orders WHERE merchant_id = $1 AND external_id = $2 AND channel = $3",
        )
        .bind(*merchant_id.as_uuid())
        .bind(external_id)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn upsert_line_item(&self, line: &OrderLineItem) -> StoreResult<UpsertOutcome> {
        // COALESCE keeps the original cost-at-sale snapshot on re-sync.
        let row = sqlx::query(
            r#"
            INSERT INTO order_line_items (
                order_id, external_id, name, sku, item_external_id, quantity,
                unit_price_cents, line_total_cents, tax_cents, unit_cost_cents, line_cogs_cents
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_id, external_id)
            DO UPDATE SET name = EXCLUDED.name,
                          sku = EXCLUDED.sku,
                          item_external_id = EXCLUDED.item_external_id,
                          quantity = EXCLUDED.quantity,
                          unit_price_cents = EXCLUDED.unit_price_cents,
                          line_total_cents = EXCLUDED.line_total_cents,
                          tax_cents = EXCLUDED.tax_cents,
                          unit_cost_cents = COALESCE(order_line_items.unit_cost_cents, EXCLUDED.unit_cost_cents),
                          line_cogs_cents = CASE
                              WHEN order_line_items.unit_cost_cents IS NULL THEN EXCLUDED.line_cogs_cents
                              ELSE order_line_items.line_cogs_cents
                          END
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(*line.order_id.as_uuid())
        .bind(&line.external_id)
        .bind(&line.name)
        .bind(&line.sku)
        .bind(&line.item_external_id)
        .bind(line.quantity)
        .bind(line.unit_price.minor_units())
        .bind(line.line_total.minor_units())
        .bind(line.tax_amount.minor_units())
        .bind(line.unit_cost.map(|c| c.minor_units()))
        .bind(line.line_cogs.minor_units())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let inserted: bool = row.try_get("inserted").map_err(backend)?;
        Ok(if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn upsert_payment(&self, payment: &Payment) -> StoreResult<UpsertOutcome> {
        let row = sqlx::query(
            r#"
            INSERT INTO order_payments (order_id, external_id, method, amount_cents, tip_cents, tax_cents, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id, external_id)
            DO UPDATE SET method = EXCLUDED.method,
                          amount_cents = EXCLUDED.amount_cents,
                          tip_cents = EXCLUDED.tip_cents,
                          tax_cents = EXCLUDED.tax_cents,
                          paid_at = EXCLUDED.paid_at
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(*payment.order_id.as_uuid())
        .bind(&payment.external_id)
        .bind(&payment.method)
        .bind(payment.amount.minor_units())
        .bind(payment.tip_amount.minor_units())
        .bind(payment.tax_amount.minor_units())
        .bind(payment.paid_at)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let inserted: bool = row.try_get("inserted").map_err(backend)?;
        Ok(if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn upsert_discount(&self, discount: &Discount) -> StoreResult<UpsertOutcome> {
        let row = sqlx::query(
            r#"
            INSERT INTO order_discounts (order_id, external_id, name, amount_cents)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id, external_id)
            DO UPDATE SET name = EXCLUDED.name,
                          amount_cents = EXCLUDED.amount_cents
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(*discount.order_id.as_uuid())
        .bind(&discount.external_id)
        .bind(&discount.name)
        .bind(discount.amount.minor_units())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let inserted: bool = row.try_get("inserted").map_err(backend)?;
        Ok(if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn upsert_refund(&self, refund: &Refund) -> StoreResult<UpsertOutcome> {
        let row = sqlx::query(
            r#"
            INSERT INTO order_refunds (order_id, external_id, amount_cents, reason, refunded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id, external_id)
            DO UPDATE SET amount_cents = EXCLUDED.amount_cents,
                          reason = EXCLUDED.reason,
                          refunded_at = EXCLUDED.refunded_at
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(*refund.order_id.as_uuid())
        .bind(&refund.external_id)
        .bind(refund.amount.minor_units())
        .bind(&refund.reason)
        .bind(refund.refunded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let inserted: bool = row.try_get("inserted").map_err(backend)?;
        Ok(if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn children_of(&self, order_id: OrderId) -> StoreResult<OrderChildren> {
        let order_uuid = *order_id.as_uuid();

        let line_rows =
            sqlx::query("SELECT * FROM order_line_items WHERE order_id = $1 ORDER BY external_id")
                .bind(order_uuid)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        let payment_rows =
            sqlx::query("SELECT * FROM order_payments WHERE order_id = $1 ORDER BY external_id")
                .bind(order_uuid)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        let discount_rows =
            sqlx::query("SELECT * FROM order_discounts WHERE order_id = $1 ORDER BY external_id")
                .bind(order_uuid)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        let refund_rows =
            sqlx::query("SELECT * FROM order_refunds WHERE order_id = $1 ORDER BY external_id")
                .bind(order_uuid)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

        Ok(OrderChildren {
            line_items: line_rows.iter().map(line_from_row).collect::<StoreResult<_>>()?,
            payments: payment_rows.iter().map(payment_from_row).collect::<StoreResult<_>>()?,
            discounts: discount_rows.iter().map(discount_from_row).collect::<StoreResult<_>>()?,
            refunds: refund_rows.iter().map(refund_from_row).collect::<StoreResult<_>>()?,
        })
    }

    async fn update_financials(
        &self,
        order_id: OrderId,
        financials: &OrderFinancials,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET subtotal_cents = $2, tax_cents = $3, tip_cents = $4, discount_cents = $5,
                refund_cents = $6, cogs_cents = $7, gross_margin_cents = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(*order_id.as_uuid())
        .bind(financials.subtotal.minor_units())
        .bind(financials.tax_amount.minor_units())
        .bind(financials.tip_amount.minor_units())
        .bind(financials.discount_amount.minor_units())
        .bind(financials.refund_amount.minor_units())
        .bind(financials.cogs.minor_units())
        .bind(financials.gross_margin.minor_units())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn orders_in_range(
        &self,
        merchant_id: MerchantId,
        channel: Channel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<(Order, OrderChildren)>> {
        let order_rows = sqlx::query(
            r#"
            SELECT * FROM orders
            WHERE merchant_id = $1 AND channel = $2 AND placed_at >= $3 AND placed_at < $4
            ORDER BY placed_at
            "#,
        )
        .bind(*merchant_id.as_uuid())
        .bind(channel.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let orders: Vec<Order> = order_rows
            .iter()
            .map(order_from_row)
            .collect::<StoreResult<_>>()?;
        let order_ids: Vec<Uuid> = orders.iter().map(|o| *o.id.as_uuid()).collect();

        let mut children: HashMap<Uuid, OrderChildren> = order_ids
            .iter()
            .map(|id| (*id, OrderChildren::default()))
            .collect();

        let line_rows = sqlx::query(
            "SELECT * FROM order_line_items WHERE order_id = ANY($1) ORDER BY external_id",
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        for row in &line_rows {
            let line = line_from_row(row)?;
            if let Some(c) = children.get_mut(line.order_id.as_uuid()) {
                c.line_items.push(line);
            }
        }

        let payment_rows = sqlx::query(
            "SELECT * FROM order_payments WHERE order_id = ANY($1) ORDER BY external_id",
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        for row in &payment_rows {
            let payment = payment_from_row(row)?;
            if let Some(c) = children.get_mut(payment.order_id.as_uuid()) {
                c.payments.push(payment);
            }
        }

        let discount_rows = sqlx::query(
            "SELECT * FROM order_discounts WHERE order_id = ANY($1) ORDER BY external_id",
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        for row in &discount_rows {
            let discount = discount_from_row(row)?;
            if let Some(c) = children.get_mut(discount.order_id.as_uuid()) {
                c.discounts.push(discount);
            }
        }

        let refund_rows = sqlx::query(
            "SELECT * FROM order_refunds WHERE order_id = ANY($1) ORDER BY external_id",
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        for row in &refund_rows {
            let refund = refund_from_row(row)?;
            if let Some(c) = children.get_mut(refund.order_id.as_uuid()) {
                c.refunds.push(refund);
            }
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let c = children.remove(order.id.as_uuid()).unwrap_or_default();
                (order, c)
            })
            .collect())
    }
}

#[async_trait]
impl CostStore for PostgresStore {
    async fn append_cost_observation(&self, observation: &CostObservation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO item_cost_history (merchant_id, item_external_id, cost_cents, observed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(*observation.merchant_id.as_uuid())
        .bind(&observation.item_external_id)
        .bind(observation.cost.minor_units())
        .bind(observation.observed_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn cost_at(
        &self,
        merchant_id: MerchantId,
        item_external_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Money>> {
        let row = sqlx::query(
            r#"
            SELECT cost_cents FROM item_cost_history
            WHERE merchant_id = $1 AND item_external_id = $2 AND observed_at <= $3
            ORDER BY observed_at DESC
            LIMIT 1
            "#,
        )
        .bind(*merchant_id.as_uuid())
        .bind(item_external_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|r| r.try_get("cost_cents").map(Money::from_minor_units))
            .transpose()
            .map_err(backend)
    }

    async fn latest_cost(
        &self,
        merchant_id: MerchantId,
        item_external_id: &str,
    ) -> StoreResult<Option<Money>> {
        let row = sqlx::query(
            r#"
            SELECT cost_cents FROM item_cost_history
            WHERE merchant_id = $1 AND item_external_id = $2
            ORDER BY observed_at DESC
            LIMIT 1
            "#,
        )
        .bind(*merchant_id.as_uuid())
        .bind(item_external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|r| r.try_get("cost_cents").map(Money::from_minor_units))
            .transpose()
            .map_err(backend)
    }
}

#[async_trait]
impl StockStore for PostgresStore {
    async fn upsert_stock_level(&self, level: &StockLevel) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_levels (merchant_id, item_external_id, sku, name, quantity, as_of)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (merchant_id, item_external_id)
            DO UPDATE SET sku = EXCLUDED.sku,
                          name = EXCLUDED.name,
                          quantity = EXCLUDED.quantity,
                          as_of = EXCLUDED.as_of
            "#,
        )
        .bind(*level.merchant_id.as_uuid())
        .bind(&level.item_external_id)
        .bind(&level.sku)
        .bind(&level.name)
        .bind(level.quantity)
        .bind(level.as_of)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn stock_levels_for(&self, merchant_id: MerchantId) -> StoreResult<Vec<StockLevel>> {
        let rows = sqlx::query(
            "SELECT * FROM stock_levels WHERE merchant_id = $1 ORDER BY item_external_id",
        )
        .bind(*merchant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(stock_from_row).collect()
    }
}

#[async_trait]
impl DailySalesStore for PostgresStore {
    async fn upsert_daily_sales(&self, row: &DailySales) -> StoreResult<()> {
        let breakdown = serde_json::to_value(&row.payment_breakdown).map_err(decode)?;
        sqlx::query(
            r#"
            INSERT INTO daily_sales (
                merchant_id, channel, date, order_count, gross_cents, net_cents, tax_cents,
                tip_cents, discount_cents, refund_cents, cogs_cents, gross_margin_cents,
                payment_breakdown
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (merchant_id, channel, date)
            DO UPDATE SET order_count = EXCLUDED.order_count,
                          gross_cents = EXCLUDED.gross_cents,
                          net_cents = EXCLUDED.net_cents,
                          tax_cents = EXCLUDED.tax_cents,
                          tip_cents = EXCLUDED.tip_cents,
                          discount_cents = EXCLUDED.discount_cents,
                          refund_cents = EXCLUDED.refund_cents,
                          cogs_cents = EXCLUDED.cogs_cents,
                          gross_margin_cents = EXCLUDED.gross_margin_cents,
                          payment_breakdown = EXCLUDED.payment_breakdown
            "#,
        )
        .bind(*row.merchant_id.as_uuid())
        .bind(row.channel.as_str())
        .bind(row.date)
        .bind(row.order_count as i64)
        .bind(row.gross_sales.minor_units())
        .bind(row.net_sales.minor_units())
        .bind(row.tax_total.minor_units())
        .bind(row.tip_total.minor_units())
        .bind(row.discount_total.minor_units())
        .bind(row.refund_total.minor_units())
        .bind(row.cogs_total.minor_units())
        .bind(row.gross_margin.minor_units())
        .bind(breakdown)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_daily_sales(
        &self,
        merchant_id: MerchantId,
        channel: Channel,
        date: NaiveDate,
    ) -> StoreResult<Option<DailySales>> {
        let row = sqlx::query(
            "SELECT * FROM daily_sales WHERE merchant_id = $1 AND channel = $2 AND date = $3",
        )
        .bind(*merchant_id.as_uuid())
        .bind(channel.as_str())
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(daily_from_row).transpose()
    }
}

#[async_trait]
impl CursorStore for PostgresStore {
    async fn get_cursor(
        &self,
        merchant_id: MerchantId,
        channel: Channel,
        data_type: CursorDataType,
    ) -> StoreResult<Option<SyncCursor>> {
        let row = sqlx::query(
            "SELECT * FROM sync_cursors WHERE merchant_id = $1 AND channel = $2 AND data_type = $3",
        )
        .bind(*merchant_id.as_uuid())
        .bind(channel.as_str())
        .bind(data_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(cursor_from_row).transpose()
    }

    async fn put_cursor(&self, cursor: &SyncCursor) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (
                merchant_id, channel, data_type, last_modified_ms, batch_size,
                error_count, last_error, last_run_at, last_success_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (merchant_id, channel, data_type)
            DO UPDATE SET last_modified_ms = EXCLUDED.last_modified_ms,
                          batch_size = EXCLUDED.batch_size,
                          error_count = EXCLUDED.error_count,
                          last_error = EXCLUDED.last_error,
                          last_run_at = EXCLUDED.last_run_at,
                          last_success_at = EXCLUDED.last_success_at
            "#,
        )
        .bind(*cursor.merchant_id.as_uuid())
        .bind(cursor.channel.as_str())
        .bind(cursor.data_type.as_str())
        .bind(cursor.last_modified_ms)
        .bind(cursor.batch_size as i32)
        .bind(cursor.error_count as i32)
        .bind(&cursor.last_error)
        .bind(cursor.last_run_at)
        .bind(cursor.last_success_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresStore {
    async fn insert_job(&self, job: &SyncJob) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_jobs (
                id, channel, range_start, range_end, force_full_sync, status,
                processed_orders, total_orders, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(*job.id.as_uuid())
        .bind(job.channel.as_str())
        .bind(job.range_start)
        .bind(job.range_end)
        .bind(job.force_full_sync)
        .bind(job.status.as_str())
        .bind(job.processed_orders as i64)
        .bind(job.total_orders as i64)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_job(&self, id: SyncJobId) -> StoreResult<Option<SyncJob>> {
        let row = sqlx::query("SELECT * FROM sync_jobs WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn update_job(&self, job: &SyncJob) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = $2, processed_orders = $3, total_orders = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(*job.id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.processed_orders as i64)
        .bind(job.total_orders as i64)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_oldest_open_job(&self) -> StoreResult<Option<SyncJob>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM sync_jobs
            WHERE status IN ('pending', 'active')
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn insert_checkpoint(&self, checkpoint: &SyncCheckpoint) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_checkpoints (
                id, job_id, external_merchant_id, location_id, location_name, status,
                retry_count, last_error, processed_orders, total_orders, last_synced_at,
                next_attempt_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(*checkpoint.id.as_uuid())
        .bind(*checkpoint.job_id.as_uuid())
        .bind(&checkpoint.external_merchant_id)
        .bind(checkpoint.location_id.map(|l| *l.as_uuid()))
        .bind(&checkpoint.location_name)
        .bind(checkpoint.status.as_str())
        .bind(checkpoint.retry_count as i32)
        .bind(&checkpoint.last_error)
        .bind(checkpoint.processed_orders as i64)
        .bind(checkpoint.total_orders as i64)
        .bind(checkpoint.last_synced_at)
        .bind(checkpoint.next_attempt_at)
        .bind(checkpoint.created_at)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_checkpoint(&self, id: CheckpointId) -> StoreResult<Option<SyncCheckpoint>> {
        let row = sqlx::query("SELECT * FROM sync_checkpoints WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(checkpoint_from_row).transpose()
    }

    async fn update_checkpoint(&self, checkpoint: &SyncCheckpoint) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_checkpoints
            SET status = $2, retry_count = $3, last_error = $4, processed_orders = $5,
                total_orders = $6, last_synced_at = $7, next_attempt_at = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(*checkpoint.id.as_uuid())
        .bind(checkpoint.status.as_str())
        .bind(checkpoint.retry_count as i32)
        .bind(&checkpoint.last_error)
        .bind(checkpoint.processed_orders as i64)
        .bind(checkpoint.total_orders as i64)
        .bind(checkpoint.last_synced_at)
        .bind(checkpoint.next_attempt_at)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn checkpoints_for_job(&self, job_id: SyncJobId) -> StoreResult<Vec<SyncCheckpoint>> {
        let rows = sqlx::query("SELECT * FROM sync_checkpoints WHERE job_id = $1 ORDER BY created_at")
            .bind(*job_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(checkpoint_from_row).collect()
    }

    async fn claim_next_checkpoint(
        &self,
        job_id: SyncJobId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<SyncCheckpoint>> {
        // Single conditional update: filter and status flip happen in one
        // statement, and SKIP LOCKED keeps concurrent claimers off the same
        // row.
        let sql = format!(
            r#"
            UPDATE sync_checkpoints
            SET status = 'active', updated_at = $2
            WHERE id = (
                SELECT id FROM sync_checkpoints
                WHERE job_id = $1
                  AND status IN ('pending', 'retry')
                  AND (next_attempt_at IS NULL OR next_attempt_at <= $2)
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            AND status IN ('pending', 'retry')
            RETURNING {CHECKPOINT_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(*job_id.as_uuid())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(checkpoint_from_row).transpose()
    }

    async fn reset_stale_active(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let jobs = sqlx::query(
            "UPDATE sync_jobs SET status = 'pending', updated_at = $1 WHERE status = 'active'",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        let checkpoints = sqlx::query(
            "UPDATE sync_checkpoints SET status = 'pending', updated_at = $1 WHERE status = 'active'",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(jobs.rows_affected() + checkpoints.rows_affected())
    }

    async fn cancel_open_checkpoints(
        &self,
        job_id: SyncJobId,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_checkpoints
            SET status = 'cancelled', next_attempt_at = NULL, updated_at = $2
            WHERE job_id = $1 AND status IN ('pending', 'retry')
            "#,
        )
        .bind(*job_id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LocationStore for PostgresStore {
    async fn upsert_location(&self, location: &PosLocation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pos_locations (external_merchant_id, channel, name, active, location_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_merchant_id, channel)
            DO UPDATE SET name = EXCLUDED.name,
                          active = EXCLUDED.active,
                          location_id = EXCLUDED.location_id
            "#,
        )
        .bind(&location.external_merchant_id)
        .bind(location.channel.as_str())
        .bind(&location.name)
        .bind(location.active)
        .bind(location.location_id.map(|l| *l.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn list_active_locations(&self, channel: Channel) -> StoreResult<Vec<PosLocation>> {
        let rows = sqlx::query(
            "SELECT * FROM pos_locations WHERE channel = $1 AND active ORDER BY external_merchant_id",
        )
        .bind(channel.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(location_from_row).collect()
    }

    async fn find_location_by_external_id(
        &self,
        external_id: &str,
        channel: Channel,
    ) -> StoreResult<Option<PosLocation>> {
        let row = sqlx::query(
            "SELECT * FROM pos_locations WHERE external_merchant_id = $1 AND channel = $2",
        )
        .bind(external_id)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(location_from_row).transpose()
    }
}
