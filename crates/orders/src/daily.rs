//! Per-day sales aggregates, recomputed from scratch.
//!
//! A `DailySales` row is a pure function of the orders (and their current
//! children) falling into its date bucket. Recomputation replaces the row
//! wholesale; running the aggregation twice over unchanged input yields an
//! identical row.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tillsync_core::{Channel, Money, MerchantId};

use crate::order::{Order, OrderChildren};

/// One row per (merchant, channel, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    pub merchant_id: MerchantId,
    pub channel: Channel,
    /// UTC date of `Order.placed_at`.
    pub date: NaiveDate,
    pub order_count: u64,
    /// Σ upstream order totals.
    pub gross_sales: Money,
    /// Gross minus refunds and discounts.
    pub net_sales: Money,
    pub tax_total: Money,
    pub tip_total: Money,
    pub discount_total: Money,
    pub refund_total: Money,
    pub cogs_total: Money,
    pub gross_margin: Money,
    /// Payment method → amount tendered. Ordered map so the serialized row
    /// is byte-stable across recomputations.
    pub payment_breakdown: BTreeMap<String, Money>,
}

impl DailySales {
    fn empty(merchant_id: MerchantId, channel: Channel, date: NaiveDate) -> Self {
        Self {
            merchant_id,
            channel,
            date,
            order_count: 0,
            gross_sales: Money::ZERO,
            net_sales: Money::ZERO,
            tax_total: Money::ZERO,
            tip_total: Money::ZERO,
            discount_total: Money::ZERO,
            refund_total: Money::ZERO,
            cogs_total: Money::ZERO,
            gross_margin: Money::ZERO,
            payment_breakdown: BTreeMap::new(),
        }
    }

    fn fold(&mut self, order: &Order, children: &OrderChildren) {
        self.order_count += 1;
        self.gross_sales += order.total;
        self.tax_total += order.financials.tax_amount;
        self.tip_total += order.financials.tip_amount;
        self.discount_total += order.financials.discount_amount;
        self.refund_total += order.financials.refund_amount;
        self.cogs_total += order.financials.cogs;
        self.gross_margin += order.financials.gross_margin;
        self.net_sales = self.gross_sales - self.refund_total - self.discount_total;

        for payment in &children.payments {
            *self
                .payment_breakdown
                .entry(payment.method.clone())
                .or_insert(Money::ZERO) += payment.amount;
        }
    }
}

/// Bucket orders by UTC date and recompute one `DailySales` row per bucket.
///
/// Input order does not matter; output is sorted by date. Orders whose
/// merchant or channel differ from the requested scope are skipped rather
/// than silently misattributed.
pub fn aggregate_daily_sales(
    merchant_id: MerchantId,
    channel: Channel,
    orders: &[(Order, OrderChildren)],
) -> Vec<DailySales> {
    let mut buckets: BTreeMap<NaiveDate, DailySales> = BTreeMap::new();

    for (order, children) in orders {
        if order.merchant_id != merchant_id || order.channel != channel {
            continue;
        }
        let date = order.placed_at.date_naive();
        buckets
            .entry(date)
            .or_insert_with(|| DailySales::empty(merchant_id, channel, date))
            .fold(order, children);
    }

    buckets.into_values().collect()
}
