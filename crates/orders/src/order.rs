use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tillsync_core::{Channel, Money, MerchantId, OrderId};

/// One ingested transaction; unique on (merchant_id, external_id, channel).
///
/// Holds the raw upstream fields alongside derived financials. The sync
/// engine creates an order on first sight of its external id, updates it
/// while the upstream modification time advances, and never deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub merchant_id: MerchantId,
    pub external_id: String,
    pub channel: Channel,

    /// Upstream lifecycle state, verbatim (e.g. "open", "locked", "paid").
    pub state: Option<String>,
    pub currency: String,
    /// Upstream-reported total.
    pub total: Money,
    pub placed_at: DateTime<Utc>,
    /// Upstream modification time in epoch milliseconds; drives the cursor.
    pub modified_at_ms: i64,
    pub note: Option<String>,

    pub financials: OrderFinancials,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived financial fields, always recomputed from current children.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFinancials {
    pub subtotal: Money,
    pub tax_amount: Money,
    pub tip_amount: Money,
    pub discount_amount: Money,
    pub refund_amount: Money,
    pub cogs: Money,
    pub gross_margin: Money,
}

impl OrderFinancials {
    /// Fold the current children into derived totals.
    ///
    /// Invariants: `subtotal = Σ line_total`, `cogs = Σ line_cogs`,
    /// `gross_margin = subtotal − discount_amount − cogs`.
    pub fn recompute(children: &OrderChildren) -> Self {
        let subtotal: Money = children.line_items.iter().map(|l| l.line_total).sum();
        let tax_amount: Money = children.line_items.iter().map(|l| l.tax_amount).sum();
        let cogs: Money = children.line_items.iter().map(|l| l.line_cogs).sum();
        let tip_amount: Money = children.payments.iter().map(|p| p.tip_amount).sum();
        let discount_amount: Money = children.discounts.iter().map(|d| d.amount).sum();
        let refund_amount: Money = children.refunds.iter().map(|r| r.amount).sum();

        Self {
            subtotal,
            tax_amount,
            tip_amount,
            discount_amount,
            refund_amount,
            cogs,
            gross_margin: subtotal - discount_amount - cogs,
        }
    }
}

/// One sold line; keyed by its upstream external id within the parent order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub order_id: OrderId,
    pub external_id: String,
    pub name: String,
    pub sku: Option<String>,
    /// Upstream catalog item reference, used for the cost snapshot.
    pub item_external_id: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
    pub tax_amount: Money,
    /// Unit cost at time of sale, snapshotted from cost history when the line
    /// is first inserted. Immutable once set; `None` when no observation
    /// existed.
    pub unit_cost: Option<Money>,
    pub line_cogs: Money,
}

impl OrderLineItem {
    /// Apply the cost-at-sale snapshot. A line that already carries a cost
    /// keeps it; the snapshot is taken exactly once.
    pub fn with_cost_snapshot(mut self, unit_cost: Option<Money>) -> Self {
        if self.unit_cost.is_none() {
            self.unit_cost = unit_cost;
            self.line_cogs = unit_cost
                .map(|c| c.times(self.quantity))
                .unwrap_or(Money::ZERO);
        }
        self
    }
}

/// One tender against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub order_id: OrderId,
    pub external_id: String,
    /// Payment method label, verbatim from upstream (e.g. "CREDIT_CARD").
    pub method: String,
    pub amount: Money,
    pub tip_amount: Money,
    pub tax_amount: Money,
    pub paid_at: Option<DateTime<Utc>>,
}

/// One applied discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub order_id: OrderId,
    pub external_id: String,
    pub name: Option<String>,
    pub amount: Money,
}

/// One refund issued against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub order_id: OrderId,
    pub external_id: String,
    pub amount: Money,
    pub reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
}

/// The current child rows of one order, as read back from the store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrderChildren {
    pub line_items: Vec<OrderLineItem>,
    pub payments: Vec<Payment>,
    pub discounts: Vec<Discount>,
    pub refunds: Vec<Refund>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(order_id: OrderId, ext: &str, qty: i64, unit_cents: i64) -> OrderLineItem {
        let unit_price = Money::from_minor_units(unit_cents);
        OrderLineItem {
            order_id,
            external_id: ext.to_string(),
            name: format!("item-{ext}"),
            sku: None,
            item_external_id: None,
            quantity: qty,
            unit_price,
            line_total: unit_price.times(qty),
            tax_amount: Money::ZERO,
            unit_cost: None,
            line_cogs: Money::ZERO,
        }
    }

    #[test]
    fn recompute_sums_children() {
        let order_id = OrderId::new();
        let children = OrderChildren {
            line_items: vec![
                line(order_id, "L1", 2, 999).with_cost_snapshot(Some(Money::from_minor_units(400))),
                line(order_id, "L2", 1, 500),
            ],
            payments: vec![Payment {
                order_id,
                external_id: "P1".to_string(),
                method: "CREDIT_CARD".to_string(),
                amount: Money::from_minor_units(2498),
                tip_amount: Money::from_minor_units(300),
                tax_amount: Money::ZERO,
                paid_at: None,
            }],
            discounts: vec![Discount {
                order_id,
                external_id: "D1".to_string(),
                name: None,
                amount: Money::from_minor_units(100),
            }],
            refunds: vec![],
        };

        let fin = OrderFinancials::recompute(&children);
        assert_eq!(fin.subtotal, Money::from_minor_units(2498));
        assert_eq!(fin.cogs, Money::from_minor_units(800));
        assert_eq!(fin.tip_amount, Money::from_minor_units(300));
        assert_eq!(fin.discount_amount, Money::from_minor_units(100));
        // margin = 24.98 - 1.00 - 8.00
        assert_eq!(fin.gross_margin, Money::from_minor_units(1598));
    }

    #[test]
    fn recompute_of_empty_children_is_zero() {
        let fin = OrderFinancials::recompute(&OrderChildren::default());
        assert_eq!(fin, OrderFinancials::default());
    }

    #[test]
    fn cost_snapshot_is_taken_once() {
        let order_id = OrderId::new();
        let snapped = line(order_id, "L1", 3, 1000)
            .with_cost_snapshot(Some(Money::from_minor_units(250)));
        assert_eq!(snapped.unit_cost, Some(Money::from_minor_units(250)));
        assert_eq!(snapped.line_cogs, Money::from_minor_units(750));

        // A later snapshot attempt must not overwrite the original.
        let resnapped = snapped.clone().with_cost_snapshot(Some(Money::from_minor_units(999)));
        assert_eq!(resnapped, snapped);
    }

    #[test]
    fn missing_cost_history_means_zero_cogs() {
        let order_id = OrderId::new();
        let l = line(order_id, "L1", 3, 1000).with_cost_snapshot(None);
        assert_eq!(l.unit_cost, None);
        assert_eq!(l.line_cogs, Money::ZERO);
    }

    proptest! {
        #[test]
        fn margin_identity_holds(
            lines in proptest::collection::vec((1i64..10, 1i64..100_000), 0..8),
            discounts in proptest::collection::vec(0i64..10_000, 0..4),
            costs in proptest::collection::vec(0i64..50_000, 0..8),
        ) {
            let order_id = OrderId::new();
            let line_items: Vec<_> = lines
                .iter()
                .enumerate()
                .map(|(i, (qty, cents))| {
                    let cost = costs.get(i).map(|c| Money::from_minor_units(*c));
                    line(order_id, &format!("L{i}"), *qty, *cents).with_cost_snapshot(cost)
                })
                .collect();
            let discounts: Vec<_> = discounts
                .iter()
                .enumerate()
                .map(|(i, cents)| Discount {
                    order_id,
                    external_id: format!("D{i}"),
                    name: None,
                    amount: Money::from_minor_units(*cents),
                })
                .collect();

            let children = OrderChildren { line_items, payments: vec![], discounts, refunds: vec![] };
            let fin = OrderFinancials::recompute(&children);

            let subtotal: Money = children.line_items.iter().map(|l| l.line_total).sum();
            let cogs: Money = children.line_items.iter().map(|l| l.line_cogs).sum();
            prop_assert_eq!(fin.subtotal, subtotal);
            prop_assert_eq!(fin.cogs, cogs);
            prop_assert_eq!(fin.gross_margin, subtotal - fin.discount_amount - cogs);
        }
    }
}
