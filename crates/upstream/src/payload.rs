//! Upstream record shapes.
//!
//! Field names follow the upstream wire format (camelCase); amounts are
//! integer minor units; nested collections are optional because the upstream
//! only includes them when expansion was requested.

use serde::{Deserialize, Serialize};

use tillsync_core::{DomainError, DomainResult};

/// One upstream order, with whatever expansions the query asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamOrder {
    pub id: String,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Minor units.
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub note: Option<String>,
    /// Epoch milliseconds.
    pub created_time: i64,
    /// Epoch milliseconds; drives incremental sync ordering.
    pub modified_time: i64,
    #[serde(default)]
    pub line_items: Option<Vec<UpstreamLineItem>>,
    #[serde(default)]
    pub payments: Option<Vec<UpstreamPayment>>,
    #[serde(default)]
    pub discounts: Option<Vec<UpstreamDiscount>>,
    #[serde(default)]
    pub refunds: Option<Vec<UpstreamRefund>>,
}

impl UpstreamOrder {
    /// Boundary validation: reject records the pipeline cannot key.
    pub fn validate(&self) -> DomainResult<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::validation("upstream order id cannot be empty"));
        }
        if self.modified_time <= 0 {
            return Err(DomainError::validation(format!(
                "order {}: modifiedTime must be positive",
                self.id
            )));
        }
        Ok(())
    }

    pub fn line_items(&self) -> &[UpstreamLineItem] {
        self.line_items.as_deref().unwrap_or_default()
    }

    pub fn payments(&self) -> &[UpstreamPayment] {
        self.payments.as_deref().unwrap_or_default()
    }

    pub fn discounts(&self) -> &[UpstreamDiscount] {
        self.discounts.as_deref().unwrap_or_default()
    }

    pub fn refunds(&self) -> &[UpstreamRefund] {
        self.refunds.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamLineItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    /// Catalog item reference, used for cost-at-sale resolution.
    #[serde(default)]
    pub item_id: Option<String>,
    /// Unit price in minor units.
    #[serde(default)]
    pub price: i64,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub tax_amount: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamPayment {
    pub id: String,
    #[serde(default)]
    pub tender: Option<String>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub tip_amount: i64,
    #[serde(default)]
    pub tax_amount: i64,
    #[serde(default)]
    pub created_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamDiscount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRefund {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_time: Option<i64>,
}

/// One stock row from the paged inventory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamStockLevel {
    pub item_id: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    /// Unit cost in minor units, when the upstream catalog carries one.
    #[serde(default)]
    pub cost: Option<i64>,
}

/// A catalog item looked up by SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamItem {
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub cost: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_expanded_order() {
        let json = serde_json::json!({
            "id": "ORD1",
            "merchantId": "MER1",
            "state": "locked",
            "currency": "USD",
            "total": 1999,
            "createdTime": 1_700_000_000_000i64,
            "modifiedTime": 1_700_000_100_000i64,
            "lineItems": [
                {"id": "L1", "name": "Latte", "price": 999, "quantity": 2, "taxAmount": 80}
            ],
            "payments": [
                {"id": "P1", "tender": "CREDIT_CARD", "amount": 1999, "tipAmount": 200}
            ]
        });

        let order: UpstreamOrder = serde_json::from_value(json).unwrap();
        order.validate().unwrap();
        assert_eq!(order.line_items().len(), 1);
        assert_eq!(order.line_items()[0].quantity, 2);
        assert_eq!(order.payments()[0].tip_amount, 200);
        assert!(order.discounts().is_empty());
        assert!(order.refunds().is_empty());
    }

    #[test]
    fn decodes_unexpanded_order_with_absent_collections() {
        let json = serde_json::json!({
            "id": "ORD2",
            "total": 500,
            "createdTime": 1_700_000_000_000i64,
            "modifiedTime": 1_700_000_000_000i64
        });

        let order: UpstreamOrder = serde_json::from_value(json).unwrap();
        order.validate().unwrap();
        assert!(order.line_items.is_none());
        assert!(order.line_items().is_empty());
    }

    #[test]
    fn validate_rejects_unkeyable_records() {
        let mut order: UpstreamOrder = serde_json::from_value(serde_json::json!({
            "id": "ORD3",
            "createdTime": 1i64,
            "modifiedTime": 1i64
        }))
        .unwrap();

        order.id = "  ".to_string();
        assert!(order.validate().is_err());

        order.id = "ORD3".to_string();
        order.modified_time = 0;
        assert!(order.validate().is_err());
    }

    #[test]
    fn line_item_quantity_defaults_to_one() {
        let line: UpstreamLineItem =
            serde_json::from_value(serde_json::json!({"id": "L1", "price": 250})).unwrap();
        assert_eq!(line.quantity, 1);
    }
}
