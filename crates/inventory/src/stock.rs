use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tillsync_core::MerchantId;

/// Current stock on hand for one catalog item at one merchant.
///
/// Replaced wholesale by each inventory sync; there is no delta arithmetic
/// on this row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub merchant_id: MerchantId,
    pub item_external_id: String,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub quantity: i64,
    pub as_of: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_round_trip() {
        let level = StockLevel {
            merchant_id: MerchantId::new(),
            item_external_id: "ITEM1".to_string(),
            sku: Some("SKU-1".to_string()),
            name: Some("Espresso Beans".to_string()),
            quantity: 42,
            as_of: Utc::now(),
        };
        let json = serde_json::to_string(&level).unwrap();
        let back: StockLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, level);
    }
}
