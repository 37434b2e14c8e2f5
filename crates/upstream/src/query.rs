//! Page query parameters for the upstream listings.

/// Filters for the paged order listing.
///
/// Results are ordered by ascending modification time; the sync engine
/// depends on that ordering for cursor advancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderPageQuery {
    /// Inclusive lower bound on modification time (epoch ms).
    pub modified_time_min: i64,
    /// Inclusive upper bound on modification time (epoch ms).
    pub modified_time_max: i64,
    pub limit: u32,
    pub offset: u32,
    /// Expand line items, payments, discounts and refunds.
    pub expand_children: bool,
}

impl OrderPageQuery {
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("filter".to_string(), format!("modifiedTime>={}", self.modified_time_min)),
            ("filter".to_string(), format!("modifiedTime<={}", self.modified_time_max)),
            ("orderBy".to_string(), "modifiedTime ASC".to_string()),
            ("limit".to_string(), self.limit.to_string()),
            ("offset".to_string(), self.offset.to_string()),
        ];
        if self.expand_children {
            for expansion in ["lineItems", "payments", "discounts", "refunds"] {
                pairs.push(("expand".to_string(), expansion.to_string()));
            }
        }
        pairs
    }

    pub fn next_page(mut self) -> Self {
        self.offset += self.limit;
        self
    }
}

/// Paging for the stock-level listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockPageQuery {
    pub limit: u32,
    pub offset: u32,
}

impl StockPageQuery {
    pub fn first(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }

    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("limit".to_string(), self.limit.to_string()),
            ("offset".to_string(), self.offset.to_string()),
        ]
    }

    pub fn next_page(mut self) -> Self {
        self.offset += self.limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_query_builds_ascending_window() {
        let query = OrderPageQuery {
            modified_time_min: 100,
            modified_time_max: 200,
            limit: 50,
            offset: 0,
            expand_children: true,
        };
        let pairs = query.to_query_pairs();
        assert!(pairs.contains(&("orderBy".to_string(), "modifiedTime ASC".to_string())));
        assert_eq!(pairs.iter().filter(|(k, _)| k == "expand").count(), 4);
    }

    #[test]
    fn next_page_advances_offset_by_limit() {
        let query = OrderPageQuery {
            modified_time_min: 0,
            modified_time_max: 1,
            limit: 100,
            offset: 0,
            expand_children: false,
        };
        assert_eq!(query.next_page().offset, 100);
        assert_eq!(query.next_page().next_page().offset, 200);
    }
}
