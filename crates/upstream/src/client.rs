//! HTTP client for the upstream POS API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::payload::{UpstreamItem, UpstreamOrder, UpstreamStockLevel};
use crate::query::{OrderPageQuery, StockPageQuery};

/// Per-merchant access to the upstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosCredentials {
    pub external_merchant_id: String,
    pub api_token: String,
}

/// Upstream failure taxonomy.
///
/// Callers classify on these variants: `Transport` and `RateLimited` are
/// transient (retried via checkpoint backoff), `Upstream` depends on status,
/// `Decode` means the payload contract changed and retrying will not help.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("payload decode failed: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Whether a retry with backoff has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Transport(_) | UpstreamError::RateLimited => true,
            UpstreamError::Upstream { status, .. } => *status >= 500,
            UpstreamError::Decode(_) => false,
        }
    }
}

/// The three upstream operations the sync pipeline consumes.
#[async_trait]
pub trait PosApi: Send + Sync {
    /// One page of orders ordered by ascending modification time.
    async fn fetch_orders(
        &self,
        credentials: &PosCredentials,
        query: &OrderPageQuery,
    ) -> Result<Vec<UpstreamOrder>, UpstreamError>;

    /// One page of stock levels.
    async fn fetch_stock_levels(
        &self,
        credentials: &PosCredentials,
        query: &StockPageQuery,
    ) -> Result<Vec<UpstreamStockLevel>, UpstreamError>;

    /// Catalog item lookup by SKU.
    async fn find_item_by_sku(
        &self,
        credentials: &PosCredentials,
        sku: &str,
    ) -> Result<Option<UpstreamItem>, UpstreamError>;
}

/// Upstream list responses arrive wrapped in an `elements` envelope.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    elements: Vec<T>,
}

/// `reqwest`-backed implementation of [`PosApi`].
pub struct HttpPosClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpPosClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        credentials: &PosCredentials,
        path: &str,
        pairs: &[(String, String)],
    ) -> Result<Vec<T>, UpstreamError> {
        let url = format!(
            "{}/v3/merchants/{}/{}",
            self.base_url, credentials.external_merchant_id, path
        );

        tracing::debug!(%url, "fetching upstream page");

        let response = self
            .http
            .get(&url)
            .query(pairs)
            .bearer_auth(&credentials.api_token)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let page: Page<T> = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(page.elements)
    }
}

#[async_trait]
impl PosApi for HttpPosClient {
    async fn fetch_orders(
        &self,
        credentials: &PosCredentials,
        query: &OrderPageQuery,
    ) -> Result<Vec<UpstreamOrder>, UpstreamError> {
        let orders: Vec<UpstreamOrder> = self
            .get_page(credentials, "orders", &query.to_query_pairs())
            .await?;

        // Decode-time validation: a page with unkeyable records is a contract
        // break, not a per-record error.
        for order in &orders {
            order
                .validate()
                .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        }
        Ok(orders)
    }

    async fn fetch_stock_levels(
        &self,
        credentials: &PosCredentials,
        query: &StockPageQuery,
    ) -> Result<Vec<UpstreamStockLevel>, UpstreamError> {
        self.get_page(credentials, "item_stocks", &query.to_query_pairs())
            .await
    }

    async fn find_item_by_sku(
        &self,
        credentials: &PosCredentials,
        sku: &str,
    ) -> Result<Option<UpstreamItem>, UpstreamError> {
        let pairs = vec![("filter".to_string(), format!("sku={sku}"))];
        let mut items: Vec<UpstreamItem> = self.get_page(credentials, "items", &pairs).await?;
        Ok(if items.is_empty() {
            None
        } else {
            Some(items.swap_remove(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(UpstreamError::RateLimited.is_transient());
        assert!(UpstreamError::Transport("timed out".into()).is_transient());
        assert!(UpstreamError::Upstream { status: 503, message: String::new() }.is_transient());
        assert!(!UpstreamError::Upstream { status: 404, message: String::new() }.is_transient());
        assert!(!UpstreamError::Decode("bad json".into()).is_transient());
    }

    #[test]
    fn page_envelope_tolerates_missing_elements() {
        let page: Page<UpstreamItem> = serde_json::from_str("{}").unwrap();
        assert!(page.elements.is_empty());
    }

    #[test]
    fn client_normalizes_base_url() {
        let client = HttpPosClient::new("https://api.example.com/").unwrap();
        assert_eq!(client.base_url, "https://api.example.com");
    }
}
