//! Consumed POS platform API.
//!
//! Upstream payloads are decoded exactly once, at this boundary, into
//! explicit structs with optional nested collections; nothing loosely-typed
//! leaks into the pipeline. All monetary amounts arrive as integer minor
//! units and stay that way here; conversion to `Money` happens on
//! ingestion.

pub mod client;
pub mod payload;
pub mod query;

pub use client::{HttpPosClient, PosApi, PosCredentials, UpstreamError};
pub use payload::{
    UpstreamDiscount, UpstreamItem, UpstreamLineItem, UpstreamOrder, UpstreamPayment,
    UpstreamRefund, UpstreamStockLevel,
};
pub use query::{OrderPageQuery, StockPageQuery};
