//! Order domain module.
//!
//! Contains the ingested `Order` row, its child entities, and the pure
//! derivations over them: per-order financials and per-day sales aggregates.
//! Everything here is deterministic domain logic (no IO, no HTTP, no storage);
//! derived values are always recomputed from current children, never
//! incrementally mutated.

pub mod daily;
pub mod order;

pub use daily::{aggregate_daily_sales, DailySales};
pub use order::{
    Discount, Order, OrderChildren, OrderFinancials, OrderLineItem, Payment, Refund,
};
