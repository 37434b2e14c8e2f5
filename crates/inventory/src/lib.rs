//! Inventory domain module.
//!
//! Append-only cost history (the source of cost-at-time-of-sale snapshots)
//! and per-location stock levels, implemented purely as deterministic domain
//! logic (no IO, no HTTP, no storage).

pub mod cost;
pub mod stock;

pub use cost::{CostObservation, ItemCostHistory};
pub use stock::StockLevel;
