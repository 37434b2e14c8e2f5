//! `tillsync-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod channel;
pub mod error;
pub mod id;
pub mod money;

pub use channel::Channel;
pub use error::{DomainError, DomainResult};
pub use id::{CheckpointId, LocationId, MerchantId, OrderId, SyncJobId};
pub use money::Money;
