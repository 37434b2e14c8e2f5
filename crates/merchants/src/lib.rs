//! Merchant domain module.
//!
//! A `Merchant` is the canonical internal identity for one upstream business.
//! Merchants come into existence lazily: the first order that references an
//! unseen external identity creates one through an idempotent upsert keyed on
//! (external_id, channel).

pub mod merchant;

pub use merchant::{ExternalMerchantRef, Merchant, PosLocation};
