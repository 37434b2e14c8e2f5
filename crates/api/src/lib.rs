//! `tillsync-api` — operational HTTP surface for the sync pipeline.
//!
//! The fronting admin layer authenticates its own users; this service only
//! exposes the sync operations (job start/status/cancel, manual triggers,
//! cursor queries) to it.

pub mod app;
