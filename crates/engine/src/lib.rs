//! `tillsync-engine` — the synchronization and job-orchestration engine.
//!
//! - [`SyncEngine`] pulls paged order and stock data from the upstream POS
//!   API, performs idempotent multi-entity upserts, and recomputes derived
//!   financial aggregates.
//! - [`MerchantResolver`] lazily maps external merchant identities onto
//!   canonical internal records.
//! - [`JobOrchestrator`] drives long-running, resumable, checkpointed
//!   historical sync jobs that survive process restarts.
//! - [`InventoryScheduler`] triggers periodic stock-level syncs with an
//!   overlap guard.

pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod scheduler;

#[cfg(test)]
mod integration_tests;

pub use engine::{
    InventoryReport, OrderSyncError, SyncEngine, SyncEngineConfig, SyncOptions, SyncReport,
};
pub use error::SyncError;
pub use orchestrator::{
    HistoricalSyncRequest, JobOrchestrator, OrchestratorConfig, TickOutcome,
};
pub use resolver::MerchantResolver;
pub use scheduler::{InventoryRunSummary, InventoryScheduler, SchedulerConfig, SchedulerStatus};
