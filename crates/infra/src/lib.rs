//! `tillsync-infra` — storage layer.
//!
//! The sync pipeline depends only on the typed store traits in
//! [`store::traits`]; the in-memory implementation backs tests and dev, the
//! Postgres implementation backs production. Sync-state records (cursors,
//! jobs, checkpoints) live here because their lifecycle is owned by the
//! storage/orchestration layer, not the business domain.

pub mod records;
pub mod store;

pub use records::{
    CheckpointStatus, CursorDataType, JobStatus, SyncCheckpoint, SyncCursor, SyncJob,
};
pub use store::memory::MemoryStore;
pub use store::postgres::PostgresStore;
pub use store::traits::{
    CostStore, CursorStore, DailySalesStore, JobStore, LocationStore, MerchantStore, OrderStore,
    StockStore, Store, StoreError, StoreResult, UpsertOutcome,
};
