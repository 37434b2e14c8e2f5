//! Infrastructure wiring for the API process.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use tillsync_engine::{
    InventoryScheduler, JobOrchestrator, OrchestratorConfig, SchedulerConfig, SyncEngine,
    SyncEngineConfig,
};
use tillsync_infra::{MemoryStore, PostgresStore, Store};
use tillsync_upstream::HttpPosClient;

/// Environment-derived configuration for [`build_services`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Absent → in-memory store (dev only).
    pub database_url: Option<String>,
    pub upstream_base_url: String,
    pub worker_interval: Duration,
    pub inventory_interval: Duration,
}

/// Everything the routes and background loops share.
pub struct AppServices {
    pub store: Arc<dyn Store>,
    pub engine: Arc<SyncEngine>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub scheduler: Arc<InventoryScheduler>,
}

pub async fn build_services(config: ServiceConfig) -> anyhow::Result<Arc<AppServices>> {
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(8).connect(url).await?;
            let store = PostgresStore::new(pool);
            store.ensure_schema().await?;
            tracing::info!("using postgres store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store (state is not durable)");
            Arc::new(MemoryStore::new())
        }
    };

    let pos = Arc::new(HttpPosClient::new(&config.upstream_base_url)?);
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        pos,
        SyncEngineConfig::default(),
    ));

    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone(),
        engine.clone(),
        OrchestratorConfig::default().with_tick_interval(config.worker_interval),
    ));
    let scheduler = Arc::new(InventoryScheduler::new(
        store.clone(),
        engine.clone(),
        SchedulerConfig::default().with_interval(config.inventory_interval),
    ));

    Ok(Arc::new(AppServices {
        store,
        engine,
        orchestrator,
        scheduler,
    }))
}
