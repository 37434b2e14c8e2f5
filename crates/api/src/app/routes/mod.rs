use axum::Router;

pub mod inventory;
pub mod jobs;
pub mod merchants;
pub mod system;

/// Router for all sync-operation endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/sync/jobs", jobs::router())
        .nest("/sync/merchants", merchants::router())
        .nest("/sync/inventory", inventory::router())
}
