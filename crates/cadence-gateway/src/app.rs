use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use cadence_content::SqliteContentStore;
use cadence_core::CadenceConfig;
use cadence_scheduler::SchedulerHandle;

use crate::http;

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: CadenceConfig,
    pub scheduler: SchedulerHandle,
    pub content: Arc<SqliteContentStore>,
    /// Identity of the in-process engine, reported by `/health`.
    pub worker_id: String,
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(http::health::health_handler))
        .route(
            "/schedules",
            post(http::schedules::create).get(http::schedules::list),
        )
        .route("/schedules/{id}", get(http::schedules::get))
        .route("/schedules/{id}/events", get(http::schedules::events))
        .route("/schedules/{id}/cancel", post(http::schedules::cancel))
        .route("/variants/{id}", put(http::variants::upsert))
        .route(
            "/variants/{id}/schedules",
            delete(http::variants::remove_schedules),
        )
        .route("/connections/{id}", put(http::connections::upsert))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
