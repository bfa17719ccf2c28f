use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::error::ApiResult;

/// GET /health: liveness probe with per-status schedule counts.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let counts: BTreeMap<String, u64> = state
        .scheduler
        .status_counts()?
        .into_iter()
        .map(|(status, n)| (status.to_string(), n))
        .collect();
    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "worker_id": state.worker_id,
        "poll_interval_secs": state.config.scheduler.poll_interval_secs,
        "schedules": counts,
    })))
}
