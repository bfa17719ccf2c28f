use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use cadence_core::{MediaItem, VariantContent};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::error::ApiResult;

#[derive(Deserialize)]
pub struct VariantBody {
    pub text: String,
    #[serde(default)]
    pub media: Vec<MediaItem>,
}

/// PUT /variants/{id}: create or replace a post variant's content.
pub async fn upsert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<VariantBody>,
) -> ApiResult<Json<VariantContent>> {
    let variant = VariantContent {
        variant_id: id,
        text: body.text,
        media: body.media,
    };
    state.content.upsert_variant(&variant, chrono::Utc::now())?;
    Ok(Json(variant))
}

/// DELETE /variants/{id}/schedules: soft-delete the variant's schedules.
pub async fn remove_schedules(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let removed = state.scheduler.remove_variant(&id)?;
    Ok(Json(json!({ "variant_id": id, "removed": removed })))
}
