use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use cadence_core::{ChannelConnection, ChannelType, ConnectionCredentials, ConnectionStatus};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::http::error::ApiResult;

#[derive(Deserialize)]
pub struct ConnectionBody {
    pub channel_type: ChannelType,
    #[serde(default = "default_status")]
    pub status: ConnectionStatus,
    pub access_token: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_status() -> ConnectionStatus {
    ConnectionStatus::Connected
}

/// PUT /connections/{id}: register or update a channel connection.
/// The access token is never echoed back.
pub async fn upsert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ConnectionBody>,
) -> ApiResult<Json<Value>> {
    let conn = ChannelConnection {
        id,
        channel_type: body.channel_type,
        status: body.status,
        credentials: ConnectionCredentials {
            access_token: body.access_token,
            base_url: body.base_url,
        },
    };
    state.content.upsert_connection(&conn, chrono::Utc::now())?;
    Ok(Json(json!({
        "id": conn.id,
        "channel_type": conn.channel_type,
        "status": conn.status,
        "base_url": conn.credentials.base_url,
    })))
}
