//! Schedule management endpoints.
//!
//! | Method | Path                      | Action                       |
//! |--------|---------------------------|------------------------------|
//! | POST   | `/schedules`              | create                       |
//! | GET    | `/schedules`              | list (`status`, `from`, `to`, `principal`, `limit`) |
//! | GET    | `/schedules/{id}`         | schedule plus attempt trail  |
//! | GET    | `/schedules/{id}/events`  | attempt trail                |
//! | POST   | `/schedules/{id}/cancel`  | cancel a pending schedule    |

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use cadence_core::CadenceError;
use cadence_scheduler::{
    ConnectionStore, NewSchedule, PublishEvent, Schedule, ScheduleQuery, VariantStore,
};
use serde::Serialize;

use crate::app::AppState;
use crate::http::error::ApiResult;

#[derive(Serialize)]
pub struct ScheduleDetail {
    pub schedule: Schedule,
    pub events: Vec<PublishEvent>,
}

/// POST /schedules: the variant and connection must already exist.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewSchedule>,
) -> ApiResult<(StatusCode, Json<Schedule>)> {
    if state.content.get_variant(&new.post_variant_id).await?.is_none() {
        return Err(CadenceError::NotFound {
            what: "variant",
            id: new.post_variant_id,
        }
        .into());
    }
    if state
        .content
        .get_connection(&new.channel_connection_id)
        .await?
        .is_none()
    {
        return Err(CadenceError::NotFound {
            what: "connection",
            id: new.channel_connection_id,
        }
        .into());
    }
    let schedule = state.scheduler.create(new)?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScheduleQuery>,
) -> ApiResult<Json<Vec<Schedule>>> {
    Ok(Json(state.scheduler.list(&query)?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScheduleDetail>> {
    let (schedule, events) = state.scheduler.get_with_events(&id)?;
    Ok(Json(ScheduleDetail { schedule, events }))
}

pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PublishEvent>>> {
    Ok(Json(state.scheduler.events(&id)?))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Schedule>> {
    Ok(Json(state.scheduler.cancel(&id)?))
}
