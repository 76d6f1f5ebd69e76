use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json, Response},
};
use uuid::Uuid;

use crate::dto::admin_dto::ListAttemptsQuery;
use crate::error::Result;
use crate::AppState;

#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Query(query): Query<ListAttemptsQuery>,
) -> Result<Response> {
    let page = state.monitor_service.list_attempts(query).await?;
    Ok(Json(page).into_response())
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response> {
    let attempt = state.monitor_service.get_attempt(attempt_id).await?;
    Ok(Json(attempt).into_response())
}

#[axum::debug_handler]
pub async fn exam_activity(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
) -> Result<Response> {
    let activity = state.monitor_service.exam_activity(exam_id).await?;
    Ok(Json(activity).into_response())
}
