use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::public_dto::{CreateAttemptRequest, SaveAnswersRequest};
use crate::error::Result;
use crate::routes::extract::JsonBody;
use crate::utils::client_ip::ClientAddr;
use crate::AppState;

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
    ClientAddr(client): ClientAddr,
    JsonBody(req): JsonBody<CreateAttemptRequest>,
) -> Result<Response> {
    req.validate()?;
    let created = state
        .entry_service
        .start_attempt(exam_id, req.access, client)
        .await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

#[axum::debug_handler]
pub async fn get_state(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response> {
    let current = state.attempt_service.get_state(attempt_id).await?;
    Ok(Json(current).into_response())
}

#[axum::debug_handler]
pub async fn save_answers(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    JsonBody(req): JsonBody<SaveAnswersRequest>,
) -> Result<Response> {
    req.validate()?;
    let saved = state.attempt_service.save(attempt_id, req).await?;
    Ok(Json(saved).into_response())
}

#[axum::debug_handler]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response> {
    let submitted = state.attempt_service.submit(attempt_id).await?;
    Ok(Json(submitted).into_response())
}
