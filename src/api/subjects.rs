//! Subject API endpoints, scoped to the current user.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use serde::Deserialize;

use super::ApiState;
use super::error::{ApiError, ResultExt, parse_body, required};
use crate::auth::{AnyRole, Auth};
use crate::db::is_unique_violation;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(list_subjects).post(create_subject))
        .route("/{id}", put(rename_subject).delete(delete_subject))
        .with_state(state)
}

#[derive(Deserialize)]
struct SubjectRequest {
    name: Option<String>,
}

const DUPLICATE_SUBJECT: &str = "A subject with this name already exists";

async fn list_subjects(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let subjects = state
        .db
        .subjects()
        .list(auth.user_id())
        .await
        .db_err("Failed to list subjects")?;
    Ok(Json(subjects))
}

async fn create_subject(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    payload: Result<Json<SubjectRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let name = required(body.name.as_deref(), "name")?;

    match state.db.subjects().create(auth.user_id(), name).await {
        Ok(subject) => Ok((StatusCode::CREATED, Json(subject))),
        Err(e) if is_unique_violation(&e) => Err(ApiError::conflict(DUPLICATE_SUBJECT)),
        Err(e) => Err(ApiError::db_error("Failed to create subject", e)),
    }
}

async fn rename_subject(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    Path(id): Path<i64>,
    payload: Result<Json<SubjectRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let name = required(body.name.as_deref(), "name")?;

    match state.db.subjects().rename(auth.user_id(), id, name).await {
        Ok(Some(subject)) => Ok(Json(subject)),
        Ok(None) => Err(ApiError::not_found("Subject not found")),
        Err(e) if is_unique_violation(&e) => Err(ApiError::conflict(DUPLICATE_SUBJECT)),
        Err(e) => Err(ApiError::db_error("Failed to rename subject", e)),
    }
}

/// Delete a subject together with its grades.
async fn delete_subject(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .subjects()
        .delete(auth.user_id(), id)
        .await
        .db_err("Failed to delete subject")?;

    if !deleted {
        return Err(ApiError::not_found("Subject not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
