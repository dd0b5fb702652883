//! Grade API endpoints, scoped to the current user.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, put},
};
use serde::Deserialize;

use super::ApiState;
use super::error::{ApiError, ResultExt, parse_body, required_value};
use crate::auth::{AnyRole, Auth};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(list_grades).post(create_grade))
        .route("/by-subject-and-year", delete(delete_by_subject_and_year))
        .route("/{id}", put(update_grade).delete(delete_grade))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeRequest {
    subject_id: Option<i64>,
    value: Option<f64>,
    year: Option<i64>,
}

fn grade_value(value: Option<f64>) -> Result<f64, ApiError> {
    let value = required_value(value, "value")?;
    if !value.is_finite() {
        return Err(ApiError::bad_request("Grade value must be a number"));
    }
    Ok(value)
}

async fn list_grades(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let grades = state
        .db
        .grades()
        .list(auth.user_id())
        .await
        .db_err("Failed to list grades")?;
    Ok(Json(grades))
}

async fn create_grade(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    payload: Result<Json<GradeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let subject_id = required_value(body.subject_id, "subjectId")?;
    let value = grade_value(body.value)?;
    let year = required_value(body.year, "year")?;

    let grade = state
        .db
        .grades()
        .create(auth.user_id(), subject_id, value, year)
        .await
        .db_err("Failed to create grade")?
        .ok_or_else(|| ApiError::not_found("Subject not found"))?;

    Ok((StatusCode::CREATED, Json(grade)))
}

async fn update_grade(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    Path(id): Path<i64>,
    payload: Result<Json<GradeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let value = grade_value(body.value)?;
    let year = required_value(body.year, "year")?;

    let grade = state
        .db
        .grades()
        .update(auth.user_id(), id, value, year)
        .await
        .db_err("Failed to update grade")?
        .ok_or_else(|| ApiError::not_found("Grade not found"))?;

    Ok(Json(grade))
}

async fn delete_grade(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .grades()
        .delete(auth.user_id(), id)
        .await
        .db_err("Failed to delete grade")?;

    if !deleted {
        return Err(ApiError::not_found("Grade not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBySubjectRequest {
    subject_id: Option<i64>,
    year: Option<i64>,
}

/// 204 when grades were deleted, 200 with a message when there were none.
async fn delete_by_subject_and_year(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    payload: Result<Json<DeleteBySubjectRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = parse_body(payload)?;
    let subject_id = required_value(body.subject_id, "subjectId")?;
    let year = required_value(body.year, "year")?;

    let deleted = state
        .db
        .grades()
        .delete_by_subject_and_year(auth.user_id(), subject_id, year)
        .await
        .db_err("Failed to delete grades")?;

    if deleted > 0 {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(Json(serde_json::json!({
            "message": "No grades found for this subject and year"
        }))
        .into_response())
    }
}
