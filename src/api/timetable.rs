//! Timetable API endpoints, scoped to the current user.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use super::ApiState;
use super::error::{ApiError, ResultExt, parse_body, required_value};
use crate::auth::{AnyRole, Auth};
use crate::db::TimetableRowInput;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(get_timetable).post(replace_timetable))
        .with_state(state)
}

async fn get_timetable(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .db
        .timetable()
        .get(auth.user_id())
        .await
        .db_err("Failed to load timetable")?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CellInput {
    subject_id: Option<i64>,
}

#[derive(Deserialize)]
struct RowInput {
    #[serde(default)]
    label: String,
    #[serde(default)]
    cells: Vec<CellInput>,
}

#[derive(Deserialize)]
struct TimetableRequest {
    data: Option<Vec<RowInput>>,
}

/// Replace the whole grid and return it as stored.
async fn replace_timetable(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    payload: Result<Json<TimetableRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let rows: Vec<TimetableRowInput> = required_value(body.data, "data")?
        .into_iter()
        .map(|row| TimetableRowInput {
            label: row.label.trim().to_string(),
            cells: row.cells.into_iter().map(|c| c.subject_id).collect(),
        })
        .collect();

    state
        .db
        .timetable()
        .replace(auth.user_id(), &rows)
        .await
        .db_err("Failed to save timetable")?;

    let saved = state
        .db
        .timetable()
        .get(auth.user_id())
        .await
        .db_err("Failed to load timetable")?;
    Ok(Json(saved))
}
