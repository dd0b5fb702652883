//! Calendar appointment API endpoints, scoped to the current user.

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::ApiState;
use super::error::{ApiError, ResultExt, parse_body, required, required_value};
use crate::auth::{AnyRole, Auth};

/// Appointments older than this are purged whenever the list is read.
const RETENTION_DAYS: i64 = 365;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/",
            get(list_appointments)
                .post(create_appointment)
                .delete(delete_appointment),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    all: bool,
}

/// Upcoming appointments, or all of them with `?all=true`.
async fn list_appointments(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let appointments = state.db.appointments();

    appointments
        .purge_older_than(auth.user_id(), now - Duration::days(RETENTION_DAYS))
        .await
        .db_err("Failed to purge appointments")?;

    let list = (if query.all {
        appointments.list_all(auth.user_id()).await
    } else {
        appointments.upcoming(auth.user_id(), now).await
    })
    .db_err("Failed to list appointments")?;

    Ok(Json(list))
}

#[derive(Deserialize)]
struct CreateRequest {
    title: Option<String>,
    date: Option<String>,
}

async fn create_appointment(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let title = required(body.title.as_deref(), "title")?;
    let date = required(body.date.as_deref(), "date")?;
    let date = DateTime::parse_from_rfc3339(date)
        .map_err(|_| ApiError::bad_request("Date must be an RFC 3339 timestamp"))?
        .with_timezone(&Utc);

    let appointment = state
        .db
        .appointments()
        .create(auth.user_id(), title, date)
        .await
        .db_err("Failed to create appointment")?;

    Ok((StatusCode::CREATED, Json(appointment)))
}

#[derive(Deserialize)]
struct DeleteQuery {
    id: Option<i64>,
}

async fn delete_appointment(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = required_value(query.id, "id")?;

    let deleted = state
        .db
        .appointments()
        .delete(auth.user_id(), id)
        .await
        .db_err("Failed to delete appointment")?;

    if !deleted {
        return Err(ApiError::not_found("Appointment not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
