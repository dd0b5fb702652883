//! User administration endpoints.
//!
//! - GET `/users` - List all users (editor or admin)
//! - PUT `/users/{id}/role` - Change a user's role (admin only)
//!
//! A role change applies from the user's next login; live sessions keep
//! the role they were issued with.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, put},
};
use serde::Deserialize;
use tracing::info;

use super::ApiState;
use super::error::{ApiError, ResultExt, parse_body, required_value};
use crate::auth::{AdminOnly, Auth, EditorOrAdmin, SessionUser};
use crate::db::UserRole;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/role", put(set_role))
        .with_state(state)
}

async fn list_users(
    State(state): State<ApiState>,
    _auth: Auth<EditorOrAdmin>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .db
        .users()
        .list()
        .await
        .db_err("Failed to list users")?;

    let users: Vec<SessionUser> = users.iter().map(SessionUser::from).collect();
    Ok(Json(users))
}

#[derive(Deserialize)]
struct RoleRequest {
    role: Option<UserRole>,
}

async fn set_role(
    State(state): State<ApiState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<i64>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let role = required_value(parse_body(payload)?.role, "role")?;

    let updated = state
        .db
        .users()
        .set_role(id, role)
        .await
        .db_err("Failed to update role")?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    let user = state
        .db
        .users()
        .get_by_id(id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!(admin_id = auth.user_id(), user_id = id, role = role.as_str(), "User role changed");
    Ok(Json(SessionUser::from(&user)))
}
