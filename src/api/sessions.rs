//! Session management API endpoints.
//!
//! - GET `/` - List live sessions of the current user
//! - DELETE `/` - Revoke a session named in the body (`{ sessionId }`)
//! - DELETE `/{session_id}` - Revoke a session named in the path

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ApiState;
use super::error::{ApiError, ResultExt, parse_body, required};
use crate::auth::{AnyRole, Auth, append_clear_cookies, format_timestamp};
use crate::db::UserRole;
use crate::jwt::unix_now;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(list_sessions).delete(revoke_from_body))
        .route("/{session_id}", delete(revoke_from_path))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    session_id: String,
    role: UserRole,
    created_at: String,
    expires_at: String,
    last_seen_at: String,
    ttl_in_seconds: i64,
    is_current: bool,
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

/// List the caller's live sessions, newest first.
async fn list_sessions(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let now = unix_now();
    let records = state
        .db
        .sessions()
        .list_by_user(auth.user_id(), now)
        .await
        .db_err("Failed to list sessions")?;

    let sessions = records
        .into_iter()
        .map(|record| SessionInfo {
            is_current: record.session_id == auth.session.session_id,
            ttl_in_seconds: record.remaining_ttl(now),
            created_at: format_timestamp(record.created_at),
            expires_at: format_timestamp(record.expires_at),
            last_seen_at: format_timestamp(record.last_seen_at),
            role: record.role,
            session_id: record.session_id,
        })
        .collect();

    Ok(Json(ListSessionsResponse { sessions }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeRequest {
    session_id: Option<String>,
}

#[derive(Serialize)]
struct RevokeResponse {
    revoked: bool,
}

async fn revoke_from_body(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    payload: Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let session_id = required(body.session_id.as_deref(), "sessionId")?;
    revoke_session(&state, &auth, session_id).await
}

async fn revoke_from_path(
    State(state): State<ApiState>,
    auth: Auth<AnyRole>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    revoke_session(&state, &auth, &session_id).await
}

/// Revoke one session. Only the owner may revoke; an absent record is a no-op.
/// Revoking the caller's own session also clears its cookies, like logout.
async fn revoke_session(
    state: &ApiState,
    auth: &Auth<AnyRole>,
    session_id: &str,
) -> Result<Response, ApiError> {
    let record = state
        .db
        .sessions()
        .read(session_id, unix_now())
        .await
        .db_err("Failed to get session")?;

    let Some(record) = record else {
        return Ok(Json(RevokeResponse { revoked: false }).into_response());
    };

    if record.user_id != auth.user_id() {
        warn!(
            user_id = auth.user_id(),
            session_id = %session_id,
            "Attempt to revoke another user's session"
        );
        return Err(ApiError::forbidden("Cannot revoke another user's session"));
    }

    let revoked = state
        .db
        .sessions()
        .delete(session_id)
        .await
        .db_err("Failed to revoke session")?;

    if revoked {
        info!(user_id = auth.user_id(), session_id = %session_id, "Session revoked");
    }

    let mut response = Json(RevokeResponse { revoked }).into_response();
    if session_id == auth.session.session_id {
        append_clear_cookies(response.headers_mut(), state.secure_cookies);
    }
    Ok(response)
}
