//! Account API endpoints.
//!
//! - POST `/register` - Create a user with email and password
//! - POST `/auth/login` - Verify credentials and start a session
//! - POST `/auth/logout` - Delete the current session and clear cookies
//! - GET `/auth/session` - Current session projection
//! - POST `/forgot-password` - Issue a password reset link
//! - POST `/reset-password` - Set a new password from a reset token

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

use super::error::{ApiError, ResultExt, parse_body, required, required_value};
use crate::auth::{
    ACCESS_COOKIE_NAME, AnyRole, Auth, AuthFailure, CredentialVerifier, REFRESH_COOKIE_NAME,
    ResetEmail, ResetMailer, SessionPolicy, SessionUser, SessionView, UNAUTHORIZED_MESSAGE,
    append_clear_cookies, check_password_policy, format_timestamp, get_cookie, issue_session,
};
use crate::db::{Database, NewUser, UserRole, is_unique_violation};
use crate::impl_has_auth_backend;
use crate::jwt::{TokenCodec, unix_now};
use crate::rate_limit::{
    RateLimitConfig, rate_limit_login, rate_limit_password_reset, rate_limit_register,
};

/// Reset token lifetime: 1 hour
pub const RESET_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Random bytes in a reset token before hex encoding.
const RESET_TOKEN_BYTES: usize = 32;

/// Returned by forgot-password whether or not the email is known.
pub const FORGOT_PASSWORD_MESSAGE: &str = "Verification Email has been sent.";

pub const INVALID_RESET_TOKEN_MESSAGE: &str = "Invalid or outdated Token.";

#[derive(Clone)]
pub struct AccountState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub policy: SessionPolicy,
    pub secure_cookies: bool,
    pub verifier: CredentialVerifier,
    pub mailer: Arc<dyn ResetMailer>,
    /// Base for links sent by email
    pub public_url: Url,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AccountState);

pub fn router(state: AccountState) -> Router {
    let session_router = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(current_session))
        .route("/reset-password", post(reset_password))
        .with_state(state.clone());

    let login_router = Router::new()
        .route("/auth/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_register,
        ));

    let forgot_router = Router::new()
        .route("/forgot-password", post(forgot_password))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config,
            rate_limit_password_reset,
        ));

    Router::new()
        .merge(session_router)
        .merge(login_router)
        .merge(register_router)
        .merge(forgot_router)
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct RegisterResponse {
    message: &'static str,
    user: SessionUser,
}

/// Passwords are taken verbatim; only emptiness counts as missing.
fn required_password(value: Option<&str>) -> Result<&str, ApiError> {
    required_value(value.filter(|p| !p.is_empty()), "password")
}

async fn register(
    State(state): State<AccountState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let name = required(body.name.as_deref(), "name")?;
    let email = required(body.email.as_deref(), "email")?.to_lowercase();
    let password = required_password(body.password.as_deref())?;

    if !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    check_password_policy(password).map_err(ApiError::bad_request)?;

    let available = state
        .db
        .users()
        .is_email_available(&email)
        .await
        .db_err("Failed to check email availability")?;
    if !available {
        return Err(ApiError::conflict("User with this email already exists"));
    }

    let password_hash = state
        .verifier
        .hash(password)
        .await
        .internal_err("Failed to hash password")?;

    let id = match state
        .db
        .users()
        .create(&NewUser {
            email: &email,
            name: Some(name),
            password_hash: &password_hash,
            role: UserRole::User,
        })
        .await
    {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::conflict("User with this email already exists"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    info!(user_id = id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user: SessionUser {
                id,
                email,
                name: Some(name.to_string()),
                role: UserRole::User,
            },
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
    #[serde(default)]
    remember_me: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user: SessionUser,
    expires_at: String,
}

async fn login(
    State(state): State<AccountState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let email = required(body.email.as_deref(), "email")?;
    let password = required_password(body.password.as_deref())?;

    let user = match state.verifier.verify(&state.db, email, password).await {
        Ok(user) => user,
        Err(AuthFailure::InvalidCredentials) => {
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        Err(e) => return Err(ApiError::internal_error("Failed to verify credentials", e)),
    };

    let now = unix_now();
    let (session, tokens) = issue_session(
        &state.codec,
        &state.db,
        &state.policy,
        &user,
        body.remember_me,
        now,
    )
    .await
    .internal_err("Failed to create session")?;

    let [access_cookie, refresh_cookie] = tokens.cookies(now, state.secure_cookies);

    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Json(LoginResponse {
            user: SessionUser::from(&user),
            expires_at: format_timestamp(session.expires_at),
        }),
    ))
}

/// Logout - delete the session record and clear both cookies.
/// Works with expired tokens as long as their signature is valid.
async fn logout(
    State(state): State<AccountState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = [REFRESH_COOKIE_NAME, ACCESS_COOKIE_NAME]
        .into_iter()
        .filter_map(|name| get_cookie(&headers, name))
        .find_map(|token| state.codec.peek_session_id(token));

    if let Some(session_id) = session_id {
        let deleted = state
            .db
            .sessions()
            .delete(&session_id)
            .await
            .db_err("Failed to delete session")?;
        if deleted {
            info!(session_id = %session_id, "Session logged out");
        }
    }

    let mut response = Json(serde_json::json!({ "success": true })).into_response();
    append_clear_cookies(response.headers_mut(), state.secure_cookies);
    Ok(response)
}

async fn current_session(
    State(state): State<AccountState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_id(auth.user_id())
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::unauthorized(UNAUTHORIZED_MESSAGE))?;

    Ok(Json(SessionView::project(&auth.session, &user)))
}

#[derive(Deserialize)]
struct ForgotPasswordRequest {
    email: Option<String>,
}

fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn reset_link(public_url: &Url, token: &str) -> Result<Url, url::ParseError> {
    let mut link = public_url.join("/reset-password")?;
    link.query_pairs_mut().append_pair("token", token);
    Ok(link)
}

/// Issue a reset token. The response is identical for known and unknown emails.
async fn forgot_password(
    State(state): State<AccountState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let email = required(body.email.as_deref(), "email")?;

    let user = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to get user")?;

    if let Some(user) = user {
        let mut bytes = [0u8; RESET_TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        state
            .db
            .users()
            .set_reset_token(
                user.id,
                &hash_reset_token(&token),
                unix_now() + RESET_TOKEN_TTL_SECS,
            )
            .await
            .db_err("Failed to store reset token")?;

        let link = reset_link(&state.public_url, &token).internal_err("Failed to build reset link")?;
        let message = ResetEmail {
            to_email: user.email.clone(),
            link: link.to_string(),
        };
        match state.mailer.send(&message) {
            Ok(()) => info!(user_id = user.id, "Password reset issued"),
            Err(e) => error!(user_id = user.id, error = %e, "Failed to send reset email"),
        }
    }

    Ok(Json(serde_json::json!({ "message": FORGOT_PASSWORD_MESSAGE })))
}

#[derive(Deserialize)]
struct ResetPasswordRequest {
    token: Option<String>,
    password: Option<String>,
}

/// Set a new password. All of the user's sessions are revoked.
async fn reset_password(
    State(state): State<AccountState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(payload)?;
    let token = required(body.token.as_deref(), "token")?;
    let password = required_password(body.password.as_deref())?;

    let candidate = state
        .db
        .users()
        .find_by_reset_hash(&hash_reset_token(token))
        .await
        .db_err("Failed to look up reset token")?;

    let now = unix_now();
    let user_id = match candidate {
        Some(c) if c.expires_at.is_some_and(|exp| exp > now) => c.user_id,
        _ => return Err(ApiError::bad_request(INVALID_RESET_TOKEN_MESSAGE)),
    };

    check_password_policy(password).map_err(ApiError::bad_request)?;

    let password_hash = state
        .verifier
        .hash(password)
        .await
        .internal_err("Failed to hash password")?;

    state
        .db
        .users()
        .set_password(user_id, &password_hash)
        .await
        .db_err("Failed to update password")?;

    let revoked = state
        .db
        .sessions()
        .delete_all_by_user(user_id)
        .await
        .db_err("Failed to revoke sessions")?;

    info!(user_id, revoked, "Password reset completed");

    let mut response =
        Json(serde_json::json!({ "message": "Password has been reset." })).into_response();
    append_clear_cookies(response.headers_mut(), state.secure_cookies);
    Ok(response)
}
