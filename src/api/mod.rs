mod account;
mod admin;
mod appointments;
mod error;
mod grades;
mod sessions;
mod subjects;
mod timetable;

use axum::Router;
use std::sync::Arc;

use crate::auth::SessionPolicy;
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;

pub use account::{
    AccountState, FORGOT_PASSWORD_MESSAGE, INVALID_RESET_TOKEN_MESSAGE, RESET_TOKEN_TTL_SECS,
};
pub use error::{ApiError, ResultExt};

/// State for guarded endpoints that only need session resolution.
#[derive(Clone)]
pub struct ApiState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub policy: SessionPolicy,
    pub secure_cookies: bool,
}

impl_has_auth_backend!(ApiState);

/// Create the API router.
pub fn create_api_router(state: ApiState, account_state: AccountState) -> Router {
    Router::new()
        .merge(account::router(account_state))
        .nest("/admin", admin::router(state.clone()))
        .nest("/sessions", sessions::router(state.clone()))
        .nest("/subjects", subjects::router(state.clone()))
        .nest("/grades", grades::router(state.clone()))
        .nest("/timetable", timetable::router(state.clone()))
        .nest("/appointments", appointments::router(state))
}
