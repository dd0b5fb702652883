//! Axum extractors for authentication.

use std::cell::RefCell;
use std::marker::PhantomData;

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::session::{
    AuthenticatedSession, PresentedTokens, Resolution, Session, TokenPair, resolve,
};
use super::state::HasAuthBackend;
use crate::db::UserRole;
use crate::jwt::unix_now;

tokio::task_local! {
    /// Task-local storage for rotated session cookies.
    /// Used to pass cookies from the auth extractor to the response middleware.
    pub static SESSION_COOKIES: RefCell<Vec<String>>;
}

/// Hand rotated tokens to `add_session_cookies` for the current request.
pub(crate) fn queue_rotation(tokens: &TokenPair, now: i64, secure: bool) {
    let queued = SESSION_COOKIES.try_with(|cell| {
        cell.borrow_mut().extend(tokens.cookies(now, secure));
    });
    if queued.is_err() {
        warn!("Session rotated outside of add_session_cookies; new cookies are lost");
    }
}

/// Middleware that appends cookies queued by the extractor to the response.
pub async fn add_session_cookies(request: Request, next: Next) -> Response {
    SESSION_COOKIES
        .scope(RefCell::new(Vec::new()), async move {
            let mut response = next.run(request).await;
            let cookies = SESSION_COOKIES.with(|cell| cell.take());
            let headers = response.headers_mut();
            for cookie in cookies {
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
            response
        })
        .await
}

/// Role requirement checked by the `Auth` extractor.
pub trait RoleConstraint {
    fn allows(role: UserRole) -> bool;
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_role: UserRole) -> bool {
        true
    }
}

/// Administrators only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn allows(role: UserRole) -> bool {
        role == UserRole::Admin
    }
}

pub struct EditorOrAdmin;

impl RoleConstraint for EditorOrAdmin {
    fn allows(role: UserRole) -> bool {
        matches!(role, UserRole::Admin | UserRole::Editor)
    }
}

/// Extractor for API endpoints that require a live session.
/// Resolves the session from cookies, rotating tokens when the access token
/// has lapsed. Returns JSON errors instead of redirects.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub session: AuthenticatedSession,
    _role: PhantomData<R>,
}

impl<R: RoleConstraint> Auth<R> {
    pub fn user_id(&self) -> i64 {
        self.session.user_id
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let secure = state.secure_cookies();
        let now = unix_now();

        let resolution = resolve(
            state.codec(),
            state.db(),
            state.policy(),
            PresentedTokens::from_headers(&parts.headers),
            now,
        )
        .await
        .map_err(|e| {
            error!("Failed to resolve session: {}", e);
            ApiAuthError::new(AuthErrorKind::Internal, secure)
        })?;

        let session = match resolution {
            Resolution::NoToken => {
                return Err(ApiAuthError::new(AuthErrorKind::NotAuthenticated, secure));
            }
            Resolution::Token {
                session: Session::Errored { reason },
                ..
            } => {
                return Err(ApiAuthError::new(
                    AuthErrorKind::SessionRejected(reason),
                    secure,
                ));
            }
            Resolution::Token {
                session: Session::Authenticated(session),
                rotation,
            } => {
                if let Some(tokens) = rotation {
                    queue_rotation(&tokens, now, secure);
                }
                session
            }
        };

        if !R::allows(session.role) {
            return Err(ApiAuthError::new(AuthErrorKind::InsufficientRole, secure));
        }

        Ok(Auth {
            session,
            _role: PhantomData,
        })
    }
}
