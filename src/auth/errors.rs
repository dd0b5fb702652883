//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;

use super::cookie::append_clear_cookies;
use super::session::SessionError;

/// Body of every 401 returned by the route guard.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized: Session is invalid or has been revoked.";

/// Internal auth error kind used by the route guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No session cookies at all
    NotAuthenticated,
    /// Cookies were presented but the session is dead; the client must drop them
    SessionRejected(SessionError),
    InsufficientRole,
    Internal,
}

/// API authentication errors (returns JSON, clears cookies for rejected sessions).
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
    pub(super) secure_cookies: bool,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind, secure_cookies: bool) -> Self {
        Self {
            kind,
            secure_cookies,
        }
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::SessionRejected(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthErrorKind::InsufficientRole => StatusCode::FORBIDDEN,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::SessionRejected(_) => {
                UNAUTHORIZED_MESSAGE
            }
            AuthErrorKind::InsufficientRole => "Forbidden: Insufficient permissions.",
            AuthErrorKind::Internal => "Internal server error",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if let AuthErrorKind::SessionRejected(_) = self.kind {
            append_clear_cookies(response.headers_mut(), self.secure_cookies);
        }

        response
    }
}

/// Page guard outcome that stops the request with a redirect.
#[derive(Debug)]
pub enum PageAuthError {
    /// No session: send to login, remembering where the user was going.
    Login { callback_path: String },
    /// Dead session: send to login with the reason and drop the cookies.
    Rejected {
        reason: SessionError,
        secure_cookies: bool,
    },
    AccessDenied,
    Internal,
}

impl IntoResponse for PageAuthError {
    fn into_response(self) -> Response {
        match self {
            PageAuthError::Login { callback_path } => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(callback_path.as_bytes()).collect();
                Redirect::to(&format!("/login?callbackUrl={}", encoded)).into_response()
            }
            PageAuthError::Rejected {
                reason,
                secure_cookies,
            } => {
                let mut response =
                    Redirect::to(&format!("/login?error={}", reason.as_str())).into_response();
                append_clear_cookies(response.headers_mut(), secure_cookies);
                response
            }
            PageAuthError::AccessDenied => Redirect::to("/access-denied").into_response(),
            PageAuthError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
