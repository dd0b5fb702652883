//! Session guard for page routes.
//!
//! Every request to a protected path prefix goes through the same state machine:
//! no token redirects to login with a callback, a rejected token redirects to
//! login with the reason (and clears cookies) before roles are looked at, and a
//! valid token is checked against the prefix's role rule.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use super::errors::PageAuthError;
use super::session::{PresentedTokens, Resolution, Session, SessionPolicy, resolve};
use crate::db::{Database, UserRole};
use crate::impl_has_auth_backend;
use crate::jwt::{TokenCodec, unix_now};

/// A guarded path prefix and the roles allowed below it.
#[derive(Debug)]
pub struct ProtectedRoute {
    pub prefix: &'static str,
    /// `None` admits every authenticated role.
    pub roles: Option<&'static [UserRole]>,
}

impl ProtectedRoute {
    pub fn allows(&self, role: UserRole) -> bool {
        self.roles.is_none_or(|roles| roles.contains(&role))
    }

    fn matches(&self, path: &str) -> bool {
        path == self.prefix
            || path
                .strip_prefix(self.prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

pub const PROTECTED_ROUTES: &[ProtectedRoute] = &[
    ProtectedRoute {
        prefix: "/admin",
        roles: Some(&[UserRole::Admin]),
    },
    ProtectedRoute {
        prefix: "/editor",
        roles: Some(&[UserRole::Admin, UserRole::Editor]),
    },
    ProtectedRoute {
        prefix: "/dashboard",
        roles: None,
    },
    ProtectedRoute {
        prefix: "/grades",
        roles: None,
    },
    ProtectedRoute {
        prefix: "/timetable",
        roles: None,
    },
];

/// The rule guarding a path, if any.
pub fn protected_route(path: &str) -> Option<&'static ProtectedRoute> {
    PROTECTED_ROUTES.iter().find(|route| route.matches(path))
}

#[derive(Clone)]
pub struct PageGuardState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub policy: SessionPolicy,
    pub secure_cookies: bool,
}

impl_has_auth_backend!(PageGuardState);

/// Middleware guarding page routes. Unprotected paths pass through untouched.
/// On success the resolved `AuthenticatedSession` is added to request extensions.
pub async fn page_guard(
    State(state): State<PageGuardState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(route) = protected_route(request.uri().path()) else {
        return next.run(request).await;
    };

    let now = unix_now();
    let resolution = match resolve(
        &state.codec,
        &state.db,
        &state.policy,
        PresentedTokens::from_headers(request.headers()),
        now,
    )
    .await
    {
        Ok(resolution) => resolution,
        Err(e) => {
            error!("Failed to resolve page session: {}", e);
            return PageAuthError::Internal.into_response();
        }
    };

    let (session, rotation) = match resolution {
        Resolution::NoToken => {
            let callback_path = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| request.uri().path().to_string());
            return PageAuthError::Login { callback_path }.into_response();
        }
        Resolution::Token {
            session: Session::Errored { reason },
            ..
        } => {
            return PageAuthError::Rejected {
                reason,
                secure_cookies: state.secure_cookies,
            }
            .into_response();
        }
        Resolution::Token {
            session: Session::Authenticated(session),
            rotation,
        } => (session, rotation),
    };

    let mut response = if route.allows(session.role) {
        request.extensions_mut().insert(session);
        next.run(request).await
    } else {
        info!(
            user_id = session.user_id,
            role = session.role.as_str(),
            path = route.prefix,
            "Page access denied"
        );
        PageAuthError::AccessDenied.into_response()
    };

    if let Some(tokens) = rotation {
        let headers = response.headers_mut();
        for cookie in tokens.cookies(now, state.secure_cookies) {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.append(header::SET_COOKIE, value);
            }
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matching() {
        assert_eq!(protected_route("/admin").unwrap().prefix, "/admin");
        assert_eq!(protected_route("/admin/users").unwrap().prefix, "/admin");
        assert_eq!(protected_route("/grades").unwrap().prefix, "/grades");
        assert!(protected_route("/administrator").is_none());
        assert!(protected_route("/login").is_none());
        assert!(protected_route("/").is_none());
    }

    #[test]
    fn test_role_rules() {
        let admin = protected_route("/admin").unwrap();
        assert!(admin.allows(UserRole::Admin));
        assert!(!admin.allows(UserRole::Editor));
        assert!(!admin.allows(UserRole::User));

        let editor = protected_route("/editor/drafts").unwrap();
        assert!(editor.allows(UserRole::Admin));
        assert!(editor.allows(UserRole::Editor));
        assert!(!editor.allows(UserRole::User));

        for path in ["/dashboard", "/grades", "/timetable"] {
            let route = protected_route(path).unwrap();
            assert!(route.allows(UserRole::User));
            assert!(route.allows(UserRole::Admin));
        }
    }
}
