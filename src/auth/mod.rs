//! Session authentication with role-based access control.
//!
//! A login writes a session record to the store and hands the browser two
//! signed tokens: a short-lived access token and a refresh token bound to the
//! record's current `jti`. Every guarded request re-reads the record, so
//! revocation takes effect immediately; lapsed access tokens are renewed from
//! the refresh token and the new cookies are attached to the response.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod mailer;
mod middleware;
mod password;
mod session;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, append_clear_cookies, clear_cookie, get_cookie,
    token_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind, PageAuthError, UNAUTHORIZED_MESSAGE};
pub use extractors::{
    AdminOnly, AnyRole, Auth, EditorOrAdmin, RoleConstraint, SESSION_COOKIES,
    add_session_cookies,
};
pub use ip::{ClientIpHeader, HasHeadersAndExtensions, extract_client_ip};
pub use mailer::{LogMailer, MailError, ResetEmail, ResetMailer};
pub use middleware::{PROTECTED_ROUTES, PageGuardState, ProtectedRoute, page_guard, protected_route};
pub use password::{
    AuthFailure, CredentialVerifier, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH, PasswordError,
    check_password_policy,
};
pub use session::{
    ACCESS_TTL_SECS, AuthenticatedSession, PresentedTokens, REMEMBER_ME_TTL_SECS,
    ROTATION_GRACE_SECS, Resolution, ResolveError, SESSION_TTL_SECS, Session, SessionError,
    SessionPolicy, SessionUser, SessionView, TokenPair, format_timestamp, issue_session, resolve,
};
pub use state::HasAuthBackend;
