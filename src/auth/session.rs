//! Session issuance and resolution.
//!
//! `issue_session` runs once at login and writes the session record. `resolve`
//! runs on every guarded request: it verifies the presented tokens, checks the
//! record in the store (the store is authoritative, so a revoked session fails
//! even while its access token is unexpired) and rotates the refresh token when
//! the access token has lapsed. Both take the clock as an argument.

use axum::http::HeaderMap;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie, token_cookie};
use crate::db::{Database, NewSession, SessionRecord, User, UserRole};
use crate::jwt::{JwtError, TokenCodec};

/// Access token lifetime: 1 hour
pub const ACCESS_TTL_SECS: i64 = 60 * 60;

/// Session lifetime without "remember me": 7 hours
pub const SESSION_TTL_SECS: i64 = 7 * 60 * 60;

/// Session lifetime with "remember me": 7 days
pub const REMEMBER_ME_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// How long a refresh token superseded by rotation is still honoured: 30 seconds
pub const ROTATION_GRACE_SECS: i64 = 30;

/// Token and session lifetimes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub access_ttl: i64,
    pub session_ttl: i64,
    pub remember_me_ttl: i64,
    /// Requests that raced a rotation with the previous refresh token get the
    /// current tokens instead of an error within this window. Zero disables it.
    pub rotation_grace: i64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            access_ttl: ACCESS_TTL_SECS,
            session_ttl: SESSION_TTL_SECS,
            remember_me_ttl: REMEMBER_ME_TTL_SECS,
            rotation_grace: ROTATION_GRACE_SECS,
        }
    }
}

impl SessionPolicy {
    /// Lifetime of a new session record.
    pub fn session_ttl(&self, remember_me: bool) -> i64 {
        if remember_me {
            self.remember_me_ttl
        } else {
            self.session_ttl
        }
    }
}

/// Why a presented session was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Valid access token, but its record is gone, expired or owned by someone else.
    InvalidSession,
    /// The access token lapsed and the refresh token could not renew it.
    RefreshFailed,
}

impl SessionError {
    /// Name used as the login page's `error` query value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionError::InvalidSession => "InvalidSessionError",
            SessionError::RefreshFailed => "RefreshAccessTokenError",
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session backed by a live record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession {
    pub session_id: String,
    pub user_id: i64,
    /// Role snapshot from the record
    pub role: UserRole,
    pub expires_at: i64,
}

impl From<&SessionRecord> for AuthenticatedSession {
    fn from(record: &SessionRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            user_id: record.user_id,
            role: record.role,
            expires_at: record.expires_at,
        }
    }
}

/// Outcome for a request that presented at least one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Authenticated(AuthenticatedSession),
    Errored { reason: SessionError },
}

/// Freshly minted tokens for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: i64,
    pub refresh_token: String,
    pub refresh_expires_at: i64,
}

impl TokenPair {
    /// `Set-Cookie` values for both tokens. Cookie lifetime follows token expiry.
    pub fn cookies(&self, now: i64, secure: bool) -> [String; 2] {
        [
            token_cookie(
                ACCESS_COOKIE_NAME,
                &self.access_token,
                self.access_expires_at - now,
                secure,
            ),
            token_cookie(
                REFRESH_COOKIE_NAME,
                &self.refresh_token,
                self.refresh_expires_at - now,
                secure,
            ),
        ]
    }
}

/// Result of resolving a request's cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Neither cookie was presented.
    NoToken,
    /// `rotation` holds replacement tokens when the refresh token was used.
    Token {
        session: Session,
        rotation: Option<TokenPair>,
    },
}

impl Resolution {
    fn errored(reason: SessionError) -> Self {
        Resolution::Token {
            session: Session::Errored { reason },
            rotation: None,
        }
    }

    fn rotated(record: &SessionRecord, tokens: TokenPair) -> Self {
        Resolution::Token {
            session: Session::Authenticated(AuthenticatedSession::from(record)),
            rotation: Some(tokens),
        }
    }
}

/// Raw token strings presented by the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentedTokens<'a> {
    pub access: Option<&'a str>,
    pub refresh: Option<&'a str>,
}

impl<'a> PresentedTokens<'a> {
    pub fn from_headers(headers: &'a HeaderMap) -> Self {
        Self {
            access: get_cookie(headers, ACCESS_COOKIE_NAME),
            refresh: get_cookie(headers, REFRESH_COOKIE_NAME),
        }
    }
}

/// Infrastructure failure while resolving or issuing a session.
#[derive(Debug)]
pub enum ResolveError {
    Store(sqlx::Error),
    Token(JwtError),
}

impl From<sqlx::Error> for ResolveError {
    fn from(e: sqlx::Error) -> Self {
        ResolveError::Store(e)
    }
}

impl From<JwtError> for ResolveError {
    fn from(e: JwtError) -> Self {
        ResolveError::Token(e)
    }
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::Store(e) => write!(f, "Session store error: {}", e),
            ResolveError::Token(e) => write!(f, "Token error: {}", e),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Mint both tokens for a record. No token outlives the record.
fn mint(
    codec: &TokenCodec,
    policy: &SessionPolicy,
    record: &SessionRecord,
    now: i64,
) -> Result<TokenPair, JwtError> {
    let access_expires_at = (now + policy.access_ttl).min(record.expires_at);
    let access_token = codec.issue_access(
        &record.session_id,
        record.user_id,
        record.role,
        now,
        access_expires_at,
    )?;
    let refresh_token = codec.issue_refresh(
        &record.session_id,
        &record.refresh_jti,
        record.user_id,
        now,
        record.expires_at,
    )?;
    Ok(TokenPair {
        access_token,
        access_expires_at,
        refresh_token,
        refresh_expires_at: record.expires_at,
    })
}

/// Create a session record for a verified user and mint its first tokens.
pub async fn issue_session(
    codec: &TokenCodec,
    db: &Database,
    policy: &SessionPolicy,
    user: &User,
    remember_me: bool,
    now: i64,
) -> Result<(AuthenticatedSession, TokenPair), ResolveError> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let jti = uuid::Uuid::new_v4().to_string();

    let record = db
        .sessions()
        .create(
            &session_id,
            &NewSession {
                user_id: user.id,
                role: user.role,
                refresh_jti: &jti,
            },
            policy.session_ttl(remember_me),
            now,
        )
        .await?;
    let tokens = mint(codec, policy, &record, now)?;

    info!(user_id = user.id, session_id = %session_id, remember_me, "Session created");
    Ok((AuthenticatedSession::from(&record), tokens))
}

/// Resolve the session for a request.
pub async fn resolve(
    codec: &TokenCodec,
    db: &Database,
    policy: &SessionPolicy,
    tokens: PresentedTokens<'_>,
    now: i64,
) -> Result<Resolution, ResolveError> {
    if tokens.access.is_none() && tokens.refresh.is_none() {
        return Ok(Resolution::NoToken);
    }

    if let Some(claims) = tokens.access.and_then(|t| codec.verify_access(t, now).ok()) {
        return match db.sessions().read(&claims.sid, now).await? {
            Some(record) if record.user_id == claims.sub => Ok(Resolution::Token {
                session: Session::Authenticated(AuthenticatedSession::from(&record)),
                rotation: None,
            }),
            _ => {
                warn!(user_id = claims.sub, session_id = %claims.sid, "Access token for a session that is no longer live");
                Ok(Resolution::errored(SessionError::InvalidSession))
            }
        };
    }

    let Some(refresh_token) = tokens.refresh else {
        return Ok(Resolution::errored(SessionError::RefreshFailed));
    };

    let claims = match codec.verify_refresh(refresh_token, now) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "Refresh token rejected");
            return Ok(Resolution::errored(SessionError::RefreshFailed));
        }
    };

    let mut record = match db.sessions().read(&claims.sid, now).await? {
        Some(record) if record.user_id == claims.sub => record,
        _ => {
            warn!(user_id = claims.sub, session_id = %claims.sid, "Refresh token for a session that is no longer live");
            return Ok(Resolution::errored(SessionError::RefreshFailed));
        }
    };

    if record.refresh_jti == claims.jti {
        let new_jti = uuid::Uuid::new_v4().to_string();
        if db
            .sessions()
            .rotate(&record.session_id, &claims.jti, &new_jti, now)
            .await?
        {
            record.prev_jti = Some(std::mem::replace(&mut record.refresh_jti, new_jti));
            record.rotated_at = Some(now);
            record.last_seen_at = now;

            let tokens = mint(codec, policy, &record, now)?;
            info!(user_id = record.user_id, session_id = %record.session_id, "Session tokens rotated");
            return Ok(Resolution::rotated(&record, tokens));
        }

        // Another request rotated first; its write is the record now
        record = match db.sessions().read(&claims.sid, now).await? {
            Some(record) if record.user_id == claims.sub => record,
            _ => return Ok(Resolution::errored(SessionError::RefreshFailed)),
        };
    }

    if record.accepts_previous(&claims.jti, now, policy.rotation_grace) {
        let tokens = mint(codec, policy, &record, now)?;
        info!(
            user_id = record.user_id,
            session_id = %record.session_id,
            "Refresh raced a rotation, reissued current tokens"
        );
        return Ok(Resolution::rotated(&record, tokens));
    }

    warn!(user_id = claims.sub, session_id = %claims.sid, "Refresh token does not match a live session");
    Ok(Resolution::errored(SessionError::RefreshFailed))
}

/// Public fields of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// Client-facing projection of an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub user: SessionUser,
    pub session_id: String,
    pub expires: String,
}

impl SessionView {
    /// The role shown is the session's snapshot, not the user's current role.
    pub fn project(session: &AuthenticatedSession, user: &User) -> Self {
        Self {
            user: SessionUser {
                role: session.role,
                ..SessionUser::from(user)
            },
            session_id: session.session_id.clone(),
            expires: format_timestamp(session.expires_at),
        }
    }
}

/// Format Unix seconds as an RFC 3339 UTC timestamp.
pub fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}
