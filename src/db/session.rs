//! Session record storage.
//!
//! One row per active login. The row's `expires_at` is its time-to-live: it is
//! written by the INSERT that creates the row, and every read filters on it, so an
//! expired record is indistinguishable from a missing one. Physical eviction of
//! expired rows happens opportunistically on `create` and in the startup sweep.

use sqlx::sqlite::SqlitePool;

use super::UserRole;

/// A live session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: i64,
    /// Role snapshot taken at login.
    pub role: UserRole,
    /// ID of the refresh token currently accepted for this session.
    pub refresh_jti: String,
    /// ID replaced by the most recent rotation, still honoured for a short grace window.
    pub prev_jti: Option<String>,
    pub rotated_at: Option<i64>,
    pub expires_at: i64,
    pub created_at: i64,
    pub last_seen_at: i64,
}

impl SessionRecord {
    /// Seconds until the record expires, never negative.
    pub fn remaining_ttl(&self, now: i64) -> i64 {
        (self.expires_at - now).max(0)
    }

    /// Whether `jti` was superseded by a rotation less than `grace_secs` ago.
    pub fn accepts_previous(&self, jti: &str, now: i64, grace_secs: i64) -> bool {
        self.prev_jti.as_deref() == Some(jti)
            && self.rotated_at.is_some_and(|at| now < at + grace_secs)
    }
}

/// Fields of a session record supplied at login.
pub struct NewSession<'a> {
    pub user_id: i64,
    pub role: UserRole,
    pub refresh_jti: &'a str,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    user_id: i64,
    role: String,
    refresh_jti: String,
    prev_jti: Option<String>,
    rotated_at: Option<i64>,
    expires_at: i64,
    created_at: i64,
    last_seen_at: i64,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            session_id: row.session_id,
            user_id: row.user_id,
            role: UserRole::from_str(&row.role),
            refresh_jti: row.refresh_jti,
            prev_jti: row.prev_jti,
            rotated_at: row.rotated_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
            last_seen_at: row.last_seen_at,
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT session_id, user_id, role, refresh_jti, prev_jti, rotated_at,
     expires_at, created_at, last_seen_at FROM sessions";

/// Store for session records.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a session record that expires `ttl_secs` after `now`.
    pub async fn create(
        &self,
        session_id: &str,
        fields: &NewSession<'_>,
        ttl_secs: i64,
        now: i64,
    ) -> Result<SessionRecord, sqlx::Error> {
        self.delete_expired(now).await?;

        let expires_at = now + ttl_secs;
        sqlx::query(
            "INSERT INTO sessions (session_id, user_id, role, refresh_jti, expires_at, created_at, last_seen_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(fields.user_id)
        .bind(fields.role.as_str())
        .bind(fields.refresh_jti)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(SessionRecord {
            session_id: session_id.to_string(),
            user_id: fields.user_id,
            role: fields.role,
            refresh_jti: fields.refresh_jti.to_string(),
            prev_jti: None,
            rotated_at: None,
            expires_at,
            created_at: now,
            last_seen_at: now,
        })
    }

    /// Read a live session record. Expired records read as `None`.
    pub async fn read(
        &self,
        session_id: &str,
        now: i64,
    ) -> Result<Option<SessionRecord>, sqlx::Error> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE session_id = ? AND expires_at > ?"))
                .bind(session_id)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(SessionRecord::from))
    }

    /// Delete a session record. Returns whether a row was removed.
    pub async fn delete(&self, session_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List live sessions of one user, newest first.
    pub async fn list_by_user(
        &self,
        user_id: i64,
        now: i64,
    ) -> Result<Vec<SessionRecord>, sqlx::Error> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ? AND expires_at > ? ORDER BY created_at DESC, session_id"
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    /// Replace the accepted refresh token ID of a live session, keeping the old one
    /// as `prev_jti`. Only succeeds while `current_jti` is still the accepted ID, so
    /// of two concurrent rotations exactly one writes.
    pub async fn rotate(
        &self,
        session_id: &str,
        current_jti: &str,
        new_jti: &str,
        now: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions
             SET prev_jti = refresh_jti, refresh_jti = ?, rotated_at = ?, last_seen_at = ?
             WHERE session_id = ? AND refresh_jti = ? AND expires_at > ?",
        )
        .bind(new_jti)
        .bind(now)
        .bind(now)
        .bind(session_id)
        .bind(current_jti)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every session of a user (password reset, logout everywhere).
    pub async fn delete_all_by_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Physically remove expired records.
    pub async fn delete_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
