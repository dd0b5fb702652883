//! Startup sweep for expired data.
//!
//! There is no periodic scheduler: expired session records are unreadable by
//! construction and are also evicted whenever a session is created.

use crate::db::Database;
use crate::jwt::unix_now;
use tracing::{error, info};

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    let now = unix_now();

    match db.sessions().delete_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired sessions: {}", e),
    }

    match db.users().clear_expired_reset_tokens(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired password reset tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up password reset tokens: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewSession, NewUser, UserRole};

    #[tokio::test]
    async fn test_cleanup_removes_expired_sessions() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(&NewUser {
                email: "alice@example.com",
                name: None,
                password_hash: "hash",
                role: UserRole::User,
            })
            .await
            .unwrap();
        let fields = NewSession {
            user_id: id,
            role: UserRole::User,
            refresh_jti: "jti",
        };
        db.sessions()
            .create("live", &fields, 3600, unix_now())
            .await
            .unwrap();
        // Created with a clock in the past, so nothing evicts it on insert
        db.sessions().create("stale", &fields, 10, 1_000).await.unwrap();

        run_cleanup(&db).await;

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}
