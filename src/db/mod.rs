mod appointments;
mod grades;
mod session;
mod subjects;
mod timetable;
mod user;

use std::time::Duration;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use appointments::{Appointment, AppointmentStore};
pub use grades::{Grade, GradeStore};
pub use session::{NewSession, SessionRecord, SessionStore};
pub use subjects::{Subject, SubjectStore};
pub use timetable::{TimetableCell, TimetableRow, TimetableRowInput, TimetableStore};
pub use user::{NewUser, ResetCandidate, User, UserRole, UserStore};

/// Upper bound on waiting for a pooled connection. Store calls that exceed it fail
/// with `PoolTimedOut`, which the API layer reports as a 500.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        if version < 2 {
            self.migrate_v2().await?;
        }

        if version < 3 {
            self.migrate_v3().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    name TEXT,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'USER',
                    password_reset_hash TEXT,
                    password_reset_expires INTEGER,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_users_reset_hash ON users(password_reset_hash)",
                // Session records. expires_at is written by the same INSERT that
                // creates the row, so a record can never exist without an expiry.
                "CREATE TABLE sessions (
                    session_id TEXT PRIMARY KEY NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    role TEXT NOT NULL,
                    refresh_jti TEXT NOT NULL,
                    expires_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    last_seen_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_sessions_user_id ON sessions(user_id)",
                "CREATE INDEX idx_sessions_expires_at ON sessions(expires_at)",
            ],
        )
        .await
    }

    async fn migrate_v2(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            2,
            &[
                "CREATE TABLE subjects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    UNIQUE (user_id, name)
                )",
                "CREATE INDEX idx_subjects_user_id ON subjects(user_id)",
                "CREATE TABLE grades (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
                    value REAL NOT NULL,
                    year INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_grades_user_id ON grades(user_id, year)",
                "CREATE TABLE timetable_rows (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    label TEXT NOT NULL,
                    row_index INTEGER NOT NULL
                )",
                "CREATE INDEX idx_timetable_rows_user_id ON timetable_rows(user_id, row_index)",
                "CREATE TABLE timetable_cells (
                    row_id INTEGER NOT NULL REFERENCES timetable_rows(id) ON DELETE CASCADE,
                    day INTEGER NOT NULL,
                    subject_id INTEGER REFERENCES subjects(id) ON DELETE SET NULL,
                    PRIMARY KEY (row_id, day)
                )",
                "CREATE TABLE appointments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    date INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_appointments_user_date ON appointments(user_id, date)",
            ],
        )
        .await
    }

    /// Refresh token grace window: remember the superseded jti and when it was replaced.
    async fn migrate_v3(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            3,
            &[
                "ALTER TABLE sessions ADD COLUMN prev_jti TEXT",
                "ALTER TABLE sessions ADD COLUMN rotated_at INTEGER",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the session store.
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.pool.clone())
    }

    pub fn subjects(&self) -> SubjectStore {
        SubjectStore::new(self.pool.clone())
    }

    pub fn grades(&self) -> GradeStore {
        GradeStore::new(self.pool.clone())
    }

    pub fn timetable(&self) -> TimetableStore {
        TimetableStore::new(self.pool.clone())
    }

    pub fn appointments(&self) -> AppointmentStore {
        AppointmentStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Whether a sqlx error is a unique constraint violation.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_deleting_user_cascades_to_sessions() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(&NewUser {
                email: "alice@example.com",
                name: Some("Alice"),
                password_hash: "hash",
                role: UserRole::User,
            })
            .await
            .unwrap();
        db.sessions()
            .create(
                "sid-1",
                &NewSession {
                    user_id: id,
                    role: UserRole::User,
                    refresh_jti: "jti-1",
                },
                60,
                1_000,
            )
            .await
            .unwrap();

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();

        assert!(db.sessions().read("sid-1", 1_000).await.unwrap().is_none());
    }
}
