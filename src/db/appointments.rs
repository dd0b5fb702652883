use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub title: String,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: i64,
    title: String,
    date: i64,
    created_at: i64,
}

impl From<AppointmentRow> for Appointment {
    fn from(row: AppointmentRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            date: DateTime::from_timestamp(row.date, 0).unwrap_or_default(),
            created_at: DateTime::from_timestamp(row.created_at, 0).unwrap_or_default(),
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, title, date, created_at FROM appointments";

/// Maximum number of appointments returned by `upcoming`.
pub const UPCOMING_LIMIT: i64 = 5;

pub struct AppointmentStore {
    pool: SqlitePool,
}

impl AppointmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The next few appointments at or after `now`, soonest first.
    pub async fn upcoming(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, sqlx::Error> {
        let rows: Vec<AppointmentRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ? AND date >= ? ORDER BY date ASC, id ASC LIMIT ?"
        ))
        .bind(user_id)
        .bind(now.timestamp())
        .bind(UPCOMING_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    pub async fn list_all(&self, user_id: i64) -> Result<Vec<Appointment>, sqlx::Error> {
        let rows: Vec<AppointmentRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ? ORDER BY date ASC, id ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    /// Delete a user's appointments dated before `cutoff`.
    pub async fn purge_older_than(
        &self,
        user_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM appointments WHERE user_id = ? AND date < ?")
            .bind(user_id)
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn create(
        &self,
        user_id: i64,
        title: &str,
        date: DateTime<Utc>,
    ) -> Result<Appointment, sqlx::Error> {
        let row: AppointmentRow = sqlx::query_as(
            "INSERT INTO appointments (user_id, title, date, created_at)
             VALUES (?, ?, ?, unixepoch())
             RETURNING id, title, date, created_at",
        )
        .bind(user_id)
        .bind(title)
        .bind(date.timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
