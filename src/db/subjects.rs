use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, sqlx::FromRow)]
pub struct Subject {
    pub id: i64,
    pub name: String,
}

/// Subjects are always addressed through their owner; every query filters on
/// `user_id` so a foreign subject reads as missing.
pub struct SubjectStore {
    pool: SqlitePool,
}

impl SubjectStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<Subject>, sqlx::Error> {
        sqlx::query_as("SELECT id, name FROM subjects WHERE user_id = ? ORDER BY name COLLATE NOCASE")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Option<Subject>, sqlx::Error> {
        sqlx::query_as("SELECT id, name FROM subjects WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Fails with a unique violation when the user already has a subject with this name.
    pub async fn create(&self, user_id: i64, name: &str) -> Result<Subject, sqlx::Error> {
        let result =
            sqlx::query("INSERT INTO subjects (user_id, name, created_at) VALUES (?, ?, unixepoch())")
                .bind(user_id)
                .bind(name)
                .execute(&self.pool)
                .await?;
        Ok(Subject {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub async fn rename(
        &self,
        user_id: i64,
        id: i64,
        name: &str,
    ) -> Result<Option<Subject>, sqlx::Error> {
        let result = sqlx::query("UPDATE subjects SET name = ? WHERE id = ? AND user_id = ?")
            .bind(name)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(Subject {
            id,
            name: name.to_string(),
        }))
    }

    /// Delete a subject together with its grades. Timetable cells pointing at it
    /// are emptied by the foreign key.
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM subjects WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

