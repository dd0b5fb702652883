use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: i64,
    pub subject_id: i64,
    pub subject_name: String,
    pub value: f64,
    pub year: i64,
    pub created_at: i64,
}

const SELECT_GRADE: &str = "SELECT g.id, g.subject_id, s.name AS subject_name, g.value, g.year, g.created_at
     FROM grades g JOIN subjects s ON s.id = g.subject_id";

pub struct GradeStore {
    pool: SqlitePool,
}

impl GradeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All grades of a user, ordered by year then creation.
    pub async fn list(&self, user_id: i64) -> Result<Vec<Grade>, sqlx::Error> {
        sqlx::query_as(&format!(
            "{SELECT_GRADE} WHERE g.user_id = ? ORDER BY g.year ASC, g.created_at ASC, g.id ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Option<Grade>, sqlx::Error> {
        sqlx::query_as(&format!("{SELECT_GRADE} WHERE g.id = ? AND g.user_id = ?"))
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Insert a grade. Returns `None` when the subject is not owned by the user.
    pub async fn create(
        &self,
        user_id: i64,
        subject_id: i64,
        value: f64,
        year: i64,
    ) -> Result<Option<Grade>, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO grades (user_id, subject_id, value, year, created_at)
             SELECT ?, id, ?, ?, unixepoch() FROM subjects WHERE id = ? AND user_id = ?",
        )
        .bind(user_id)
        .bind(value)
        .bind(year)
        .bind(subject_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(user_id, result.last_insert_rowid()).await
    }

    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        value: f64,
        year: i64,
    ) -> Result<Option<Grade>, sqlx::Error> {
        let result = sqlx::query("UPDATE grades SET value = ?, year = ? WHERE id = ? AND user_id = ?")
            .bind(value)
            .bind(year)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(user_id, id).await
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM grades WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all of a user's grades for one subject and year.
    pub async fn delete_by_subject_and_year(
        &self,
        user_id: i64,
        subject_id: i64,
        year: i64,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM grades WHERE user_id = ? AND subject_id = ? AND year = ?")
                .bind(user_id)
                .bind(subject_id)
                .bind(year)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
