use sqlx::sqlite::SqlitePool;

/// One row of the weekly grid (a lesson slot), with one cell per weekday.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TimetableRow {
    pub id: i64,
    pub label: String,
    pub cells: Vec<TimetableCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableCell {
    pub subject_id: Option<i64>,
    pub subject_name: Option<String>,
}

/// Row as submitted by the client. Cell position is the weekday index.
#[derive(Debug, Clone)]
pub struct TimetableRowInput {
    pub label: String,
    pub cells: Vec<Option<i64>>,
}

pub struct TimetableStore {
    pool: SqlitePool,
}

impl TimetableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: i64) -> Result<Vec<TimetableRow>, sqlx::Error> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, label FROM timetable_rows WHERE user_id = ? ORDER BY row_index ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let cells: Vec<(i64, Option<i64>, Option<String>)> = sqlx::query_as(
            "SELECT c.row_id, c.subject_id, s.name
             FROM timetable_cells c
             JOIN timetable_rows r ON r.id = c.row_id
             LEFT JOIN subjects s ON s.id = c.subject_id
             WHERE r.user_id = ?
             ORDER BY c.row_id, c.day ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, label)| TimetableRow {
                id,
                label,
                cells: cells
                    .iter()
                    .filter(|(row_id, _, _)| *row_id == id)
                    .map(|(_, subject_id, subject_name)| TimetableCell {
                        subject_id: *subject_id,
                        subject_name: subject_name.clone(),
                    })
                    .collect(),
            })
            .collect())
    }

    /// Replace the user's whole grid in one transaction.
    /// Subject IDs that the user does not own are stored as empty cells.
    pub async fn replace(
        &self,
        user_id: i64,
        rows: &[TimetableRowInput],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM timetable_rows WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for (index, row) in rows.iter().enumerate() {
            let result = sqlx::query(
                "INSERT INTO timetable_rows (user_id, label, row_index) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(&row.label)
            .bind(index as i64)
            .execute(&mut *tx)
            .await?;
            let row_id = result.last_insert_rowid();

            for (day, subject_id) in row.cells.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO timetable_cells (row_id, day, subject_id)
                     VALUES (?, ?, (SELECT id FROM subjects WHERE id = ? AND user_id = ?))",
                )
                .bind(row_id)
                .bind(day as i64)
                .bind(*subject_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
