use chrono::{DateTime, Utc};
use course_core::model::AttemptRecord;
use uuid::Uuid;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_attempt_row, ser};
use crate::repository::{AttemptRepository, StorageError};

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn insert_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError> {
        let question_ids = serde_json::to_string(attempt.question_ids()).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO attempts (
                id, student_id, assessment_id, question_ids, total_points, started_at,
                duration_minutes
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(attempt.id())
        .bind(id_i64("student_id", attempt.student_id().value())?)
        .bind(id_i64("assessment_id", attempt.assessment_id().value())?)
        .bind(question_ids)
        .bind(i64::from(attempt.total_points()))
        .bind(attempt.started_at())
        .bind(i64::from(attempt.duration_minutes()))
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Conflict(format!("attempt {} exists", attempt.id()))
            }
            other => conn(other),
        })?;
        Ok(())
    }

    async fn get_attempt(&self, id: Uuid) -> Result<Option<AttemptRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, student_id, assessment_id, question_ids, total_points, started_at,
                duration_minutes, submitted_at
            FROM attempts WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn mark_attempt_submitted(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let done = sqlx::query(
            "UPDATE attempts SET submitted_at = ?2 WHERE id = ?1 AND submitted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        if done.rows_affected() == 1 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM attempts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        match exists {
            Some(_) => Err(StorageError::Conflict(format!("attempt {id} already submitted"))),
            None => Err(StorageError::NotFound),
        }
    }
}
