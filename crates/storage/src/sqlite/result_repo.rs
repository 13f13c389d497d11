use course_core::model::{StudentId, TestRef, TestResult};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_result_row, ser, test_ref_parts};
use crate::repository::{StorageError, TestResultRepository};

#[async_trait::async_trait]
impl TestResultRepository for SqliteRepository {
    async fn append_result(&self, result: &TestResult) -> Result<i64, StorageError> {
        let (ref_kind, ref_id) = test_ref_parts(result.test_ref())?;
        let chapter = result
            .chapter_id()
            .map(|c| id_i64("chapter_id", c.value()))
            .transpose()?;
        let answers = serde_json::to_string(result.answers()).map_err(ser)?;

        let res = sqlx::query(
            r"
            INSERT INTO test_results (
                student_id, test_type, ref_kind, ref_id, subject_id, chapter_id,
                score, total_points, percentage, passed, answers, submitted_at, duration_secs
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
        )
        .bind(id_i64("student_id", result.student_id().value())?)
        .bind(result.test_type().as_str())
        .bind(ref_kind)
        .bind(ref_id)
        .bind(id_i64("subject_id", result.subject_id().value())?)
        .bind(chapter)
        .bind(i64::from(result.score()))
        .bind(i64::from(result.total_points()))
        .bind(i64::from(result.percentage()))
        .bind(i64::from(result.passed()))
        .bind(answers)
        .bind(result.submitted_at())
        .bind(i64::from(result.duration_secs()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.last_insert_rowid())
    }

    async fn results_for(
        &self,
        student: StudentId,
        test: TestRef,
    ) -> Result<Vec<TestResult>, StorageError> {
        let (ref_kind, ref_id) = test_ref_parts(test)?;
        let rows = sqlx::query(
            r"
            SELECT
                student_id, test_type, ref_kind, ref_id, subject_id, chapter_id,
                score, total_points, percentage, passed, answers, submitted_at, duration_secs
            FROM test_results
            WHERE student_id = ?1 AND ref_kind = ?2 AND ref_id = ?3
            ORDER BY submitted_at ASC, id ASC
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .bind(ref_kind)
        .bind(ref_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_result_row).collect()
    }
}
