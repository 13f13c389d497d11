use course_core::model::{AssessmentDefinition, AssessmentId, AssessmentKind, SubjectId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};
use crate::repository::{AssessmentRepository, StorageError};

fn definition_from_row(row: &SqliteRow) -> Result<AssessmentDefinition, StorageError> {
    let document: String = row.try_get("document").map_err(ser)?;
    serde_json::from_str(&document).map_err(ser)
}

#[async_trait::async_trait]
impl AssessmentRepository for SqliteRepository {
    async fn upsert_assessment(
        &self,
        definition: &AssessmentDefinition,
    ) -> Result<(), StorageError> {
        let id = id_i64("assessment_id", definition.id().value())?;
        let chapter = definition
            .chapter_id()
            .map(|c| id_i64("chapter_id", c.value()))
            .transpose()?;
        let document = serde_json::to_string(definition).map_err(ser)?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO assessments (id, kind, subject_id, chapter_id, document)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                subject_id = excluded.subject_id,
                chapter_id = excluded.chapter_id,
                document = excluded.document
            ",
        )
        .bind(id)
        .bind(definition.kind().as_str())
        .bind(id_i64("subject_id", definition.subject_id().value())?)
        .bind(chapter)
        .bind(document)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // Bank references are kept relational so bank deletion can check them.
        sqlx::query("DELETE FROM assessment_banks WHERE assessment_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        for (position, bank) in definition.source_banks().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO assessment_banks (assessment_id, bank_id, position)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(assessment_id, bank_id) DO NOTHING
                ",
            )
            .bind(id)
            .bind(id_i64("bank_id", bank.value())?)
            .bind(i64::try_from(position).map_err(ser)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_assessment(
        &self,
        id: AssessmentId,
    ) -> Result<Option<AssessmentDefinition>, StorageError> {
        let row = sqlx::query("SELECT document FROM assessments WHERE id = ?1")
            .bind(id_i64("assessment_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(definition_from_row).transpose()
    }

    async fn final_exam_for_subject(
        &self,
        subject: SubjectId,
    ) -> Result<Option<AssessmentDefinition>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT document FROM assessments
            WHERE subject_id = ?1 AND kind = ?2
            ORDER BY id ASC
            LIMIT 1
            ",
        )
        .bind(id_i64("subject_id", subject.value())?)
        .bind(AssessmentKind::FinalExam.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(definition_from_row).transpose()
    }
}
