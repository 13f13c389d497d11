use course_core::model::{BankId, QuestionBank};
use sqlx::Row;
use tracing::debug;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};
use crate::repository::{QuestionBankRepository, StorageError};

#[async_trait::async_trait]
impl QuestionBankRepository for SqliteRepository {
    async fn upsert_bank(&self, bank: &QuestionBank) -> Result<(), StorageError> {
        let document = serde_json::to_string(bank).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO question_banks (id, subject_id, chapter_id, title, total_points, document)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                subject_id = excluded.subject_id,
                chapter_id = excluded.chapter_id,
                title = excluded.title,
                total_points = excluded.total_points,
                document = excluded.document
            ",
        )
        .bind(id_i64("bank_id", bank.id().value())?)
        .bind(id_i64("subject_id", bank.subject_id().value())?)
        .bind(id_i64("chapter_id", bank.chapter_id().value())?)
        .bind(bank.title())
        .bind(i64::from(bank.total_points()))
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_bank(&self, id: BankId) -> Result<Option<QuestionBank>, StorageError> {
        let row = sqlx::query("SELECT document FROM question_banks WHERE id = ?1")
            .bind(id_i64("bank_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let document: String = row.try_get("document").map_err(ser)?;
        serde_json::from_str(&document).map(Some).map_err(ser)
    }

    async fn delete_bank(&self, id: BankId) -> Result<(), StorageError> {
        let bank_id = id_i64("bank_id", id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let exists = sqlx::query("SELECT 1 FROM question_banks WHERE id = ?1")
            .bind(bank_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let referenced = sqlx::query(
            r"
            SELECT 'assessment' AS owner, assessment_id AS owner_id
                FROM assessment_banks WHERE bank_id = ?1
            UNION ALL
            SELECT 'chapter' AS owner, id AS owner_id
                FROM chapters WHERE pretest_bank_id = ?1
            LIMIT 1
            ",
        )
        .bind(bank_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?;
        if let Some(row) = referenced {
            let owner: String = row.try_get("owner").map_err(ser)?;
            let owner_id: i64 = row.try_get("owner_id").map_err(ser)?;
            debug!(bank = %id, owner = %owner, owner_id, "refusing to delete referenced bank");
            return Err(StorageError::Conflict(format!(
                "bank {id} is referenced by {owner} {owner_id}"
            )));
        }

        sqlx::query("DELETE FROM question_banks WHERE id = ?1")
            .bind(bank_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
