use course_core::model::{Chapter, ChapterId, Subject, SubjectId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_chapter_row, ser};
use crate::repository::{CourseRepository, StorageError};

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO subjects (id, title)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET title = excluded.title
            ",
        )
        .bind(id_i64("subject_id", subject.id.value())?)
        .bind(&subject.title)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>, StorageError> {
        let row = sqlx::query("SELECT id, title FROM subjects WHERE id = ?1")
            .bind(id_i64("subject_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.map(|row| {
            Ok(Subject::new(
                id,
                row.try_get::<String, _>("title").map_err(ser)?,
            ))
        })
        .transpose()
    }

    async fn upsert_chapter(&self, chapter: &Chapter) -> Result<(), StorageError> {
        let pretest = chapter
            .pretest_bank
            .map(|b| id_i64("pretest_bank_id", b.value()))
            .transpose()?;
        let posttest = chapter
            .posttest
            .map(|a| id_i64("posttest_id", a.value()))
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO chapters (id, subject_id, title, position, pretest_bank_id, posttest_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                subject_id = excluded.subject_id,
                title = excluded.title,
                position = excluded.position,
                pretest_bank_id = excluded.pretest_bank_id,
                posttest_id = excluded.posttest_id
            ",
        )
        .bind(id_i64("chapter_id", chapter.id.value())?)
        .bind(id_i64("subject_id", chapter.subject_id.value())?)
        .bind(&chapter.title)
        .bind(i64::from(chapter.position))
        .bind(pretest)
        .bind(posttest)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, subject_id, title, position, pretest_bank_id, posttest_id
            FROM chapters WHERE id = ?1
            ",
        )
        .bind(id_i64("chapter_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_chapter_row).transpose()
    }

    async fn chapters_for_subject(&self, subject: SubjectId) -> Result<Vec<Chapter>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, subject_id, title, position, pretest_bank_id, posttest_id
            FROM chapters
            WHERE subject_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(id_i64("subject_id", subject.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_chapter_row).collect()
    }
}
