use course_core::model::{
    ChapterId, ProgressPatch, ProgressRecord, StudentId, SubjectId, TestProgress,
};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_progress_row};
use crate::repository::{ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = r"
    student_id, chapter_id, subject_id,
    video_watched, video_progress, document_viewed,
    pretest_completed, pretest_score, pretest_percentage, pretest_passed, pretest_attempts,
    posttest_completed, posttest_score, posttest_percentage, posttest_passed, posttest_attempts,
    is_completed, completed_at, updated_at
";

/// Nullable bind values for one test slice; `None` leaves the stored columns.
type TestColumns = [Option<i64>; 5];

fn test_columns(test: Option<TestProgress>) -> TestColumns {
    match test {
        Some(t) => [
            Some(i64::from(t.completed)),
            Some(i64::from(t.score)),
            Some(i64::from(t.percentage)),
            Some(i64::from(t.passed)),
            Some(i64::from(t.attempts)),
        ],
        None => [None; 5],
    }
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        student: StudentId,
        chapter: ChapterId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE student_id = ?1 AND chapter_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("student_id", student.value())?)
            .bind(id_i64("chapter_id", chapter.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn merge_progress(
        &self,
        student: StudentId,
        chapter: ChapterId,
        subject: SubjectId,
        patch: &ProgressPatch,
    ) -> Result<ProgressRecord, StorageError> {
        let pre = test_columns(patch.pretest);
        let post = test_columns(patch.posttest);

        // Single statement so concurrent writers only contend on the columns
        // their patches carry.
        let sql = format!(
            r"
            INSERT INTO progress ({PROGRESS_COLUMNS})
            VALUES (
                ?1, ?2, ?3,
                COALESCE(?4, 0), MIN(COALESCE(?5, 0), 100), COALESCE(?6, 0),
                COALESCE(?7, 0), COALESCE(?8, 0), COALESCE(?9, 0),
                COALESCE(?10, 0), COALESCE(?11, 0),
                COALESCE(?12, 0), COALESCE(?13, 0), COALESCE(?14, 0),
                COALESCE(?15, 0), COALESCE(?16, 0),
                CASE WHEN ?17 IS NULL THEN 0 ELSE 1 END, ?17, ?18
            )
            ON CONFLICT(student_id, chapter_id) DO UPDATE SET
                video_watched = COALESCE(?4, progress.video_watched),
                video_progress = MAX(progress.video_progress, MIN(COALESCE(?5, 0), 100)),
                document_viewed = COALESCE(?6, progress.document_viewed),
                pretest_completed = COALESCE(?7, progress.pretest_completed),
                pretest_score = COALESCE(?8, progress.pretest_score),
                pretest_percentage = COALESCE(?9, progress.pretest_percentage),
                pretest_passed = COALESCE(?10, progress.pretest_passed),
                pretest_attempts = COALESCE(?11, progress.pretest_attempts),
                posttest_completed = COALESCE(?12, progress.posttest_completed),
                posttest_score = COALESCE(?13, progress.posttest_score),
                posttest_percentage = COALESCE(?14, progress.posttest_percentage),
                posttest_passed = COALESCE(?15, progress.posttest_passed),
                posttest_attempts = COALESCE(?16, progress.posttest_attempts),
                is_completed = CASE
                    WHEN progress.is_completed = 1 OR ?17 IS NOT NULL THEN 1 ELSE 0
                END,
                completed_at = COALESCE(progress.completed_at, ?17),
                updated_at = ?18
            RETURNING {PROGRESS_COLUMNS}
            "
        );

        let mut query = sqlx::query(&sql)
            .bind(id_i64("student_id", student.value())?)
            .bind(id_i64("chapter_id", chapter.value())?)
            .bind(id_i64("subject_id", subject.value())?)
            .bind(patch.video_watched.map(i64::from))
            .bind(patch.video_progress.map(i64::from))
            .bind(patch.document_viewed.map(i64::from));
        for value in pre.into_iter().chain(post) {
            query = query.bind(value);
        }
        let row = query
            .bind(patch.completed_at)
            .bind(patch.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;

        map_progress_row(&row)
    }

    async fn progress_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE student_id = ?1 ORDER BY chapter_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("student_id", student.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_progress_row).collect()
    }

    async fn progress_for_subject(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE subject_id = ?1 \
             ORDER BY student_id ASC, chapter_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("subject_id", subject.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_progress_row).collect()
    }
}
