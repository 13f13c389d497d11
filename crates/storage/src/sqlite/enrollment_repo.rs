use course_core::model::{Enrollment, StudentId, SubjectId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};
use crate::repository::{EnrollmentRepository, StorageError};

fn enrollment_from_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    let student: i64 = row.try_get("student_id").map_err(ser)?;
    let subject: i64 = row.try_get("subject_id").map_err(ser)?;
    Ok(Enrollment::new(
        StudentId::new(u64::try_from(student).map_err(ser)?),
        SubjectId::new(u64::try_from(subject).map_err(ser)?),
        row.try_get("enrolled_at").map_err(ser)?,
    ))
}

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn enroll(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO enrollments (student_id, subject_id, enrolled_at)
            VALUES (?1, ?2, ?3)
            ",
        )
        .bind(id_i64("student_id", enrollment.student_id.value())?)
        .bind(id_i64("subject_id", enrollment.subject_id.value())?)
        .bind(enrollment.enrolled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict(
                format!(
                    "student {} already enrolled in subject {}",
                    enrollment.student_id, enrollment.subject_id
                ),
            ),
            other => conn(other),
        })?;
        Ok(())
    }

    async fn unenroll(&self, student: StudentId, subject: SubjectId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM enrollments WHERE student_id = ?1 AND subject_id = ?2")
            .bind(id_i64("student_id", student.value())?)
            .bind(id_i64("subject_id", subject.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn enrollments_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT student_id, subject_id, enrolled_at FROM enrollments
            WHERE student_id = ?1
            ORDER BY enrolled_at ASC, subject_id ASC
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(enrollment_from_row).collect()
    }

    async fn enrollments_for_subject(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT student_id, subject_id, enrolled_at FROM enrollments
            WHERE subject_id = ?1
            ORDER BY student_id ASC
            ",
        )
        .bind(id_i64("subject_id", subject.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(enrollment_from_row).collect()
    }
}
