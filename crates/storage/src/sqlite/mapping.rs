use chrono::{DateTime, Utc};
use course_core::model::{
    AssessmentId, AttemptRecord, BankId, Chapter, ChapterId, ProgressRecord, ProgressSnapshot,
    QuestionId, StudentId, SubjectId, TestProgress, TestRef, TestResult, TestType,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_col(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    let v: i64 = row.try_get(field).map_err(ser)?;
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn u8_col(row: &SqliteRow, field: &'static str) -> Result<u8, StorageError> {
    let v: i64 = row.try_get(field).map_err(ser)?;
    u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn bool_col(row: &SqliteRow, field: &'static str) -> Result<bool, StorageError> {
    Ok(row.try_get::<i64, _>(field).map_err(ser)? != 0)
}

fn u64_col(row: &SqliteRow, field: &'static str) -> Result<u64, StorageError> {
    i64_to_u64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn opt_u64_col(row: &SqliteRow, field: &'static str) -> Result<Option<u64>, StorageError> {
    row.try_get::<Option<i64>, _>(field)
        .map_err(ser)?
        .map(|v| i64_to_u64(field, v))
        .transpose()
}

/// Test-reference encoding as (`ref_kind`, `ref_id`).
pub(crate) fn test_ref_parts(test: TestRef) -> Result<(&'static str, i64), StorageError> {
    match test {
        TestRef::Bank(id) => Ok(("bank", id_i64("ref_id", id.value())?)),
        TestRef::Assessment(id) => Ok(("assessment", id_i64("ref_id", id.value())?)),
    }
}

fn test_ref_from_parts(kind: &str, id: u64) -> Result<TestRef, StorageError> {
    match kind {
        "bank" => Ok(TestRef::Bank(BankId::new(id))),
        "assessment" => Ok(TestRef::Assessment(AssessmentId::new(id))),
        other => Err(StorageError::Serialization(format!("invalid ref_kind: {other}"))),
    }
}

pub(crate) fn map_chapter_row(row: &SqliteRow) -> Result<Chapter, StorageError> {
    Ok(Chapter {
        id: ChapterId::new(u64_col(row, "id")?),
        subject_id: SubjectId::new(u64_col(row, "subject_id")?),
        title: row.try_get("title").map_err(ser)?,
        position: u32_col(row, "position")?,
        pretest_bank: opt_u64_col(row, "pretest_bank_id")?.map(BankId::new),
        posttest: opt_u64_col(row, "posttest_id")?.map(AssessmentId::new),
    })
}

const PRETEST_COLUMNS: [&str; 5] = [
    "pretest_completed",
    "pretest_score",
    "pretest_percentage",
    "pretest_passed",
    "pretest_attempts",
];

const POSTTEST_COLUMNS: [&str; 5] = [
    "posttest_completed",
    "posttest_score",
    "posttest_percentage",
    "posttest_passed",
    "posttest_attempts",
];

fn test_progress(row: &SqliteRow, cols: [&'static str; 5]) -> Result<TestProgress, StorageError> {
    Ok(TestProgress {
        completed: bool_col(row, cols[0])?,
        score: u32_col(row, cols[1])?,
        percentage: u8_col(row, cols[2])?,
        passed: bool_col(row, cols[3])?,
        attempts: u32_col(row, cols[4])?,
    })
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    let snapshot = ProgressSnapshot {
        student_id: StudentId::new(u64_col(row, "student_id")?),
        chapter_id: ChapterId::new(u64_col(row, "chapter_id")?),
        subject_id: SubjectId::new(u64_col(row, "subject_id")?),
        video_watched: bool_col(row, "video_watched")?,
        video_progress: u8_col(row, "video_progress")?,
        document_viewed: bool_col(row, "document_viewed")?,
        pretest: test_progress(row, PRETEST_COLUMNS)?,
        posttest: test_progress(row, POSTTEST_COLUMNS)?,
        is_completed: bool_col(row, "is_completed")?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    };
    ProgressRecord::from_snapshot(snapshot).map_err(ser)
}

pub(crate) fn map_result_row(row: &SqliteRow) -> Result<TestResult, StorageError> {
    let test_type_raw: String = row.try_get("test_type").map_err(ser)?;
    let ref_kind: String = row.try_get("ref_kind").map_err(ser)?;
    let answers_json: String = row.try_get("answers").map_err(ser)?;
    let submitted_at: DateTime<Utc> = row.try_get("submitted_at").map_err(ser)?;

    Ok(TestResult::from_persisted(
        StudentId::new(u64_col(row, "student_id")?),
        TestType::parse(&test_type_raw).map_err(ser)?,
        test_ref_from_parts(&ref_kind, u64_col(row, "ref_id")?)?,
        SubjectId::new(u64_col(row, "subject_id")?),
        opt_u64_col(row, "chapter_id")?.map(ChapterId::new),
        u32_col(row, "score")?,
        u32_col(row, "total_points")?,
        u8_col(row, "percentage")?,
        bool_col(row, "passed")?,
        serde_json::from_str(&answers_json).map_err(ser)?,
        submitted_at,
        u32_col(row, "duration_secs")?,
    ))
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<AttemptRecord, StorageError> {
    let id: Uuid = row.try_get("id").map_err(ser)?;
    let ids_json: String = row.try_get("question_ids").map_err(ser)?;
    let question_ids: Vec<QuestionId> = serde_json::from_str(&ids_json).map_err(ser)?;
    Ok(AttemptRecord::from_persisted(
        id,
        StudentId::new(u64_col(row, "student_id")?),
        AssessmentId::new(u64_col(row, "assessment_id")?),
        question_ids,
        u32_col(row, "total_points")?,
        row.try_get("started_at").map_err(ser)?,
        u32_col(row, "duration_minutes")?,
        row.try_get("submitted_at").map_err(ser)?,
    ))
}
