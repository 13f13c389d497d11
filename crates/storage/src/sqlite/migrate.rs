use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::SqliteInitError;

// Course outline, banks, assessments, progress, enrollments, results and
// attempts.
const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS subjects (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS chapters (
            id INTEGER PRIMARY KEY,
            subject_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            pretest_bank_id INTEGER,
            posttest_id INTEGER,
            FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS question_banks (
            id INTEGER PRIMARY KEY,
            subject_id INTEGER NOT NULL,
            chapter_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            total_points INTEGER NOT NULL CHECK (total_points >= 0),
            document TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS assessments (
            id INTEGER PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('posttest', 'final-exam')),
            subject_id INTEGER NOT NULL,
            chapter_id INTEGER,
            document TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS assessment_banks (
            assessment_id INTEGER NOT NULL,
            bank_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (assessment_id, bank_id),
            FOREIGN KEY (assessment_id) REFERENCES assessments(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS progress (
            student_id INTEGER NOT NULL,
            chapter_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            video_watched INTEGER NOT NULL DEFAULT 0,
            video_progress INTEGER NOT NULL DEFAULT 0 CHECK (video_progress BETWEEN 0 AND 100),
            document_viewed INTEGER NOT NULL DEFAULT 0,
            pretest_completed INTEGER NOT NULL DEFAULT 0,
            pretest_score INTEGER NOT NULL DEFAULT 0,
            pretest_percentage INTEGER NOT NULL DEFAULT 0,
            pretest_passed INTEGER NOT NULL DEFAULT 0,
            pretest_attempts INTEGER NOT NULL DEFAULT 0,
            posttest_completed INTEGER NOT NULL DEFAULT 0,
            posttest_score INTEGER NOT NULL DEFAULT 0,
            posttest_percentage INTEGER NOT NULL DEFAULT 0,
            posttest_passed INTEGER NOT NULL DEFAULT 0,
            posttest_attempts INTEGER NOT NULL DEFAULT 0,
            is_completed INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            updated_at TEXT,
            PRIMARY KEY (student_id, chapter_id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS enrollments (
            student_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            enrolled_at TEXT NOT NULL,
            PRIMARY KEY (student_id, subject_id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS test_results (
            id INTEGER PRIMARY KEY,
            student_id INTEGER NOT NULL,
            test_type TEXT NOT NULL,
            ref_kind TEXT NOT NULL CHECK (ref_kind IN ('bank', 'assessment')),
            ref_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            chapter_id INTEGER,
            score INTEGER NOT NULL CHECK (score >= 0),
            total_points INTEGER NOT NULL CHECK (total_points >= 0),
            percentage INTEGER NOT NULL CHECK (percentage BETWEEN 0 AND 100),
            passed INTEGER NOT NULL,
            answers TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            duration_secs INTEGER NOT NULL CHECK (duration_secs >= 0)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS attempts (
            id BLOB PRIMARY KEY,
            student_id INTEGER NOT NULL,
            assessment_id INTEGER NOT NULL,
            question_ids TEXT NOT NULL,
            total_points INTEGER NOT NULL CHECK (total_points >= 0),
            started_at TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL CHECK (duration_minutes >= 0)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_chapters_subject_position
            ON chapters (subject_id, position);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_assessment_banks_bank
            ON assessment_banks (bank_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_progress_subject
            ON progress (subject_id, student_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_test_results_student_ref
            ON test_results (student_id, ref_kind, ref_id, submitted_at);
    ",
];

// Attempts remember when they were graded so each is graded once.
const SCHEMA_V2: &[&str] = &[r"
        ALTER TABLE attempts ADD COLUMN submitted_at TEXT;
    "];

// Applied in order, each in its own transaction.
const MIGRATIONS: &[(i64, &[&str])] = &[(1, SCHEMA_V1), (2, SCHEMA_V2)];

/// Runs the versioned migrations recorded in `schema_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    for (version, statements) in MIGRATIONS {
        if is_applied(pool, *version).await? {
            continue;
        }
        let mut tx = pool.begin().await?;

        for statement in *statements {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(*version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(version = *version, "applied schema migration");
    }

    Ok(())
}
