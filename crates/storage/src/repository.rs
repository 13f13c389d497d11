use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    AssessmentDefinition, AssessmentId, AssessmentKind, AttemptRecord, BankId, Chapter, ChapterId,
    Enrollment, ProgressPatch, ProgressRecord, QuestionBank, StudentId, Subject, SubjectId,
    TestRef, TestResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read side of the course outline. Writes exist for fixtures and seeding.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), StorageError>;

    async fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>, StorageError>;

    async fn upsert_chapter(&self, chapter: &Chapter) -> Result<(), StorageError>;

    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StorageError>;

    /// Chapters of a subject ordered by position.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn chapters_for_subject(&self, subject: SubjectId) -> Result<Vec<Chapter>, StorageError>;
}

#[async_trait]
pub trait QuestionBankRepository: Send + Sync {
    async fn upsert_bank(&self, bank: &QuestionBank) -> Result<(), StorageError>;

    async fn get_bank(&self, id: BankId) -> Result<Option<QuestionBank>, StorageError>;

    /// Remove a bank.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or `StorageError::Conflict`
    /// while an assessment or a chapter pretest still references it.
    async fn delete_bank(&self, id: BankId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    async fn upsert_assessment(
        &self,
        definition: &AssessmentDefinition,
    ) -> Result<(), StorageError>;

    async fn get_assessment(
        &self,
        id: AssessmentId,
    ) -> Result<Option<AssessmentDefinition>, StorageError>;

    /// The final exam of a subject, lowest id first if several exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn final_exam_for_subject(
        &self,
        subject: SubjectId,
    ) -> Result<Option<AssessmentDefinition>, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn get_progress(
        &self,
        student: StudentId,
        chapter: ChapterId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Upsert that writes only the fields the patch carries and returns the
    /// merged record. A missing record starts from the default-zero record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the merge cannot be stored.
    async fn merge_progress(
        &self,
        student: StudentId,
        chapter: ChapterId,
        subject: SubjectId,
        patch: &ProgressPatch,
    ) -> Result<ProgressRecord, StorageError>;

    async fn progress_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<ProgressRecord>, StorageError>;

    /// Every student's records for one subject.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn progress_for_subject(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<ProgressRecord>, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the student is already enrolled.
    async fn enroll(&self, enrollment: &Enrollment) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the student is not enrolled.
    async fn unenroll(&self, student: StudentId, subject: SubjectId) -> Result<(), StorageError>;

    /// Ordered by enrollment time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn enrollments_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<Enrollment>, StorageError>;

    async fn enrollments_for_subject(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<Enrollment>, StorageError>;
}

/// Append-only log of graded attempts.
#[async_trait]
pub trait TestResultRepository: Send + Sync {
    async fn append_result(&self, result: &TestResult) -> Result<i64, StorageError>;

    /// Results of one student for one test, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn results_for(
        &self,
        student: StudentId,
        test: TestRef,
    ) -> Result<Vec<TestResult>, StorageError>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn insert_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError>;

    async fn get_attempt(&self, id: Uuid) -> Result<Option<AttemptRecord>, StorageError>;

    /// Claims an attempt for grading.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown attempt and
    /// `StorageError::Conflict` when it was already submitted.
    async fn mark_attempt_submitted(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    subjects: Arc<Mutex<HashMap<SubjectId, Subject>>>,
    chapters: Arc<Mutex<HashMap<ChapterId, Chapter>>>,
    banks: Arc<Mutex<HashMap<BankId, QuestionBank>>>,
    assessments: Arc<Mutex<HashMap<AssessmentId, AssessmentDefinition>>>,
    progress: Arc<Mutex<HashMap<(StudentId, ChapterId), ProgressRecord>>>,
    enrollments: Arc<Mutex<HashMap<(StudentId, SubjectId), Enrollment>>>,
    results: Arc<Mutex<Vec<TestResult>>>,
    attempts: Arc<Mutex<HashMap<Uuid, AttemptRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    m.lock().map_err(|e| StorageError::Connection(e.to_string()))
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), StorageError> {
        lock(&self.subjects)?.insert(subject.id, subject.clone());
        Ok(())
    }

    async fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>, StorageError> {
        Ok(lock(&self.subjects)?.get(&id).cloned())
    }

    async fn upsert_chapter(&self, chapter: &Chapter) -> Result<(), StorageError> {
        lock(&self.chapters)?.insert(chapter.id, chapter.clone());
        Ok(())
    }

    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StorageError> {
        Ok(lock(&self.chapters)?.get(&id).cloned())
    }

    async fn chapters_for_subject(&self, subject: SubjectId) -> Result<Vec<Chapter>, StorageError> {
        let mut out: Vec<Chapter> = lock(&self.chapters)?
            .values()
            .filter(|c| c.subject_id == subject)
            .cloned()
            .collect();
        out.sort_by_key(|c| (c.position, c.id));
        Ok(out)
    }
}

#[async_trait]
impl QuestionBankRepository for InMemoryRepository {
    async fn upsert_bank(&self, bank: &QuestionBank) -> Result<(), StorageError> {
        lock(&self.banks)?.insert(bank.id(), bank.clone());
        Ok(())
    }

    async fn get_bank(&self, id: BankId) -> Result<Option<QuestionBank>, StorageError> {
        Ok(lock(&self.banks)?.get(&id).cloned())
    }

    async fn delete_bank(&self, id: BankId) -> Result<(), StorageError> {
        let mut banks = lock(&self.banks)?;
        if !banks.contains_key(&id) {
            return Err(StorageError::NotFound);
        }
        if let Some(def) = lock(&self.assessments)?
            .values()
            .find(|d| d.references_bank(id))
        {
            return Err(StorageError::Conflict(format!(
                "bank {id} is used by assessment {}",
                def.id()
            )));
        }
        if let Some(ch) = lock(&self.chapters)?
            .values()
            .find(|c| c.pretest_bank == Some(id))
        {
            return Err(StorageError::Conflict(format!(
                "bank {id} is the pretest of chapter {}",
                ch.id
            )));
        }
        banks.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl AssessmentRepository for InMemoryRepository {
    async fn upsert_assessment(
        &self,
        definition: &AssessmentDefinition,
    ) -> Result<(), StorageError> {
        lock(&self.assessments)?.insert(definition.id(), definition.clone());
        Ok(())
    }

    async fn get_assessment(
        &self,
        id: AssessmentId,
    ) -> Result<Option<AssessmentDefinition>, StorageError> {
        Ok(lock(&self.assessments)?.get(&id).cloned())
    }

    async fn final_exam_for_subject(
        &self,
        subject: SubjectId,
    ) -> Result<Option<AssessmentDefinition>, StorageError> {
        Ok(lock(&self.assessments)?
            .values()
            .filter(|d| d.kind() == AssessmentKind::FinalExam && d.subject_id() == subject)
            .min_by_key(|d| d.id())
            .cloned())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        student: StudentId,
        chapter: ChapterId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        Ok(lock(&self.progress)?.get(&(student, chapter)).cloned())
    }

    async fn merge_progress(
        &self,
        student: StudentId,
        chapter: ChapterId,
        subject: SubjectId,
        patch: &ProgressPatch,
    ) -> Result<ProgressRecord, StorageError> {
        let mut guard = lock(&self.progress)?;
        let record = guard
            .entry((student, chapter))
            .or_insert_with(|| ProgressRecord::new(student, chapter, subject));
        record.merge(patch);
        Ok(record.clone())
    }

    async fn progress_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let mut out: Vec<ProgressRecord> = lock(&self.progress)?
            .values()
            .filter(|p| p.student_id() == student)
            .cloned()
            .collect();
        out.sort_by_key(ProgressRecord::chapter_id);
        Ok(out)
    }

    async fn progress_for_subject(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let mut out: Vec<ProgressRecord> = lock(&self.progress)?
            .values()
            .filter(|p| p.subject_id() == subject)
            .cloned()
            .collect();
        out.sort_by_key(|p| (p.student_id(), p.chapter_id()));
        Ok(out)
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn enroll(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let mut guard = lock(&self.enrollments)?;
        let key = (enrollment.student_id, enrollment.subject_id);
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "student {} already enrolled in subject {}",
                enrollment.student_id, enrollment.subject_id
            )));
        }
        guard.insert(key, enrollment.clone());
        Ok(())
    }

    async fn unenroll(&self, student: StudentId, subject: SubjectId) -> Result<(), StorageError> {
        lock(&self.enrollments)?
            .remove(&(student, subject))
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    async fn enrollments_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let mut out: Vec<Enrollment> = lock(&self.enrollments)?
            .values()
            .filter(|e| e.student_id == student)
            .cloned()
            .collect();
        out.sort_by_key(|e| (e.enrolled_at, e.subject_id));
        Ok(out)
    }

    async fn enrollments_for_subject(
        &self,
        subject: SubjectId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let mut out: Vec<Enrollment> = lock(&self.enrollments)?
            .values()
            .filter(|e| e.subject_id == subject)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.student_id);
        Ok(out)
    }
}

#[async_trait]
impl TestResultRepository for InMemoryRepository {
    async fn append_result(&self, result: &TestResult) -> Result<i64, StorageError> {
        let mut guard = lock(&self.results)?;
        guard.push(result.clone());
        i64::try_from(guard.len()).map_err(|_| StorageError::Serialization("id overflow".into()))
    }

    async fn results_for(
        &self,
        student: StudentId,
        test: TestRef,
    ) -> Result<Vec<TestResult>, StorageError> {
        let mut out: Vec<TestResult> = lock(&self.results)?
            .iter()
            .filter(|r| r.student_id() == student && r.test_ref() == test)
            .cloned()
            .collect();
        out.sort_by_key(TestResult::submitted_at);
        Ok(out)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn insert_attempt(&self, attempt: &AttemptRecord) -> Result<(), StorageError> {
        let mut guard = lock(&self.attempts)?;
        if guard.contains_key(&attempt.id()) {
            return Err(StorageError::Conflict(format!("attempt {} exists", attempt.id())));
        }
        guard.insert(attempt.id(), attempt.clone());
        Ok(())
    }

    async fn get_attempt(&self, id: Uuid) -> Result<Option<AttemptRecord>, StorageError> {
        Ok(lock(&self.attempts)?.get(&id).cloned())
    }

    async fn mark_attempt_submitted(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = lock(&self.attempts)?;
        let attempt = guard.get_mut(&id).ok_or(StorageError::NotFound)?;
        if attempt.mark_submitted(at) {
            Ok(())
        } else {
            Err(StorageError::Conflict(format!("attempt {id} already submitted")))
        }
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub banks: Arc<dyn QuestionBankRepository>,
    pub assessments: Arc<dyn AssessmentRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub results: Arc<dyn TestResultRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            courses: Arc::new(repo.clone()),
            banks: Arc::new(repo.clone()),
            assessments: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            results: Arc::new(repo.clone()),
            attempts: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{
        CompositionPolicy, PresentationPolicy, QuestionDraft, QuestionId, QuestionType,
    };
    use course_core::time::fixed_now;

    fn bank(id: u64) -> QuestionBank {
        let q = QuestionDraft::new(QuestionId::new(1), QuestionType::TrueFalse, "Sky is blue")
            .with_answer("true")
            .validate()
            .unwrap();
        QuestionBank::with_questions(
            BankId::new(id),
            SubjectId::new(1),
            ChapterId::new(1),
            "Bank",
            vec![q],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn merge_starts_from_default_record() {
        let repo = InMemoryRepository::new();
        let fresh = ProgressRecord::new(StudentId::new(1), ChapterId::new(2), SubjectId::new(3));
        let patch = fresh.video_heartbeat(40, true, fixed_now());

        let merged = repo
            .merge_progress(StudentId::new(1), ChapterId::new(2), SubjectId::new(3), &patch)
            .await
            .unwrap();
        assert_eq!(merged.video_progress(), 40);
        assert!(!merged.video_watched());

        let stored = repo
            .get_progress(StudentId::new(1), ChapterId::new(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, merged);
    }

    #[tokio::test]
    async fn referenced_bank_cannot_be_deleted() {
        let repo = InMemoryRepository::new();
        repo.upsert_bank(&bank(1)).await.unwrap();
        repo.upsert_bank(&bank(2)).await.unwrap();
        let def = AssessmentDefinition::posttest(
            AssessmentId::new(1),
            SubjectId::new(1),
            ChapterId::new(1),
            BankId::new(1),
            CompositionPolicy::RandomCount { count: 1 },
            PresentationPolicy::default(),
        )
        .unwrap();
        repo.upsert_assessment(&def).await.unwrap();

        let err = repo.delete_bank(BankId::new(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        repo.delete_bank(BankId::new(2)).await.unwrap();
        assert!(matches!(
            repo.delete_bank(BankId::new(2)).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_enrollment_conflicts() {
        let repo = InMemoryRepository::new();
        let e = Enrollment::new(StudentId::new(1), SubjectId::new(1), fixed_now());
        repo.enroll(&e).await.unwrap();
        assert!(matches!(repo.enroll(&e).await, Err(StorageError::Conflict(_))));

        repo.unenroll(StudentId::new(1), SubjectId::new(1)).await.unwrap();
        assert!(matches!(
            repo.unenroll(StudentId::new(1), SubjectId::new(1)).await,
            Err(StorageError::NotFound)
        ));
    }
}
