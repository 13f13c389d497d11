use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use course_core::composer::{ComposeError, compose_for};
use course_core::display::{DisplayQuestion, project_set};
use course_core::model::{
    AssessmentDefinition, AssessmentId, AssessmentKind, AttemptRecord, BankId, ChapterId,
    QuestionBank, StudentId, TypeCounts,
};
use storage::repository::{
    AssessmentRepository, AttemptRepository, CourseRepository, QuestionBankRepository,
    TestResultRepository,
};

use crate::Clock;
use crate::error::ComposeServiceError;
use crate::final_exam_service::GateInputs;
use crate::progress_service::ProgressService;

/// One composed attempt as handed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedAttempt {
    pub attempt_id: Uuid,
    pub assessment_id: AssessmentId,
    pub kind: AssessmentKind,
    pub questions: Vec<DisplayQuestion>,
    pub total_points: u32,
    pub realized_counts: TypeCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_counts: Option<TypeCounts>,
    /// Minutes; 0 means untimed.
    pub duration: u32,
    pub started_at: DateTime<Utc>,
}

impl ComposedAttempt {
    #[must_use]
    pub fn is_underfilled(&self) -> bool {
        self.requested_counts
            .is_some_and(|requested| self.realized_counts.total() < requested.total())
    }
}

/// A chapter pretest, served straight from its bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PretestPaper {
    pub chapter_id: ChapterId,
    pub bank_id: BankId,
    pub title: String,
    pub questions: Vec<DisplayQuestion>,
    pub total_points: u32,
}

/// Composes assessment attempts and records what was served.
pub struct ComposeService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    banks: Arc<dyn QuestionBankRepository>,
    assessments: Arc<dyn AssessmentRepository>,
    attempts: Arc<dyn AttemptRepository>,
    results: Arc<dyn TestResultRepository>,
    progress: Arc<ProgressService>,
}

impl ComposeService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        banks: Arc<dyn QuestionBankRepository>,
        assessments: Arc<dyn AssessmentRepository>,
        attempts: Arc<dyn AttemptRepository>,
        results: Arc<dyn TestResultRepository>,
        progress: Arc<ProgressService>,
    ) -> Self {
        Self {
            clock,
            courses,
            banks,
            assessments,
            attempts,
            results,
            progress,
        }
    }

    /// Compose a fresh attempt of `assessment` for `student`.
    ///
    /// Every call draws a new set; the served question ids are stored as an
    /// attempt so the submission is graded against exactly what was shown.
    /// Final exams are gated on chapter completion and remaining attempts.
    ///
    /// # Errors
    ///
    /// Returns `ComposeServiceError::AssessmentNotFound` or
    /// `ComposeError::BankNotFound` (as `ComposeServiceError::Compose`) for
    /// missing references, `ComposeError::InvalidPolicy` for a malformed
    /// policy and `ComposeServiceError::Gate` when a final exam is locked.
    /// Returns `ComposeServiceError::Storage` if repository access fails.
    pub async fn compose(
        &self,
        student: StudentId,
        assessment: AssessmentId,
    ) -> Result<ComposedAttempt, ComposeServiceError> {
        let definition = self
            .assessments
            .get_assessment(assessment)
            .await?
            .ok_or(ComposeServiceError::AssessmentNotFound(assessment))?;

        if definition.kind() == AssessmentKind::FinalExam {
            self.check_final_exam(student, &definition).await?;
        }

        let banks = self.load_banks(definition.source_banks()).await?;
        let (set, questions) = {
            let mut rng = rand::rng();
            let set = compose_for(&definition, &banks, &mut rng)?;
            let questions = project_set(&set, definition.presentation(), false, &mut rng);
            (set, questions)
        };

        if set.is_underfilled() {
            warn!(
                assessment = %assessment,
                requested = set.requested().map_or(0, |r| r.total()),
                realized = set.len(),
                short_types = ?set.underfilled_types(),
                "question pool could not fill the requested quota"
            );
        }

        let duration = definition.presentation().duration_minutes;
        let attempt = AttemptRecord::new(
            student,
            definition.id(),
            set.question_ids(),
            set.total_points(),
            self.clock.now(),
            duration,
        );
        self.attempts.insert_attempt(&attempt).await?;

        info!(
            student = %student,
            assessment = %assessment,
            attempt = %attempt.id(),
            questions = set.len(),
            total_points = set.total_points(),
            "composed attempt"
        );

        Ok(ComposedAttempt {
            attempt_id: attempt.id(),
            assessment_id: definition.id(),
            kind: definition.kind(),
            questions,
            total_points: set.total_points(),
            realized_counts: set.realized(),
            requested_counts: set.requested(),
            duration,
            started_at: attempt.started_at(),
        })
    }

    /// The chapter's pretest bank in authored order, without answers.
    ///
    /// # Errors
    ///
    /// Returns `ComposeServiceError::ChapterNotFound` or
    /// `ComposeServiceError::NoPretest` when there is nothing to serve.
    /// Returns `ComposeServiceError::Storage` if repository access fails.
    pub async fn pretest(&self, chapter: ChapterId) -> Result<PretestPaper, ComposeServiceError> {
        let chapter = self
            .courses
            .get_chapter(chapter)
            .await?
            .ok_or(ComposeServiceError::ChapterNotFound(chapter))?;
        let bank_id = chapter
            .pretest_bank
            .ok_or(ComposeServiceError::NoPretest(chapter.id))?;
        let bank = self
            .banks
            .get_bank(bank_id)
            .await?
            .ok_or(ComposeError::BankNotFound(bank_id))?;

        let questions = {
            let mut rng = rand::rng();
            bank.questions()
                .iter()
                .map(|q| DisplayQuestion::project(q, false, &mut rng))
                .collect()
        };

        Ok(PretestPaper {
            chapter_id: chapter.id,
            bank_id,
            title: bank.title().to_owned(),
            questions,
            total_points: bank.total_points(),
        })
    }

    async fn load_banks(&self, ids: &[BankId]) -> Result<Vec<QuestionBank>, ComposeServiceError> {
        let mut banks = Vec::with_capacity(ids.len());
        for id in ids {
            let bank = self
                .banks
                .get_bank(*id)
                .await?
                .ok_or(ComposeError::BankNotFound(*id))?;
            banks.push(bank);
        }
        Ok(banks)
    }

    async fn check_final_exam(
        &self,
        student: StudentId,
        definition: &AssessmentDefinition,
    ) -> Result<(), ComposeServiceError> {
        let gate = GateInputs::load(&self.progress, self.results.as_ref(), student, definition)
            .await?;
        if let Err(err) = gate.enforce(definition.presentation()) {
            warn!(
                student = %student,
                assessment = %definition.id(),
                reason = %err,
                "final exam compose refused"
            );
            return Err(err.into());
        }
        Ok(())
    }
}
