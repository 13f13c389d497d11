use std::sync::Arc;

use serde::Serialize;

use course_core::exam_gate::{self, GateError, GateStatus};
use course_core::model::{
    AssessmentDefinition, AssessmentId, PresentationPolicy, StudentId, SubjectId, TestRef,
    TestResult,
};
use storage::repository::{AssessmentRepository, TestResultRepository};

use crate::compose_service::{ComposeService, ComposedAttempt};
use crate::error::{FinalExamError, ProgressServiceError};
use crate::progress_service::ProgressService;
use crate::submission_service::{Submission, SubmissionReceipt, SubmissionService};

/// What the gate decides on: chapter completion and prior final-exam results.
pub(crate) struct GateInputs {
    can_take_final_exam: bool,
    results: Vec<TestResult>,
}

impl GateInputs {
    pub(crate) async fn load(
        progress: &ProgressService,
        results: &dyn TestResultRepository,
        student: StudentId,
        definition: &AssessmentDefinition,
    ) -> Result<Self, ProgressServiceError> {
        let rollup = progress
            .subject_rollup(
                student,
                definition.subject_id(),
                progress.config().student_video_threshold,
            )
            .await?;
        let results = results
            .results_for(student, TestRef::Assessment(definition.id()))
            .await?;
        Ok(Self {
            can_take_final_exam: rollup.can_take_final_exam,
            results,
        })
    }

    pub(crate) fn enforce(&self, presentation: &PresentationPolicy) -> Result<(), GateError> {
        exam_gate::check_view(self.can_take_final_exam)?;
        exam_gate::check_submit(presentation, &self.results)
    }

    pub(crate) fn status(&self, presentation: &PresentationPolicy) -> GateStatus {
        exam_gate::status(self.can_take_final_exam, presentation, &self.results)
    }
}

/// A subject's final exam as seen by one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalExamStatus {
    pub assessment_id: AssessmentId,
    pub subject_id: SubjectId,
    pub title: String,
    pub duration: u32,
    pub passing_score: u8,
    #[serde(flatten)]
    pub gate: GateStatus,
}

/// Subject-level entry point for the final exam: locate it, report the gate,
/// and delegate composing and grading.
pub struct FinalExamService {
    assessments: Arc<dyn AssessmentRepository>,
    results: Arc<dyn TestResultRepository>,
    progress: Arc<ProgressService>,
    compose: Arc<ComposeService>,
    submissions: Arc<SubmissionService>,
}

impl FinalExamService {
    #[must_use]
    pub fn new(
        assessments: Arc<dyn AssessmentRepository>,
        results: Arc<dyn TestResultRepository>,
        progress: Arc<ProgressService>,
        compose: Arc<ComposeService>,
        submissions: Arc<SubmissionService>,
    ) -> Self {
        Self {
            assessments,
            results,
            progress,
            compose,
            submissions,
        }
    }

    async fn definition(&self, subject: SubjectId) -> Result<AssessmentDefinition, FinalExamError> {
        self.assessments
            .final_exam_for_subject(subject)
            .await?
            .ok_or(FinalExamError::NoFinalExam(subject))
    }

    /// # Errors
    ///
    /// Returns `FinalExamError::NoFinalExam` if the subject has none.
    /// Returns `FinalExamError::Storage` if repository access fails.
    pub async fn status(
        &self,
        student: StudentId,
        subject: SubjectId,
    ) -> Result<FinalExamStatus, FinalExamError> {
        let definition = self.definition(subject).await?;
        let gate = GateInputs::load(&self.progress, self.results.as_ref(), student, &definition)
            .await?;
        let presentation = definition.presentation();
        Ok(FinalExamStatus {
            assessment_id: definition.id(),
            subject_id: subject,
            title: definition.title().to_owned(),
            duration: presentation.duration_minutes,
            passing_score: presentation.passing_score,
            gate: gate.status(presentation),
        })
    }

    /// # Errors
    ///
    /// Returns `FinalExamError::NoFinalExam` if the subject has none, or the
    /// compose error (gate refusals included).
    pub async fn start(
        &self,
        student: StudentId,
        subject: SubjectId,
    ) -> Result<ComposedAttempt, FinalExamError> {
        let definition = self.definition(subject).await?;
        Ok(self.compose.compose(student, definition.id()).await?)
    }

    /// # Errors
    ///
    /// Returns `FinalExamError::NoFinalExam` if the subject has none, or the
    /// submission error (gate refusals included).
    pub async fn submit(
        &self,
        student: StudentId,
        subject: SubjectId,
        submission: Submission,
    ) -> Result<SubmissionReceipt, FinalExamError> {
        let definition = self.definition(subject).await?;
        Ok(self
            .submissions
            .submit_assessment(student, definition.id(), submission)
            .await?)
    }
}
