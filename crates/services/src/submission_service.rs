use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use course_core::composer::ComposeError;
use course_core::display::{DisplayQuestion, should_reveal};
use course_core::grading::{AnswerComparator, GradedAttempt, grade};
use course_core::model::{
    Answer, AssessmentDefinition, AssessmentId, AssessmentKind, AttemptRecord, ChapterId,
    NewTestResult, PresentationPolicy, Question, QuestionBank, QuestionId, StudentId, TestRef,
    TestResult, TestType,
};
use storage::repository::{
    AssessmentRepository, AttemptRepository, CourseRepository, QuestionBankRepository,
    StorageError, TestResultRepository,
};

use crate::Clock;
use crate::config::EngineConfig;
use crate::error::SubmissionError;
use crate::final_exam_service::GateInputs;
use crate::progress_service::{ProgressService, ProgressUpdate};

/// Answers for one test. Posttests and final exams must name the attempt that
/// served the questions; pretests are graded against their whole bank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default)]
    pub attempt_id: Option<Uuid>,
    pub answers: HashMap<QuestionId, Answer>,
    /// Client-reported time spent; attempts measure it themselves.
    #[serde(default)]
    pub duration_secs: Option<u32>,
}

impl Submission {
    #[must_use]
    pub fn for_attempt(attempt_id: Uuid, answers: HashMap<QuestionId, Answer>) -> Self {
        Self {
            attempt_id: Some(attempt_id),
            answers,
            duration_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedQuestion {
    #[serde(flatten)]
    pub question: DisplayQuestion,
    pub is_correct: bool,
    pub earned_points: u32,
}

/// What the student sees after submitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub result_id: i64,
    pub test_type: TestType,
    pub score: u32,
    pub total_points: u32,
    pub percentage: u8,
    pub passed: bool,
    pub questions: Vec<GradedQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressUpdate>,
    #[serde(skip)]
    pub result: TestResult,
}

/// Grades submissions, stores results and feeds outcomes into progress.
pub struct SubmissionService {
    clock: Clock,
    config: EngineConfig,
    comparator: Arc<dyn AnswerComparator>,
    courses: Arc<dyn CourseRepository>,
    banks: Arc<dyn QuestionBankRepository>,
    assessments: Arc<dyn AssessmentRepository>,
    attempts: Arc<dyn AttemptRepository>,
    results: Arc<dyn TestResultRepository>,
    progress: Arc<ProgressService>,
}

impl SubmissionService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        clock: Clock,
        config: EngineConfig,
        comparator: Arc<dyn AnswerComparator>,
        courses: Arc<dyn CourseRepository>,
        banks: Arc<dyn QuestionBankRepository>,
        assessments: Arc<dyn AssessmentRepository>,
        attempts: Arc<dyn AttemptRepository>,
        results: Arc<dyn TestResultRepository>,
        progress: Arc<ProgressService>,
    ) -> Self {
        Self {
            clock,
            config,
            comparator,
            courses,
            banks,
            assessments,
            attempts,
            results,
            progress,
        }
    }

    /// Grade a chapter pretest against its whole bank and record the outcome.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::ChapterNotFound` or `SubmissionError::NoPretest`
    /// when there is nothing to grade against.
    /// Returns `SubmissionError::Storage` if repository access fails.
    pub async fn submit_pretest(
        &self,
        student: StudentId,
        chapter: ChapterId,
        submission: Submission,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let chapter = self
            .courses
            .get_chapter(chapter)
            .await?
            .ok_or(SubmissionError::ChapterNotFound(chapter))?;
        let bank_id = chapter
            .pretest_bank
            .ok_or(SubmissionError::NoPretest(chapter.id))?;
        let bank = self
            .banks
            .get_bank(bank_id)
            .await?
            .ok_or(ComposeError::BankNotFound(bank_id))?;

        let presentation = PresentationPolicy::default();
        let graded = grade(bank.questions(), &submission.answers, self.comparator.as_ref());
        let result = TestResult::new(NewTestResult {
            student_id: student,
            test_type: TestType::Pretest,
            test_ref: TestRef::Bank(bank_id),
            subject_id: chapter.subject_id,
            chapter_id: Some(chapter.id),
            score: graded.score,
            total_points: graded.total_points,
            passing_score: presentation.passing_score,
            answers: graded.answers.clone(),
            submitted_at: self.clock.now(),
            duration_secs: submission.duration_secs.unwrap_or(0),
        })?;
        let result_id = self.results.append_result(&result).await?;
        let progress = self
            .progress
            .record_pretest(student, chapter.id, result.outcome())
            .await?;

        info!(
            student = %student,
            chapter = %chapter.id,
            score = result.score(),
            total = result.total_points(),
            "pretest submitted"
        );
        Ok(receipt(
            result_id,
            result,
            bank.questions(),
            &graded,
            &presentation,
            Some(progress),
        ))
    }

    /// Grade a posttest or final exam against exactly the questions its attempt
    /// served. Unanswered questions score zero. Each attempt is graded once.
    ///
    /// Posttests can be retaken without limit; attempt limits only gate final
    /// exams.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::AssessmentNotFound`,
    /// `SubmissionError::AttemptNotFound` or `SubmissionError::NotAttemptOwner`
    /// for bad references, `SubmissionError::AttemptRequired` without an attempt
    /// id, `SubmissionError::AlreadySubmitted` for a graded attempt,
    /// `SubmissionError::DeadlineExceeded` when deadlines are enforced and the
    /// attempt ran out, and `SubmissionError::Gate` when a final exam is locked.
    /// Returns `SubmissionError::Storage` if repository access fails.
    pub async fn submit_assessment(
        &self,
        student: StudentId,
        assessment: AssessmentId,
        submission: Submission,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let definition = self
            .assessments
            .get_assessment(assessment)
            .await?
            .ok_or(SubmissionError::AssessmentNotFound(assessment))?;

        if definition.kind() == AssessmentKind::FinalExam {
            self.check_final_exam(student, &definition).await?;
        }

        let attempt_id = submission
            .attempt_id
            .ok_or(SubmissionError::AttemptRequired(assessment))?;
        let attempt = self.load_attempt(student, assessment, attempt_id).await?;

        let banks = self.load_banks(&definition).await?;
        let questions = questions_for_attempt(&banks, &attempt);
        let duration_secs = self.clock.elapsed_secs(attempt.started_at());

        let presentation = definition.presentation();
        let graded = grade(&questions, &submission.answers, self.comparator.as_ref());
        let test_type = match definition.kind() {
            AssessmentKind::Posttest => TestType::Posttest,
            AssessmentKind::FinalExam => TestType::Final,
        };
        let result = TestResult::new(NewTestResult {
            student_id: student,
            test_type,
            test_ref: TestRef::Assessment(assessment),
            subject_id: definition.subject_id(),
            chapter_id: definition.chapter_id(),
            score: graded.score,
            total_points: graded.total_points,
            passing_score: presentation.passing_score,
            answers: graded.answers.clone(),
            submitted_at: self.clock.now(),
            duration_secs,
        })?;
        self.attempts
            .mark_attempt_submitted(attempt_id, result.submitted_at())
            .await
            .map_err(|err| match err {
                StorageError::Conflict(_) => SubmissionError::AlreadySubmitted(attempt_id),
                other => other.into(),
            })?;
        let result_id = self.results.append_result(&result).await?;

        let progress = match (test_type, definition.chapter_id()) {
            (TestType::Posttest, Some(chapter)) => Some(
                self.progress
                    .record_posttest(student, chapter, result.outcome())
                    .await?,
            ),
            _ => None,
        };

        info!(
            student = %student,
            assessment = %assessment,
            kind = definition.kind().as_str(),
            score = result.score(),
            total = result.total_points(),
            passed = result.passed(),
            "assessment submitted"
        );
        Ok(receipt(
            result_id,
            result,
            &questions,
            &graded,
            presentation,
            progress,
        ))
    }

    async fn load_attempt(
        &self,
        student: StudentId,
        assessment: AssessmentId,
        id: Uuid,
    ) -> Result<AttemptRecord, SubmissionError> {
        let attempt = self
            .attempts
            .get_attempt(id)
            .await?
            .filter(|a| a.assessment_id() == assessment)
            .ok_or(SubmissionError::AttemptNotFound(id))?;
        if attempt.student_id() != student {
            return Err(SubmissionError::NotAttemptOwner(id));
        }
        if attempt.is_submitted() {
            return Err(SubmissionError::AlreadySubmitted(id));
        }
        if self.config.enforce_deadline {
            let grace = self.config.deadline_grace();
            if attempt.is_overdue(self.clock.now(), grace) {
                if let Some(deadline) = attempt.deadline(grace) {
                    warn!(student = %student, attempt = %id, %deadline, "late submission refused");
                    return Err(SubmissionError::DeadlineExceeded {
                        attempt: id,
                        deadline,
                    });
                }
            }
        }
        Ok(attempt)
    }

    async fn load_banks(
        &self,
        definition: &AssessmentDefinition,
    ) -> Result<Vec<QuestionBank>, SubmissionError> {
        let mut banks = Vec::with_capacity(definition.source_banks().len());
        for id in definition.source_banks() {
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
    ) -> Result<(), SubmissionError> {
        let gate = GateInputs::load(&self.progress, self.results.as_ref(), student, definition)
            .await?;
        if let Err(err) = gate.enforce(definition.presentation()) {
            warn!(
                student = %student,
                assessment = %definition.id(),
                reason = %err,
                "final exam submission refused"
            );
            return Err(err.into());
        }
        Ok(())
    }
}

/// The attempt's questions in served order. Questions removed from their bank
/// since the attempt started are dropped.
fn questions_for_attempt(banks: &[QuestionBank], attempt: &AttemptRecord) -> Vec<Question> {
    let mut out = Vec::with_capacity(attempt.question_ids().len());
    for id in attempt.question_ids() {
        match banks.iter().find_map(|b| b.question(*id)) {
            Some(q) => out.push(q.clone()),
            None => warn!(
                attempt = %attempt.id(),
                question = %id,
                "served question no longer exists"
            ),
        }
    }
    out
}

fn receipt(
    result_id: i64,
    result: TestResult,
    questions: &[Question],
    graded: &GradedAttempt,
    presentation: &PresentationPolicy,
    progress: Option<ProgressUpdate>,
) -> SubmissionReceipt {
    let reveal = should_reveal(presentation, true);
    let mut rng = rand::rng();
    let questions = questions
        .iter()
        .zip(&graded.answers)
        .map(|(question, record)| GradedQuestion {
            question: DisplayQuestion::project(question, reveal, &mut rng),
            is_correct: record.is_correct,
            earned_points: record.points,
        })
        .collect();
    SubmissionReceipt {
        result_id,
        test_type: result.test_type(),
        score: result.score(),
        total_points: result.total_points(),
        percentage: result.percentage(),
        passed: result.passed(),
        questions,
        progress,
        result,
    }
}
