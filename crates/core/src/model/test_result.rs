use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AssessmentId, BankId, ChapterId, QuestionId, StudentId, SubjectId};
use crate::model::progress::TestOutcome;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("score {score} exceeds total points {total}")]
    ScoreExceedsTotal { score: u32, total: u32 },

    #[error("passing score must be a percentage in 0..=100, got {0}")]
    InvalidPassingScore(u8),

    #[error("unknown test type: {0}")]
    UnknownTestType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Pretest,
    Posttest,
    Final,
}

impl TestType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TestType::Pretest => "pretest",
            TestType::Posttest => "posttest",
            TestType::Final => "final",
        }
    }

    /// # Errors
    ///
    /// Returns `ResultError::UnknownTestType` for anything but the three names.
    pub fn parse(s: &str) -> Result<Self, ResultError> {
        match s {
            "pretest" => Ok(Self::Pretest),
            "posttest" => Ok(Self::Posttest),
            "final" => Ok(Self::Final),
            other => Err(ResultError::UnknownTestType(other.to_owned())),
        }
    }
}

/// What a result was taken against: a pretest bank directly, or a composed
/// assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum TestRef {
    Bank(BankId),
    Assessment(AssessmentId),
}

/// A student's answer, or an answer key. Matching answers list the chosen
/// right-hand values in left-hand order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Matches(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_index: usize,
    pub question_id: QuestionId,
    pub question_text: String,
    pub user_answer: Option<Answer>,
    pub correct_answer: Option<Answer>,
    pub is_correct: bool,
    /// Points earned for this question.
    pub points: u32,
}

/// Inputs for a new result. Percentage and pass state are derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTestResult {
    pub student_id: StudentId,
    pub test_type: TestType,
    pub test_ref: TestRef,
    pub subject_id: SubjectId,
    pub chapter_id: Option<ChapterId>,
    pub score: u32,
    pub total_points: u32,
    pub passing_score: u8,
    pub answers: Vec<AnswerRecord>,
    pub submitted_at: DateTime<Utc>,
    pub duration_secs: u32,
}

/// Immutable record of one submitted attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    student_id: StudentId,
    test_type: TestType,
    test_ref: TestRef,
    subject_id: SubjectId,
    chapter_id: Option<ChapterId>,
    score: u32,
    total_points: u32,
    percentage: u8,
    passed: bool,
    answers: Vec<AnswerRecord>,
    submitted_at: DateTime<Utc>,
    duration_secs: u32,
}

/// Rounded percentage of `score` over `total`; 0 when `total` is 0.
#[must_use]
pub fn percentage(score: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let score = u64::from(score.min(total));
    let total = u64::from(total);
    let pct = (score * 200 + total) / (total * 2);
    u8::try_from(pct).unwrap_or(100)
}

impl TestResult {
    /// Grades the totals of a new attempt.
    ///
    /// # Errors
    ///
    /// Returns `ResultError` if the score exceeds the total or the passing
    /// score is not a percentage.
    pub fn new(input: NewTestResult) -> Result<Self, ResultError> {
        if input.score > input.total_points {
            return Err(ResultError::ScoreExceedsTotal {
                score: input.score,
                total: input.total_points,
            });
        }
        if input.passing_score > 100 {
            return Err(ResultError::InvalidPassingScore(input.passing_score));
        }
        let percentage = percentage(input.score, input.total_points);
        Ok(Self {
            student_id: input.student_id,
            test_type: input.test_type,
            test_ref: input.test_ref,
            subject_id: input.subject_id,
            chapter_id: input.chapter_id,
            score: input.score,
            total_points: input.total_points,
            percentage,
            passed: percentage >= input.passing_score,
            answers: input.answers,
            submitted_at: input.submitted_at,
            duration_secs: input.duration_secs,
        })
    }

    /// Rehydrate a stored result without regrading.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        student_id: StudentId,
        test_type: TestType,
        test_ref: TestRef,
        subject_id: SubjectId,
        chapter_id: Option<ChapterId>,
        score: u32,
        total_points: u32,
        percentage: u8,
        passed: bool,
        answers: Vec<AnswerRecord>,
        submitted_at: DateTime<Utc>,
        duration_secs: u32,
    ) -> Self {
        Self {
            student_id,
            test_type,
            test_ref,
            subject_id,
            chapter_id,
            score,
            total_points,
            percentage,
            passed,
            answers,
            submitted_at,
            duration_secs,
        }
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn test_type(&self) -> TestType {
        self.test_type
    }

    #[must_use]
    pub fn test_ref(&self) -> TestRef {
        self.test_ref
    }

    #[must_use]
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    #[must_use]
    pub fn chapter_id(&self) -> Option<ChapterId> {
        self.chapter_id
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    #[must_use]
    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    #[must_use]
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// The slice of this result a progress record keeps.
    #[must_use]
    pub fn outcome(&self) -> TestOutcome {
        TestOutcome {
            score: self.score,
            percentage: self.percentage,
            passed: self.passed,
        }
    }
}

/// Most recent result by submission time.
#[must_use]
pub fn latest(results: &[TestResult]) -> Option<&TestResult> {
    results.iter().max_by_key(|r| r.submitted_at)
}
