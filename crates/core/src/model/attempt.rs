use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ids::{AssessmentId, QuestionId, StudentId};

/// A composed question set handed to a student. Submissions referencing it
/// are graded against exactly these questions, once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    id: Uuid,
    student_id: StudentId,
    assessment_id: AssessmentId,
    question_ids: Vec<QuestionId>,
    total_points: u32,
    started_at: DateTime<Utc>,
    duration_minutes: u32,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    #[must_use]
    pub fn new(
        student_id: StudentId,
        assessment_id: AssessmentId,
        question_ids: Vec<QuestionId>,
        total_points: u32,
        started_at: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            assessment_id,
            question_ids,
            total_points,
            started_at,
            duration_minutes,
            submitted_at: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        id: Uuid,
        student_id: StudentId,
        assessment_id: AssessmentId,
        question_ids: Vec<QuestionId>,
        total_points: u32,
        started_at: DateTime<Utc>,
        duration_minutes: u32,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            student_id,
            assessment_id,
            question_ids,
            total_points,
            started_at,
            duration_minutes,
            submitted_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn assessment_id(&self) -> AssessmentId {
        self.assessment_id
    }

    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }

    /// Marks the attempt graded. Returns `false` if it already was.
    pub fn mark_submitted(&mut self, at: DateTime<Utc>) -> bool {
        if self.submitted_at.is_some() {
            return false;
        }
        self.submitted_at = Some(at);
        true
    }

    /// Latest accepted submission time, `grace` included. `None` when untimed.
    #[must_use]
    pub fn deadline(&self, grace: Duration) -> Option<DateTime<Utc>> {
        (self.duration_minutes > 0)
            .then(|| self.started_at + Duration::minutes(i64::from(self.duration_minutes)) + grace)
    }

    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.deadline(grace).is_some_and(|deadline| now > deadline)
    }
}
