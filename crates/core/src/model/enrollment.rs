use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{StudentId, SubjectId};

/// A student's formal enrollment in a subject. Unique per (student, subject).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student_id: StudentId,
    pub subject_id: SubjectId,
    pub enrolled_at: DateTime<Utc>,
}

impl Enrollment {
    #[must_use]
    pub fn new(student_id: StudentId, subject_id: SubjectId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            student_id,
            subject_id,
            enrolled_at,
        }
    }
}
