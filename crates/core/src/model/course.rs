use serde::{Deserialize, Serialize};

use crate::model::ids::{AssessmentId, BankId, ChapterId, SubjectId};

/// Read model of a subject. Authoring lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub title: String,
}

impl Subject {
    #[must_use]
    pub fn new(id: SubjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}

/// Read model of a chapter and the assessments attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: ChapterId,
    pub subject_id: SubjectId,
    pub title: String,
    pub position: u32,
    #[serde(default)]
    pub pretest_bank: Option<BankId>,
    #[serde(default)]
    pub posttest: Option<AssessmentId>,
}

impl Chapter {
    #[must_use]
    pub fn new(
        id: ChapterId,
        subject_id: SubjectId,
        title: impl Into<String>,
        position: u32,
    ) -> Self {
        Self {
            id,
            subject_id,
            title: title.into(),
            position,
            pretest_bank: None,
            posttest: None,
        }
    }

    #[must_use]
    pub fn with_pretest(mut self, bank: BankId) -> Self {
        self.pretest_bank = Some(bank);
        self
    }

    #[must_use]
    pub fn with_posttest(mut self, assessment: AssessmentId) -> Self {
        self.posttest = Some(assessment);
        self
    }

    #[must_use]
    pub fn has_pretest(&self) -> bool {
        self.pretest_bank.is_some()
    }

    #[must_use]
    pub fn has_posttest(&self) -> bool {
        self.posttest.is_some()
    }
}
