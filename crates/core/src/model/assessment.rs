use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AssessmentId, BankId, ChapterId, QuestionId, SubjectId};
use crate::model::question::QuestionType;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssessmentError {
    #[error("posttest must reference exactly one question bank, got {0}")]
    PosttestBankCount(usize),

    #[error("posttest must belong to a chapter")]
    PosttestWithoutChapter,

    #[error("final exam must reference at least one question bank")]
    FinalExamWithoutBanks,

    #[error("per-bank selection is only available for final exams")]
    PerBankOnPosttest,

    #[error("passing score must be a percentage in 0..=100, got {0}")]
    InvalidPassingScore(u8),

    #[error("max attempts must be > 0")]
    InvalidMaxAttempts,
}

//
// ─── TYPE COUNTS ───────────────────────────────────────────────────────────────
//

/// A count per question type. Used both for requested quotas (after
/// validation) and for the realized counts of a composed set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCounts {
    pub multiple_choice: u32,
    pub true_false: u32,
    pub short_answer: u32,
    pub matching: u32,
}

impl TypeCounts {
    #[must_use]
    pub fn get(&self, kind: QuestionType) -> u32 {
        match kind {
            QuestionType::MultipleChoice => self.multiple_choice,
            QuestionType::TrueFalse => self.true_false,
            QuestionType::ShortAnswer => self.short_answer,
            QuestionType::Matching => self.matching,
        }
    }

    pub fn set(&mut self, kind: QuestionType, value: u32) {
        match kind {
            QuestionType::MultipleChoice => self.multiple_choice = value,
            QuestionType::TrueFalse => self.true_false = value,
            QuestionType::ShortAnswer => self.short_answer = value,
            QuestionType::Matching => self.matching = value,
        }
    }

    pub fn increment(&mut self, kind: QuestionType) {
        self.set(kind, self.get(kind).saturating_add(1));
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        QuestionType::ALL
            .iter()
            .fold(0_u32, |acc, kind| acc.saturating_add(self.get(*kind)))
    }
}

//
// ─── COMPOSITION POLICY ────────────────────────────────────────────────────────
//

/// Raw per-type quota as authored. Counts are signed because they arrive from
/// an untyped source; the composer rejects negatives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRequest {
    #[serde(default)]
    pub multiple_choice_count: i64,
    #[serde(default)]
    pub true_false_count: i64,
    #[serde(default)]
    pub short_answer_count: i64,
    #[serde(default)]
    pub matching_count: i64,
}

impl QuotaRequest {
    #[must_use]
    pub fn new(multiple_choice: i64, true_false: i64, short_answer: i64, matching: i64) -> Self {
        Self {
            multiple_choice_count: multiple_choice,
            true_false_count: true_false,
            short_answer_count: short_answer,
            matching_count: matching,
        }
    }

    #[must_use]
    pub fn raw(&self, kind: QuestionType) -> i64 {
        match kind {
            QuestionType::MultipleChoice => self.multiple_choice_count,
            QuestionType::TrueFalse => self.true_false_count,
            QuestionType::ShortAnswer => self.short_answer_count,
            QuestionType::Matching => self.matching_count,
        }
    }
}

/// How the concrete question set of one attempt is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum CompositionPolicy {
    /// Random prefix of each type's shuffled partition.
    QuotaByType(QuotaRequest),
    /// Random prefix of the whole shuffled pool.
    RandomCount { count: i64 },
    /// Exactly these questions, in this order.
    #[serde(rename_all = "camelCase")]
    ExplicitIds { question_ids: Vec<QuestionId> },
    /// Random prefix of each source bank, concatenated in bank order.
    PerBankCount { count: i64 },
}

//
// ─── PRESENTATION POLICY ───────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresentationPolicy {
    pub shuffle_questions: bool,
    pub show_correct_answers: bool,
    /// Minutes; 0 means untimed.
    pub duration_minutes: u32,
    /// Percentage needed to pass.
    pub passing_score: u8,
    /// Attempt limits gate final exams only. Posttests stay open for retries.
    pub allow_retake: bool,
    pub max_attempts: u32,
}

impl Default for PresentationPolicy {
    fn default() -> Self {
        Self {
            shuffle_questions: false,
            show_correct_answers: false,
            duration_minutes: 30,
            passing_score: 60,
            allow_retake: true,
            max_attempts: 3,
        }
    }
}

impl PresentationPolicy {
    /// Attempts a student may spend. Without retakes only the first counts.
    #[must_use]
    pub fn effective_max_attempts(&self) -> u32 {
        if self.allow_retake {
            self.max_attempts
        } else {
            self.max_attempts.min(1)
        }
    }

    fn validate(&self) -> Result<(), AssessmentError> {
        if self.passing_score > 100 {
            return Err(AssessmentError::InvalidPassingScore(self.passing_score));
        }
        if self.max_attempts == 0 {
            return Err(AssessmentError::InvalidMaxAttempts);
        }
        Ok(())
    }
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssessmentKind {
    Posttest,
    FinalExam,
}

impl AssessmentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentKind::Posttest => "posttest",
            AssessmentKind::FinalExam => "final-exam",
        }
    }
}

/// Persisted shape of a definition, validated into `AssessmentDefinition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentDocument {
    pub id: AssessmentId,
    pub kind: AssessmentKind,
    pub subject_id: SubjectId,
    #[serde(default)]
    pub chapter_id: Option<ChapterId>,
    #[serde(default)]
    pub title: String,
    pub source_banks: Vec<BankId>,
    pub composition: CompositionPolicy,
    #[serde(default)]
    pub presentation: PresentationPolicy,
}

/// A posttest or final exam. Holds no question list of its own; the concrete
/// set is recomputed from the source banks per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AssessmentDocument", into = "AssessmentDocument")]
pub struct AssessmentDefinition {
    doc: AssessmentDocument,
}

impl TryFrom<AssessmentDocument> for AssessmentDefinition {
    type Error = AssessmentError;

    fn try_from(doc: AssessmentDocument) -> Result<Self, Self::Error> {
        match doc.kind {
            AssessmentKind::Posttest => {
                if doc.source_banks.len() != 1 {
                    return Err(AssessmentError::PosttestBankCount(doc.source_banks.len()));
                }
                if doc.chapter_id.is_none() {
                    return Err(AssessmentError::PosttestWithoutChapter);
                }
                if matches!(doc.composition, CompositionPolicy::PerBankCount { .. }) {
                    return Err(AssessmentError::PerBankOnPosttest);
                }
            }
            AssessmentKind::FinalExam => {
                if doc.source_banks.is_empty() {
                    return Err(AssessmentError::FinalExamWithoutBanks);
                }
            }
        }
        doc.presentation.validate()?;
        Ok(Self { doc })
    }
}

impl From<AssessmentDefinition> for AssessmentDocument {
    fn from(def: AssessmentDefinition) -> Self {
        def.doc
    }
}

impl AssessmentDefinition {
    /// Convenience constructor for a chapter posttest sampling one bank.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError` if the presentation policy is invalid or the
    /// composition policy is per-bank.
    pub fn posttest(
        id: AssessmentId,
        subject_id: SubjectId,
        chapter_id: ChapterId,
        bank: BankId,
        composition: CompositionPolicy,
        presentation: PresentationPolicy,
    ) -> Result<Self, AssessmentError> {
        Self::try_from(AssessmentDocument {
            id,
            kind: AssessmentKind::Posttest,
            subject_id,
            chapter_id: Some(chapter_id),
            title: String::new(),
            source_banks: vec![bank],
            composition,
            presentation,
        })
    }

    /// Convenience constructor for a subject final exam.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError` if no banks are given or the presentation
    /// policy is invalid.
    pub fn final_exam(
        id: AssessmentId,
        subject_id: SubjectId,
        banks: Vec<BankId>,
        composition: CompositionPolicy,
        presentation: PresentationPolicy,
    ) -> Result<Self, AssessmentError> {
        Self::try_from(AssessmentDocument {
            id,
            kind: AssessmentKind::FinalExam,
            subject_id,
            chapter_id: None,
            title: String::new(),
            source_banks: banks,
            composition,
            presentation,
        })
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.doc.title = title.into();
        self
    }

    #[must_use]
    pub fn id(&self) -> AssessmentId {
        self.doc.id
    }

    #[must_use]
    pub fn kind(&self) -> AssessmentKind {
        self.doc.kind
    }

    #[must_use]
    pub fn subject_id(&self) -> SubjectId {
        self.doc.subject_id
    }

    #[must_use]
    pub fn chapter_id(&self) -> Option<ChapterId> {
        self.doc.chapter_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.doc.title
    }

    #[must_use]
    pub fn source_banks(&self) -> &[BankId] {
        &self.doc.source_banks
    }

    #[must_use]
    pub fn composition(&self) -> &CompositionPolicy {
        &self.doc.composition
    }

    #[must_use]
    pub fn presentation(&self) -> &PresentationPolicy {
        &self.doc.presentation
    }

    #[must_use]
    pub fn references_bank(&self, bank: BankId) -> bool {
        self.doc.source_banks.contains(&bank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posttest_requires_single_bank_and_chapter() {
        let doc = AssessmentDocument {
            id: AssessmentId::new(1),
            kind: AssessmentKind::Posttest,
            subject_id: SubjectId::new(1),
            chapter_id: Some(ChapterId::new(1)),
            title: String::new(),
            source_banks: vec![BankId::new(1), BankId::new(2)],
            composition: CompositionPolicy::RandomCount { count: 5 },
            presentation: PresentationPolicy::default(),
        };
        assert_eq!(
            AssessmentDefinition::try_from(doc.clone()).unwrap_err(),
            AssessmentError::PosttestBankCount(2)
        );

        let doc = AssessmentDocument {
            chapter_id: None,
            source_banks: vec![BankId::new(1)],
            ..doc
        };
        assert_eq!(
            AssessmentDefinition::try_from(doc).unwrap_err(),
            AssessmentError::PosttestWithoutChapter
        );
    }

    #[test]
    fn per_bank_policy_only_for_final_exams() {
        let err = AssessmentDefinition::posttest(
            AssessmentId::new(1),
            SubjectId::new(1),
            ChapterId::new(1),
            BankId::new(1),
            CompositionPolicy::PerBankCount { count: 2 },
            PresentationPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err, AssessmentError::PerBankOnPosttest);

        let exam = AssessmentDefinition::final_exam(
            AssessmentId::new(2),
            SubjectId::new(1),
            vec![BankId::new(1), BankId::new(2)],
            CompositionPolicy::PerBankCount { count: 2 },
            PresentationPolicy::default(),
        )
        .unwrap();
        assert!(exam.references_bank(BankId::new(2)));
        assert_eq!(exam.kind(), AssessmentKind::FinalExam);
    }

    #[test]
    fn retake_disabled_caps_attempts_at_one() {
        let policy = PresentationPolicy {
            allow_retake: false,
            max_attempts: 5,
            ..PresentationPolicy::default()
        };
        assert_eq!(policy.effective_max_attempts(), 1);
    }

    #[test]
    fn policy_wire_format() {
        let policy: CompositionPolicy = serde_json::from_str(
            r#"{"mode":"quota-by-type","multipleChoiceCount":5,"trueFalseCount":-1}"#,
        )
        .unwrap();
        assert_eq!(policy, CompositionPolicy::QuotaByType(QuotaRequest::new(5, -1, 0, 0)));

        let policy: CompositionPolicy =
            serde_json::from_str(r#"{"mode":"explicit-ids","questionIds":[3,1]}"#).unwrap();
        assert_eq!(
            policy,
            CompositionPolicy::ExplicitIds {
                question_ids: vec![QuestionId::new(3), QuestionId::new(1)]
            }
        );
    }

    #[test]
    fn type_counts_total() {
        let mut counts = TypeCounts::default();
        counts.increment(QuestionType::Matching);
        counts.increment(QuestionType::Matching);
        counts.set(QuestionType::TrueFalse, 3);
        assert_eq!(counts.total(), 5);
        assert_eq!(counts.get(QuestionType::Matching), 2);
    }
}
