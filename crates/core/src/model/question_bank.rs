use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::assessment::TypeCounts;
use crate::model::ids::{BankId, ChapterId, QuestionId, SubjectId};
use crate::model::question::Question;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BankError {
    #[error("question {0} already exists in this bank")]
    DuplicateQuestion(QuestionId),

    #[error("question {0} is not part of this bank")]
    UnknownQuestion(QuestionId),
}

/// Persisted shape of a bank. `total_points` is written for readers of the
/// raw document but ignored on load; the bank recomputes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDocument {
    pub id: BankId,
    pub subject_id: SubjectId,
    pub chapter_id: ChapterId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub total_points: u32,
}

/// A chapter's pretest sheet: the ordered pool that posttests and final exams
/// sample from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BankDocument", into = "BankDocument")]
pub struct QuestionBank {
    id: BankId,
    subject_id: SubjectId,
    chapter_id: ChapterId,
    title: String,
    questions: Vec<Question>,
    total_points: u32,
}

impl TryFrom<BankDocument> for QuestionBank {
    type Error = BankError;

    fn try_from(doc: BankDocument) -> Result<Self, Self::Error> {
        let mut bank = QuestionBank::new(doc.id, doc.subject_id, doc.chapter_id, doc.title);
        for question in doc.questions {
            bank.push_question(question)?;
        }
        Ok(bank)
    }
}

impl From<QuestionBank> for BankDocument {
    fn from(bank: QuestionBank) -> Self {
        Self {
            id: bank.id,
            subject_id: bank.subject_id,
            chapter_id: bank.chapter_id,
            title: bank.title,
            questions: bank.questions,
            total_points: bank.total_points,
        }
    }
}

impl QuestionBank {
    #[must_use]
    pub fn new(
        id: BankId,
        subject_id: SubjectId,
        chapter_id: ChapterId,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id,
            subject_id,
            chapter_id,
            title: title.into().trim().to_owned(),
            questions: Vec::new(),
            total_points: 0,
        }
    }

    /// Builds a bank from already validated questions.
    ///
    /// # Errors
    ///
    /// Returns `BankError::DuplicateQuestion` if two questions share an id.
    pub fn with_questions(
        id: BankId,
        subject_id: SubjectId,
        chapter_id: ChapterId,
        title: impl Into<String>,
        questions: impl IntoIterator<Item = Question>,
    ) -> Result<Self, BankError> {
        let mut bank = Self::new(id, subject_id, chapter_id, title);
        for question in questions {
            bank.push_question(question)?;
        }
        Ok(bank)
    }

    #[must_use]
    pub fn id(&self) -> BankId {
        self.id
    }

    #[must_use]
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    #[must_use]
    pub fn chapter_id(&self) -> ChapterId {
        self.chapter_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Cached sum of question points; always equal to the live sum.
    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: QuestionId) -> bool {
        self.question(id).is_some()
    }

    /// Number of questions of each type in the pool.
    #[must_use]
    pub fn count_by_type(&self) -> TypeCounts {
        let mut counts = TypeCounts::default();
        for q in &self.questions {
            counts.increment(q.kind());
        }
        counts
    }

    /// Appends a question to the end of the bank.
    ///
    /// # Errors
    ///
    /// Returns `BankError::DuplicateQuestion` if the id is already present.
    pub fn push_question(&mut self, question: Question) -> Result<(), BankError> {
        if self.contains(question.id()) {
            return Err(BankError::DuplicateQuestion(question.id()));
        }
        self.questions.push(question);
        self.recompute_total();
        Ok(())
    }

    /// Replaces the question with the same id, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns `BankError::UnknownQuestion` if no question has that id.
    pub fn replace_question(&mut self, question: Question) -> Result<(), BankError> {
        let slot = self
            .questions
            .iter_mut()
            .find(|q| q.id() == question.id())
            .ok_or(BankError::UnknownQuestion(question.id()))?;
        *slot = question;
        self.recompute_total();
        Ok(())
    }

    /// Removes a question and returns it.
    ///
    /// # Errors
    ///
    /// Returns `BankError::UnknownQuestion` if no question has that id.
    pub fn remove_question(&mut self, id: QuestionId) -> Result<Question, BankError> {
        let index = self
            .questions
            .iter()
            .position(|q| q.id() == id)
            .ok_or(BankError::UnknownQuestion(id))?;
        let removed = self.questions.remove(index);
        self.recompute_total();
        Ok(removed)
    }

    fn recompute_total(&mut self) {
        self.total_points = self.questions.iter().map(Question::points).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::{QuestionDraft, QuestionType};

    fn tf(id: u64, points: u32) -> Question {
        QuestionDraft::new(QuestionId::new(id), QuestionType::TrueFalse, format!("Q{id}"))
            .with_answer("true")
            .with_points(points)
            .validate()
            .unwrap()
    }

    fn empty_bank() -> QuestionBank {
        QuestionBank::new(BankId::new(1), SubjectId::new(1), ChapterId::new(1), " Unit 1 ")
    }

    #[test]
    fn total_points_tracks_every_mutation() {
        let mut bank = empty_bank();
        assert_eq!(bank.total_points(), 0);
        assert_eq!(bank.title(), "Unit 1");

        bank.push_question(tf(1, 2)).unwrap();
        bank.push_question(tf(2, 3)).unwrap();
        assert_eq!(bank.total_points(), 5);

        bank.replace_question(tf(1, 10)).unwrap();
        assert_eq!(bank.total_points(), 13);
        assert_eq!(bank.questions()[0].id(), QuestionId::new(1));

        bank.remove_question(QuestionId::new(2)).unwrap();
        assert_eq!(bank.total_points(), 10);
        assert_eq!(bank.len(), 1);
    }

    #[test]
    fn duplicate_and_unknown_ids_rejected() {
        let mut bank = empty_bank();
        bank.push_question(tf(1, 1)).unwrap();
        assert_eq!(
            bank.push_question(tf(1, 1)).unwrap_err(),
            BankError::DuplicateQuestion(QuestionId::new(1))
        );
        assert_eq!(
            bank.remove_question(QuestionId::new(7)).unwrap_err(),
            BankError::UnknownQuestion(QuestionId::new(7))
        );
    }

    #[test]
    fn stale_total_in_document_is_ignored() {
        let json = serde_json::json!({
            "id": 3,
            "subjectId": 1,
            "chapterId": 2,
            "title": "Cells",
            "totalPoints": 999,
            "questions": [
                {"id": 1, "text": "A", "type": "true-false", "correctAnswer": "true", "points": 4},
                {"id": 2, "text": "B", "type": "short-answer"}
            ]
        });
        let bank: QuestionBank = serde_json::from_value(json).unwrap();
        assert_eq!(bank.total_points(), 5);
        assert_eq!(bank.count_by_type().get(QuestionType::TrueFalse), 1);
        assert_eq!(bank.count_by_type().get(QuestionType::ShortAnswer), 1);
    }
}
