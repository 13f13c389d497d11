use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("question points must be > 0")]
    InvalidPoints,

    #[error("{0} question requires a correct answer")]
    MissingAnswerKey(QuestionType),

    #[error("matching question must not carry a correct answer")]
    UnexpectedAnswerKey,

    #[error("multiple-choice question requires at least one option")]
    MissingOptions,

    #[error("matching question requires at least one pair")]
    MissingPairs,

    #[error("{0} question must not carry matching pairs")]
    UnexpectedPairs(QuestionType),

    #[error("matching pair {index} has an empty side")]
    EmptyPairSide { index: usize },

    #[error("unknown question type: {0}")]
    UnknownType(String),
}

//
// ─── QUESTION TYPE ─────────────────────────────────────────────────────────────
//

/// The four authorable question kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Matching,
}

impl QuestionType {
    /// Every type, in the order quota composition concatenates them.
    pub const ALL: [QuestionType; 4] = [
        QuestionType::MultipleChoice,
        QuestionType::TrueFalse,
        QuestionType::ShortAnswer,
        QuestionType::Matching,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple-choice",
            QuestionType::TrueFalse => "true-false",
            QuestionType::ShortAnswer => "short-answer",
            QuestionType::Matching => "matching",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiple-choice" => Ok(Self::MultipleChoice),
            "true-false" => Ok(Self::TrueFalse),
            "short-answer" => Ok(Self::ShortAnswer),
            "matching" => Ok(Self::Matching),
            other => Err(QuestionError::UnknownType(other.to_owned())),
        }
    }
}

//
// ─── MATCHING PAIR ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingPair {
    pub left: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_image: Option<String>,
    pub right: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_image: Option<String>,
}

impl MatchingPair {
    #[must_use]
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            left_image: None,
            right: right.into(),
            right_image: None,
        }
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

fn default_points() -> u32 {
    1
}

/// Unvalidated question as supplied by the authoring collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matching_pairs: Vec<MatchingPair>,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuestionDraft {
    /// Starts a draft of the given type worth one point.
    #[must_use]
    pub fn new(id: QuestionId, kind: QuestionType, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            image: None,
            kind,
            options: Vec::new(),
            correct_answer: None,
            matching_pairs: Vec::new(),
            points: default_points(),
            explanation: None,
        }
    }

    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.correct_answer = Some(answer.into());
        self
    }

    #[must_use]
    pub fn with_pairs(mut self, pairs: Vec<MatchingPair>) -> Self {
        self.matching_pairs = pairs;
        self
    }

    #[must_use]
    pub fn with_points(mut self, points: u32) -> Self {
        self.points = points;
        self
    }

    /// Checks the per-type shape rules and produces a `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when the text is blank, points are zero, or the
    /// answer key / matching pairs do not fit the question type.
    pub fn validate(self) -> Result<Question, QuestionError> {
        let text = self.text.trim().to_owned();
        if text.is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if self.points == 0 {
            return Err(QuestionError::InvalidPoints);
        }

        let correct_answer = self
            .correct_answer
            .map(|a| a.trim().to_owned())
            .filter(|a| !a.is_empty());

        match self.kind {
            QuestionType::Matching => {
                if correct_answer.is_some() {
                    return Err(QuestionError::UnexpectedAnswerKey);
                }
                if self.matching_pairs.is_empty() {
                    return Err(QuestionError::MissingPairs);
                }
                if let Some(index) = self
                    .matching_pairs
                    .iter()
                    .position(|p| p.left.trim().is_empty() || p.right.trim().is_empty())
                {
                    return Err(QuestionError::EmptyPairSide { index });
                }
            }
            kind => {
                if !self.matching_pairs.is_empty() {
                    return Err(QuestionError::UnexpectedPairs(kind));
                }
                // Short answers are graded by the external comparator and may omit a key.
                if kind != QuestionType::ShortAnswer && correct_answer.is_none() {
                    return Err(QuestionError::MissingAnswerKey(kind));
                }
                if kind == QuestionType::MultipleChoice && self.options.is_empty() {
                    return Err(QuestionError::MissingOptions);
                }
            }
        }

        Ok(Question {
            id: self.id,
            text,
            image: self.image,
            kind: self.kind,
            options: self.options,
            correct_answer,
            matching_pairs: self.matching_pairs,
            points: self.points,
            explanation: self.explanation.filter(|e| !e.trim().is_empty()),
        })
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A validated question. Only reachable through `QuestionDraft::validate`, so
/// the per-type invariants always hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionDraft", into = "QuestionDraft")]
pub struct Question {
    id: QuestionId,
    text: String,
    image: Option<String>,
    kind: QuestionType,
    options: Vec<String>,
    correct_answer: Option<String>,
    matching_pairs: Vec<MatchingPair>,
    points: u32,
    explanation: Option<String>,
}

impl TryFrom<QuestionDraft> for Question {
    type Error = QuestionError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<Question> for QuestionDraft {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            text: q.text,
            image: q.image,
            kind: q.kind,
            options: q.options,
            correct_answer: q.correct_answer,
            matching_pairs: q.matching_pairs,
            points: q.points,
            explanation: q.explanation,
        }
    }
}

impl Question {
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> QuestionType {
        self.kind
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_answer(&self) -> Option<&str> {
        self.correct_answer.as_deref()
    }

    #[must_use]
    pub fn matching_pairs(&self) -> &[MatchingPair] {
        &self.matching_pairs
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn qid(n: u64) -> QuestionId {
        QuestionId::new(n)
    }

    #[test]
    fn multiple_choice_requires_key_and_options() {
        let err = QuestionDraft::new(qid(1), QuestionType::MultipleChoice, "2 + 2?")
            .with_options(["3", "4"])
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::MissingAnswerKey(QuestionType::MultipleChoice));

        let err = QuestionDraft::new(qid(1), QuestionType::MultipleChoice, "2 + 2?")
            .with_answer("4")
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::MissingOptions);
    }

    #[test]
    fn short_answer_may_omit_key() {
        let q = QuestionDraft::new(qid(2), QuestionType::ShortAnswer, "Explain osmosis")
            .validate()
            .unwrap();
        assert_eq!(q.correct_answer(), None);
        assert_eq!(q.points(), 1);
    }

    #[test]
    fn matching_rejects_answer_key_and_requires_pairs() {
        let err = QuestionDraft::new(qid(3), QuestionType::Matching, "Match capitals")
            .with_answer("Paris")
            .with_pairs(vec![MatchingPair::new("France", "Paris")])
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::UnexpectedAnswerKey);

        let err = QuestionDraft::new(qid(3), QuestionType::Matching, "Match capitals")
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::MissingPairs);

        let err = QuestionDraft::new(qid(3), QuestionType::Matching, "Match capitals")
            .with_pairs(vec![
                MatchingPair::new("France", "Paris"),
                MatchingPair::new("Spain", " "),
            ])
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::EmptyPairSide { index: 1 });
    }

    #[test]
    fn blank_answer_key_counts_as_missing() {
        let err = QuestionDraft::new(qid(4), QuestionType::TrueFalse, "Water is wet")
            .with_answer("   ")
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::MissingAnswerKey(QuestionType::TrueFalse));
    }

    #[test]
    fn zero_points_rejected() {
        let err = QuestionDraft::new(qid(5), QuestionType::TrueFalse, "Sky is blue")
            .with_answer("true")
            .with_points(0)
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::InvalidPoints);
    }

    #[test]
    fn deserialize_applies_default_points_and_validation() {
        let q: Question = serde_json::from_str(
            r#"{"id":9,"text":"Sky is blue","type":"true-false","correctAnswer":"true"}"#,
        )
        .unwrap();
        assert_eq!(q.kind(), QuestionType::TrueFalse);
        assert_eq!(q.points(), 1);

        let bad = serde_json::from_str::<Question>(
            r#"{"id":9,"text":"Match","type":"matching","correctAnswer":"x"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn type_parses_from_wire_name() {
        for kind in QuestionType::ALL {
            assert_eq!(kind.as_str().parse::<QuestionType>().unwrap(), kind);
        }
        assert!("essay".parse::<QuestionType>().is_err());
    }
}
