//! Student-facing projection of composed questions.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::composer::ComposedSet;
use crate::model::{PresentationPolicy, Question, QuestionId, QuestionType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPair {
    pub left: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_image: Option<String>,
}

/// A right-hand value offered for matching when the pairing is hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOption {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// What a client renders. The answer key, explanation and right-hand sides of
/// matching pairs are only present when revealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayQuestion {
    pub id: QuestionId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub points: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matching_pairs: Vec<DisplayPair>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub right_options: Vec<MatchOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl DisplayQuestion {
    /// Projects one question. Hidden matching questions get their right-hand
    /// values as a separately shuffled option list.
    pub fn project<R: Rng + ?Sized>(question: &Question, reveal: bool, rng: &mut R) -> Self {
        let matching_pairs = question
            .matching_pairs()
            .iter()
            .map(|p| DisplayPair {
                left: p.left.clone(),
                left_image: p.left_image.clone(),
                right: reveal.then(|| p.right.clone()),
                right_image: if reveal { p.right_image.clone() } else { None },
            })
            .collect();

        let mut right_options: Vec<MatchOption> = if reveal {
            Vec::new()
        } else {
            question
                .matching_pairs()
                .iter()
                .map(|p| MatchOption {
                    value: p.right.clone(),
                    image: p.right_image.clone(),
                })
                .collect()
        };
        right_options.shuffle(rng);

        Self {
            id: question.id(),
            text: question.text().to_owned(),
            image: question.image().map(str::to_owned),
            kind: question.kind(),
            options: question.options().to_vec(),
            points: question.points(),
            matching_pairs,
            right_options,
            correct_answer: if reveal {
                question.correct_answer().map(str::to_owned)
            } else {
                None
            },
            explanation: if reveal {
                question.explanation().map(str::to_owned)
            } else {
                None
            },
        }
    }
}

/// Answers are revealed only when the policy allows it and the attempt has
/// already been graded.
#[must_use]
pub fn should_reveal(presentation: &PresentationPolicy, graded: bool) -> bool {
    presentation.show_correct_answers && graded
}

/// Projects a whole composed set in order.
pub fn project_set<R: Rng + ?Sized>(
    set: &ComposedSet,
    presentation: &PresentationPolicy,
    graded: bool,
    rng: &mut R,
) -> Vec<DisplayQuestion> {
    let reveal = should_reveal(presentation, graded);
    set.questions()
        .iter()
        .map(|q| DisplayQuestion::project(q, reveal, rng))
        .collect()
}
