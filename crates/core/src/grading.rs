//! Grades submitted answers against the presented questions.

use std::collections::HashMap;

use crate::model::{Answer, AnswerRecord, Question, QuestionId, QuestionType};

/// Decides whether one answer is correct. Pluggable so fuzzy short-answer
/// matching can replace the exact default.
pub trait AnswerComparator: Send + Sync {
    fn is_correct(&self, question: &Question, key: &Answer, given: &Answer) -> bool;
}

/// Exact comparison after trimming surrounding whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatchComparator;

impl AnswerComparator for ExactMatchComparator {
    fn is_correct(&self, _question: &Question, key: &Answer, given: &Answer) -> bool {
        match (key, given) {
            (Answer::Text(k), Answer::Text(g)) => k.trim() == g.trim(),
            (Answer::Matches(k), Answer::Matches(g)) => {
                k.len() == g.len() && k.iter().zip(g).all(|(a, b)| a.trim() == b.trim())
            }
            _ => false,
        }
    }
}

/// The answer key in wire form. Matching keys list right-hand values in
/// left-hand order.
#[must_use]
pub fn answer_key(question: &Question) -> Option<Answer> {
    match question.kind() {
        QuestionType::Matching => Some(Answer::Matches(
            question
                .matching_pairs()
                .iter()
                .map(|p| p.right.clone())
                .collect(),
        )),
        _ => question.correct_answer().map(|a| Answer::Text(a.to_owned())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedAttempt {
    pub score: u32,
    pub total_points: u32,
    pub answers: Vec<AnswerRecord>,
}

/// Grades every presented question in order. Unanswered questions and
/// questions without a key earn nothing.
#[must_use]
pub fn grade(
    questions: &[Question],
    answers: &HashMap<QuestionId, Answer>,
    comparator: &dyn AnswerComparator,
) -> GradedAttempt {
    let mut score = 0_u32;
    let mut total_points = 0_u32;
    let records = questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let key = answer_key(question);
            let given = answers.get(&question.id()).cloned();
            let is_correct = match (&key, &given) {
                (Some(k), Some(g)) => comparator.is_correct(question, k, g),
                _ => false,
            };
            let points = if is_correct { question.points() } else { 0 };
            score = score.saturating_add(points);
            total_points = total_points.saturating_add(question.points());
            AnswerRecord {
                question_index: index,
                question_id: question.id(),
                question_text: question.text().to_owned(),
                user_answer: given,
                correct_answer: key,
                is_correct,
                points,
            }
        })
        .collect();

    GradedAttempt {
        score,
        total_points,
        answers: records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchingPair, QuestionDraft};

    fn questions() -> Vec<Question> {
        vec![
            QuestionDraft::new(QuestionId::new(1), QuestionType::MultipleChoice, "2+2")
                .with_options(["3", "4"])
                .with_answer("4")
                .with_points(2)
                .validate()
                .unwrap(),
            QuestionDraft::new(QuestionId::new(2), QuestionType::TrueFalse, "Water is wet")
                .with_answer("true")
                .validate()
                .unwrap(),
            QuestionDraft::new(QuestionId::new(3), QuestionType::Matching, "Capitals")
                .with_pairs(vec![
                    MatchingPair::new("France", "Paris"),
                    MatchingPair::new("Spain", "Madrid"),
                ])
                .with_points(3)
                .validate()
                .unwrap(),
            QuestionDraft::new(QuestionId::new(4), QuestionType::ShortAnswer, "Describe rain")
                .validate()
                .unwrap(),
        ]
    }

    #[test]
    fn grades_each_type_exactly() {
        let answers = HashMap::from([
            (QuestionId::new(1), Answer::Text(" 4 ".into())),
            (QuestionId::new(2), Answer::Text("false".into())),
            (
                QuestionId::new(3),
                Answer::Matches(vec!["Paris".into(), "Madrid".into()]),
            ),
            (QuestionId::new(4), Answer::Text("wet".into())),
        ]);
        let graded = grade(&questions(), &answers, &ExactMatchComparator);

        assert_eq!(graded.total_points, 7);
        assert_eq!(graded.score, 5);
        let correct: Vec<bool> = graded.answers.iter().map(|a| a.is_correct).collect();
        assert_eq!(correct, vec![true, false, true, false]);
        assert!(graded.answers[3].correct_answer.is_none());
        assert_eq!(graded.answers[2].question_index, 2);
    }

    #[test]
    fn unanswered_questions_score_zero() {
        let graded = grade(&questions(), &HashMap::new(), &ExactMatchComparator);
        assert_eq!(graded.score, 0);
        assert!(graded.answers.iter().all(|a| a.user_answer.is_none()));
    }

    #[test]
    fn matching_order_matters() {
        let answers = HashMap::from([(
            QuestionId::new(3),
            Answer::Matches(vec!["Madrid".into(), "Paris".into()]),
        )]);
        let graded = grade(&questions(), &answers, &ExactMatchComparator);
        assert!(!graded.answers[2].is_correct);
    }
}
