//! A small demo subject used by the seed binary, the CLI and tests.

use chrono::{DateTime, Utc};
use course_core::model::{
    AssessmentDefinition, AssessmentId, BankId, Chapter, ChapterId, CompositionPolicy,
    MatchingPair, PresentationPolicy, Question, QuestionBank, QuestionDraft, QuestionId,
    QuestionType, QuotaRequest, StudentId, Subject, SubjectId,
};
use thiserror::Error;
use tracing::info;

use crate::repository::{Storage, StorageError};

pub const DEMO_SUBJECT: SubjectId = SubjectId::new(1);
pub const DEMO_STUDENT: StudentId = StudentId::new(1);
pub const DEMO_FINAL_EXAM: AssessmentId = AssessmentId::new(300);

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SeedError {
    #[error(transparent)]
    Domain(#[from] course_core::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Everything the demo subject consists of.
#[derive(Debug, Clone)]
pub struct DemoCourse {
    pub subject: Subject,
    pub chapters: Vec<Chapter>,
    pub banks: Vec<QuestionBank>,
    pub assessments: Vec<AssessmentDefinition>,
}

fn mc(
    id: u64,
    text: &str,
    options: [&str; 3],
    answer: &str,
) -> Result<Question, course_core::Error> {
    QuestionDraft::new(QuestionId::new(id), QuestionType::MultipleChoice, text)
        .with_options(options)
        .with_answer(answer)
        .validate()
        .map_err(Into::into)
}

fn tf(id: u64, text: &str, answer: bool) -> Result<Question, course_core::Error> {
    QuestionDraft::new(QuestionId::new(id), QuestionType::TrueFalse, text)
        .with_answer(answer.to_string())
        .validate()
        .map_err(Into::into)
}

fn short(id: u64, text: &str, answer: &str) -> Result<Question, course_core::Error> {
    QuestionDraft::new(QuestionId::new(id), QuestionType::ShortAnswer, text)
        .with_answer(answer)
        .with_points(2)
        .validate()
        .map_err(Into::into)
}

fn matching(id: u64, text: &str, pairs: [(&str, &str); 3]) -> Result<Question, course_core::Error> {
    QuestionDraft::new(QuestionId::new(id), QuestionType::Matching, text)
        .with_pairs(pairs.iter().map(|(l, r)| MatchingPair::new(*l, *r)).collect())
        .with_points(3)
        .validate()
        .map_err(Into::into)
}

fn bank(
    id: u64,
    chapter: u64,
    title: &str,
    questions: Vec<Result<Question, course_core::Error>>,
) -> Result<QuestionBank, course_core::Error> {
    let questions = questions.into_iter().collect::<Result<Vec<_>, _>>()?;
    QuestionBank::with_questions(
        BankId::new(id),
        DEMO_SUBJECT,
        ChapterId::new(chapter),
        title,
        questions,
    )
    .map_err(Into::into)
}

/// Builds the demo subject: three chapters, a pretest on the first, posttests
/// on the first two, and a final exam drawing from every chapter bank.
///
/// # Errors
///
/// Returns `course_core::Error` if a fixture violates a domain rule.
pub fn demo_course() -> Result<DemoCourse, course_core::Error> {
    let pretest = bank(
        100,
        1,
        "Matter warm-up",
        vec![
            tf(1001, "Air has mass", true),
            mc(1002, "Which is a gas?", ["Ice", "Steam", "Stone"], "Steam"),
        ],
    )?;
    let matter = bank(
        1,
        1,
        "States of matter",
        vec![
            mc(101, "Water boils at (°C)", ["90", "100", "110"], "100"),
            mc(102, "Which state has a fixed shape?", ["Solid", "Liquid", "Gas"], "Solid"),
            tf(103, "Gas fills its container", true),
            tf(104, "Ice is denser than water", false),
            short(105, "Name the change from liquid to gas", "evaporation"),
            matching(
                106,
                "Match the change to its name",
                [
                    ("solid to liquid", "melting"),
                    ("liquid to solid", "freezing"),
                    ("gas to liquid", "condensation"),
                ],
            ),
        ],
    )?;
    let energy = bank(
        2,
        2,
        "Energy",
        vec![
            mc(201, "Unit of energy", ["Joule", "Newton", "Watt"], "Joule"),
            tf(202, "Energy can be created", false),
            tf(203, "Sunlight carries energy", true),
            short(204, "Energy of motion is called", "kinetic"),
        ],
    )?;
    let forces = bank(
        3,
        3,
        "Forces",
        vec![
            mc(301, "Force pulling objects down", ["Friction", "Gravity", "Tension"], "Gravity"),
            tf(302, "Friction opposes motion", true),
            matching(
                303,
                "Match the force to its source",
                [
                    ("gravity", "mass"),
                    ("magnetism", "magnet"),
                    ("friction", "surfaces"),
                ],
            ),
        ],
    )?;

    let presentation = PresentationPolicy {
        shuffle_questions: true,
        show_correct_answers: true,
        duration_minutes: 15,
        ..PresentationPolicy::default()
    };
    let assessments = vec![
        AssessmentDefinition::posttest(
            AssessmentId::new(201),
            DEMO_SUBJECT,
            ChapterId::new(1),
            matter.id(),
            CompositionPolicy::QuotaByType(QuotaRequest::new(2, 2, 1, 1)),
            presentation.clone(),
        )?
        .with_title("Matter check"),
        AssessmentDefinition::posttest(
            AssessmentId::new(202),
            DEMO_SUBJECT,
            ChapterId::new(2),
            energy.id(),
            CompositionPolicy::RandomCount { count: 3 },
            presentation.clone(),
        )?
        .with_title("Energy check"),
        AssessmentDefinition::final_exam(
            DEMO_FINAL_EXAM,
            DEMO_SUBJECT,
            vec![matter.id(), energy.id(), forces.id()],
            CompositionPolicy::PerBankCount { count: 2 },
            PresentationPolicy {
                duration_minutes: 30,
                max_attempts: 2,
                ..presentation
            },
        )?
        .with_title("Basic Science final"),
    ];

    let chapters = vec![
        Chapter::new(ChapterId::new(1), DEMO_SUBJECT, "Matter", 1)
            .with_pretest(pretest.id())
            .with_posttest(AssessmentId::new(201)),
        Chapter::new(ChapterId::new(2), DEMO_SUBJECT, "Energy", 2)
            .with_posttest(AssessmentId::new(202)),
        Chapter::new(ChapterId::new(3), DEMO_SUBJECT, "Forces", 3),
    ];

    Ok(DemoCourse {
        subject: Subject::new(DEMO_SUBJECT, "Basic Science"),
        chapters,
        banks: vec![pretest, matter, energy, forces],
        assessments,
    })
}

/// Writes the demo subject into `storage`. Safe to run repeatedly.
///
/// # Errors
///
/// Returns `SeedError` if a fixture is invalid or a write fails.
pub async fn seed(storage: &Storage, now: DateTime<Utc>) -> Result<DemoCourse, SeedError> {
    let course = demo_course()?;

    storage.courses.upsert_subject(&course.subject).await?;
    for bank in &course.banks {
        storage.banks.upsert_bank(bank).await?;
    }
    for definition in &course.assessments {
        storage.assessments.upsert_assessment(definition).await?;
    }
    for chapter in &course.chapters {
        storage.courses.upsert_chapter(chapter).await?;
    }

    info!(
        subject = %course.subject.id,
        chapters = course.chapters.len(),
        banks = course.banks.len(),
        seeded_at = %now,
        "seeded demo subject"
    );
    Ok(course)
}
