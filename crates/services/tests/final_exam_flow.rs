use std::collections::{HashMap, HashSet};

use chrono::Duration;
use course_core::grading::answer_key;
use course_core::model::{
    Answer, AssessmentId, BankId, ChapterId, QuestionId, StudentId, TestOutcome, TestType,
};
use course_core::time::fixed_now;
use services::{
    AppServices, Clock, ComposedAttempt, EngineConfig, ErrorKind, ForbiddenReason, Submission,
};
use storage::demo::{self, DEMO_FINAL_EXAM, DEMO_SUBJECT};
use storage::repository::Storage;

fn app_at(storage: &Storage, minutes: i64, config: EngineConfig) -> AppServices {
    AppServices::new(
        storage.clone(),
        Clock::fixed(fixed_now() + Duration::minutes(minutes)),
        config,
    )
}

async fn seeded() -> Storage {
    let storage = Storage::in_memory();
    demo::seed(&storage, fixed_now()).await.unwrap();
    storage
}

async fn complete_all_chapters(app: &AppServices, student: StudentId) {
    let pass = TestOutcome {
        score: 9,
        percentage: 100,
        passed: true,
    };
    let progress = app.progress();
    for chapter in [1, 2] {
        let chapter = ChapterId::new(chapter);
        progress.complete_video(student, chapter).await.unwrap();
        progress.record_posttest(student, chapter, pass).await.unwrap();
    }
    progress.complete_video(student, ChapterId::new(3)).await.unwrap();
}

fn answers(attempt: &ComposedAttempt, correct: bool) -> HashMap<QuestionId, Answer> {
    let course = demo::demo_course().unwrap();
    attempt
        .questions
        .iter()
        .map(|served| {
            let answer = if correct {
                let question = course
                    .banks
                    .iter()
                    .find_map(|b| b.question(served.id))
                    .unwrap();
                answer_key(question).unwrap()
            } else {
                Answer::Text("wrong".into())
            };
            (served.id, answer)
        })
        .collect()
}

#[tokio::test]
async fn final_exam_is_locked_until_every_chapter_is_complete() {
    let storage = seeded().await;
    let app = app_at(&storage, 0, EngineConfig::default());
    let student = StudentId::new(11);

    let err = app.final_exams().start(student, DEMO_SUBJECT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::NotEligible));
    let err = app
        .final_exams()
        .submit(student, DEMO_SUBJECT, Submission::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::NotEligible));

    let status = app.final_exams().status(student, DEMO_SUBJECT).await.unwrap();
    assert!(!status.gate.can_view);
    assert_eq!(status.gate.max_attempts, 2);

    complete_all_chapters(&app, student).await;
    let status = app.final_exams().status(student, DEMO_SUBJECT).await.unwrap();
    assert!(status.gate.can_view && status.gate.can_submit);
    assert_eq!(status.assessment_id, DEMO_FINAL_EXAM);

    // Eligible, but answers alone are not an attempt.
    let attempt = app.final_exams().start(student, DEMO_SUBJECT).await.unwrap();
    let mut one = answers(&attempt, true);
    let first = attempt.questions[0].id;
    one.retain(|id, _| *id == first);
    let err = app
        .final_exams()
        .submit(
            student,
            DEMO_SUBJECT,
            Submission {
                answers: one,
                ..Submission::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPolicy);
    let status = app.final_exams().status(student, DEMO_SUBJECT).await.unwrap();
    assert_eq!(status.gate.attempts, 0);
}

#[tokio::test]
async fn final_exam_samples_each_bank_and_limits_retakes() {
    let storage = seeded().await;
    let app = app_at(&storage, 0, EngineConfig::default());
    let student = StudentId::new(12);
    complete_all_chapters(&app, student).await;

    let attempt = app.final_exams().start(student, DEMO_SUBJECT).await.unwrap();
    assert_eq!(attempt.questions.len(), 6);
    let course = demo::demo_course().unwrap();
    for bank in [1, 2, 3] {
        let bank = course.banks.iter().find(|b| b.id() == BankId::new(bank)).unwrap();
        let drawn = attempt.questions.iter().filter(|q| bank.contains(q.id)).count();
        assert_eq!(drawn, 2);
    }
    let unique: HashSet<QuestionId> = attempt.questions.iter().map(|q| q.id).collect();
    assert_eq!(unique.len(), 6);

    let first = app
        .final_exams()
        .submit(
            student,
            DEMO_SUBJECT,
            Submission::for_attempt(attempt.attempt_id, answers(&attempt, false)),
        )
        .await
        .unwrap();
    assert_eq!(first.test_type, TestType::Final);
    assert!(!first.passed);
    assert!(first.progress.is_none());

    let status = app.final_exams().status(student, DEMO_SUBJECT).await.unwrap();
    assert_eq!(status.gate.attempts, 1);
    assert_eq!(status.gate.attempts_remaining, 1);
    assert!(status.gate.retake_offered);

    let second = app.final_exams().start(student, DEMO_SUBJECT).await.unwrap();
    app.final_exams()
        .submit(
            student,
            DEMO_SUBJECT,
            Submission::for_attempt(second.attempt_id, answers(&second, false)),
        )
        .await
        .unwrap();

    let err = app.final_exams().start(student, DEMO_SUBJECT).await.unwrap_err();
    assert_eq!(
        err.kind(),
        ErrorKind::Forbidden(ForbiddenReason::AttemptsExhausted)
    );
    let status = app.final_exams().status(student, DEMO_SUBJECT).await.unwrap();
    assert!(status.gate.can_view);
    assert!(!status.gate.can_submit);
    assert!(!status.gate.retake_offered);
}

#[tokio::test]
async fn passing_final_exam_keeps_submission_open() {
    let storage = seeded().await;
    let student = StudentId::new(13);
    complete_all_chapters(&app_at(&storage, 0, EngineConfig::default()), student).await;

    for (minutes, correct) in [(0, false), (45, true)] {
        let app = app_at(&storage, minutes, EngineConfig::default());
        let attempt = app.final_exams().start(student, DEMO_SUBJECT).await.unwrap();
        app.final_exams()
            .submit(
                student,
                DEMO_SUBJECT,
                Submission::for_attempt(attempt.attempt_id, answers(&attempt, correct)),
            )
            .await
            .unwrap();
    }

    let app = app_at(&storage, 60, EngineConfig::default());
    let status = app.final_exams().status(student, DEMO_SUBJECT).await.unwrap();
    assert_eq!(status.gate.attempts, 2);
    assert_eq!(status.gate.last_passed, Some(true));
    assert!(status.gate.can_submit);
}

#[tokio::test]
async fn late_or_foreign_attempts_are_refused() {
    let storage = seeded().await;
    let config = EngineConfig {
        enforce_deadline: true,
        deadline_grace_secs: 30,
        ..EngineConfig::default()
    };
    let student = StudentId::new(14);
    let posttest = AssessmentId::new(201);

    let start = app_at(&storage, 0, config.clone());
    let on_time = start.compose().compose(student, posttest).await.unwrap();
    let late = start.compose().compose(student, posttest).await.unwrap();
    assert_eq!(late.duration, 15);

    let err = app_at(&storage, 5, config.clone())
        .submissions()
        .submit_assessment(
            StudentId::new(99),
            posttest,
            Submission::for_attempt(on_time.attempt_id, answers(&on_time, true)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::NotAttemptOwner));

    let receipt = app_at(&storage, 10, config.clone())
        .submissions()
        .submit_assessment(
            student,
            posttest,
            Submission::for_attempt(on_time.attempt_id, answers(&on_time, true)),
        )
        .await
        .unwrap();
    assert!(receipt.passed);
    assert_eq!(receipt.result.duration_secs(), 600);

    let err = app_at(&storage, 20, config)
        .submissions()
        .submit_assessment(
            student,
            posttest,
            Submission::for_attempt(late.attempt_id, answers(&late, true)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden(ForbiddenReason::DeadlineExceeded));

    // Without enforcement the same late attempt is accepted.
    app_at(&storage, 20, EngineConfig::default())
        .submissions()
        .submit_assessment(
            student,
            posttest,
            Submission::for_attempt(late.attempt_id, answers(&late, true)),
        )
        .await
        .unwrap();
}
