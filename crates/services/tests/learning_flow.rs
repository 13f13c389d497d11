use std::collections::HashMap;

use course_core::grading::answer_key;
use course_core::model::{
    Answer, AssessmentId, ChapterId, QuestionId, QuestionType, StudentId, SubjectId, TestType,
};
use course_core::stage::PipelineStage;
use course_core::time::fixed_now;
use services::{AppServices, Clock, ComposedAttempt, EngineConfig, ErrorKind, Submission};
use storage::demo::{self, DEMO_STUDENT, DEMO_SUBJECT};
use storage::repository::Storage;

const MATTER: ChapterId = ChapterId::new(1);
const POSTTEST: AssessmentId = AssessmentId::new(201);

async fn services(storage: Storage) -> AppServices {
    demo::seed(&storage, fixed_now()).await.unwrap();
    AppServices::new(storage, Clock::fixed(fixed_now()), EngineConfig::default())
}

fn correct_answers(attempt: &ComposedAttempt) -> HashMap<QuestionId, Answer> {
    let course = demo::demo_course().unwrap();
    attempt
        .questions
        .iter()
        .map(|served| {
            let question = course
                .banks
                .iter()
                .find_map(|b| b.question(served.id))
                .expect("served question exists");
            (served.id, answer_key(question).expect("keyed question"))
        })
        .collect()
}

fn wrong_answers(attempt: &ComposedAttempt) -> HashMap<QuestionId, Answer> {
    attempt
        .questions
        .iter()
        .map(|q| (q.id, Answer::Text("no idea".into())))
        .collect()
}

#[tokio::test]
async fn chapter_moves_from_pretest_to_completed() {
    let storage = Storage::sqlite("sqlite:file:memdb_learning_flow?mode=memory&cache=shared")
        .await
        .expect("storage");
    let app = services(storage).await;
    let progress = app.progress();
    let student = DEMO_STUDENT;

    assert_eq!(
        progress.stage(student, MATTER).await.unwrap(),
        PipelineStage::PretestPending
    );

    // Pretest: served from its bank, graded, never blocks learning.
    let paper = app.compose().pretest(MATTER).await.unwrap();
    assert_eq!(paper.questions.len(), 2);
    assert!(paper.questions.iter().all(|q| q.correct_answer.is_none()));
    let pretest = Submission {
        answers: HashMap::from([(QuestionId::new(1001), Answer::Text("true".into()))]),
        ..Submission::default()
    };
    let receipt = app
        .submissions()
        .submit_pretest(student, MATTER, pretest)
        .await
        .unwrap();
    assert_eq!(receipt.test_type, TestType::Pretest);
    assert_eq!((receipt.score, receipt.total_points), (1, 2));
    assert!(!receipt.passed);
    let update = receipt.progress.expect("pretest updates progress");
    assert_eq!(update.stage, PipelineStage::Learning);
    assert_eq!(update.progress.pretest().attempts, 1);

    // Learning.
    let update = progress.record_video(student, MATTER, 40).await.unwrap();
    assert_eq!(update.stage, PipelineStage::Learning);
    progress.record_document_view(student, MATTER).await.unwrap();
    let update = progress.complete_video(student, MATTER).await.unwrap();
    assert_eq!(update.stage, PipelineStage::PosttestPending);
    assert!(!update.progress.is_completed());

    // Posttest: the quota fills exactly from the bank.
    let attempt = app.compose().compose(student, POSTTEST).await.unwrap();
    assert_eq!(attempt.questions.len(), 6);
    assert!(!attempt.is_underfilled());
    assert_eq!(attempt.realized_counts, attempt.requested_counts.unwrap());

    let failed = app
        .submissions()
        .submit_assessment(
            student,
            attempt.assessment_id,
            Submission::for_attempt(attempt.attempt_id, wrong_answers(&attempt)),
        )
        .await
        .unwrap();
    assert!(!failed.passed);
    assert_eq!(failed.score, 0);
    let update = failed.progress.expect("posttest updates progress");
    assert_eq!(update.stage, PipelineStage::PosttestPending);

    let retry = app.compose().compose(student, POSTTEST).await.unwrap();
    assert_ne!(retry.attempt_id, attempt.attempt_id);
    let answers = correct_answers(&retry);
    let passed = app
        .submissions()
        .submit_assessment(
            student,
            retry.assessment_id,
            Submission::for_attempt(retry.attempt_id, answers),
        )
        .await
        .unwrap();
    assert!(passed.passed);
    assert_eq!(passed.score, passed.total_points);
    assert!(passed.questions.iter().all(|q| q.is_correct));
    // Answers are revealed once graded because the policy allows it.
    for graded in &passed.questions {
        let revealed = match graded.question.kind {
            QuestionType::Matching => graded
                .question
                .matching_pairs
                .iter()
                .all(|p| p.right.is_some()),
            _ => graded.question.correct_answer.is_some(),
        };
        assert!(revealed, "question {} not revealed", graded.question.id);
    }
    let update = passed.progress.expect("posttest updates progress");
    assert!(update.newly_completed);
    assert_eq!(update.stage, PipelineStage::Completed);

    // A later failing posttest never un-completes the chapter.
    let third = app.compose().compose(student, POSTTEST).await.unwrap();
    let receipt = app
        .submissions()
        .submit_assessment(
            student,
            third.assessment_id,
            Submission::for_attempt(third.attempt_id, wrong_answers(&third)),
        )
        .await
        .unwrap();
    let update = receipt.progress.unwrap();
    assert!(update.progress.is_completed());
    assert_eq!(update.progress.posttest().attempts, 3);
    assert_eq!(update.stage, PipelineStage::Completed);
}

#[tokio::test]
async fn my_progress_reflects_enrollment_and_orphans() {
    let app = services(Storage::in_memory()).await;
    let student = StudentId::new(2);
    let enrollments = app.enrollments();

    enrollments.enroll(student, DEMO_SUBJECT).await.unwrap();
    let dup = enrollments.enroll(student, DEMO_SUBJECT).await.unwrap_err();
    assert_eq!(dup.kind(), ErrorKind::Conflict);

    let progress = app.progress();
    progress.record_video(student, ChapterId::new(1), 100).await.unwrap();
    progress.record_video(student, ChapterId::new(2), 92).await.unwrap();
    progress.complete_video(student, ChapterId::new(3)).await.unwrap();

    let view = enrollments.my_progress(student).await.unwrap();
    assert_eq!(view.subjects.len(), 1);
    let subject = &view.subjects[0];
    assert!(subject.is_enrolled);
    assert_eq!(subject.rollup.total_chapters, 3);
    assert_eq!(subject.rollup.completed_chapters, 1);
    // 92% counts as watched for the student but not for the teacher.
    assert_eq!(subject.rollup.video_watched_chapters, 3);
    assert_eq!(subject.rollup.subject_progress, 97);
    assert!(!subject.rollup.can_take_final_exam);
    let final_exam = subject.final_exam.as_ref().expect("demo has a final exam");
    assert!(!final_exam.gate.can_view);

    let report = enrollments.subject_report(DEMO_SUBJECT).await.unwrap();
    assert_eq!(report.students.len(), 1);
    assert_eq!(report.students[0].rollup.video_watched_chapters, 2);

    enrollments.unenroll(student, DEMO_SUBJECT).await.unwrap();
    let view = enrollments.my_progress(student).await.unwrap();
    assert_eq!(view.subjects.len(), 1);
    assert!(!view.subjects[0].is_enrolled);
    assert_eq!(view.subjects[0].rollup.completed_chapters, 1);
    assert!(
        enrollments
            .subject_report(DEMO_SUBJECT)
            .await
            .unwrap()
            .students
            .is_empty()
    );
}

#[tokio::test]
async fn unknown_references_are_not_found() {
    let app = services(Storage::in_memory()).await;
    let err = app
        .compose()
        .compose(DEMO_STUDENT, AssessmentId::new(999))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = app.compose().pretest(ChapterId::new(2)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = app
        .enrollments()
        .enroll(DEMO_STUDENT, SubjectId::new(77))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn posttest_is_graded_against_its_attempt_only() {
    let app = services(Storage::in_memory()).await;
    let student = StudentId::new(3);
    app.progress().complete_video(student, MATTER).await.unwrap();

    // One correct answer without an attempt must not pass the chapter.
    let attempt = app.compose().compose(student, POSTTEST).await.unwrap();
    let mut one = correct_answers(&attempt);
    let first = attempt.questions[0].id;
    one.retain(|id, _| *id == first);
    let err = app
        .submissions()
        .submit_assessment(
            student,
            POSTTEST,
            Submission {
                answers: one.clone(),
                ..Submission::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPolicy);
    let record = app.progress().get_progress(student, MATTER).await.unwrap();
    assert_eq!(record.posttest().attempts, 0);
    assert_eq!(
        app.progress().stage(student, MATTER).await.unwrap(),
        PipelineStage::PosttestPending
    );

    // With the attempt, unanswered questions count against the student.
    let receipt = app
        .submissions()
        .submit_assessment(
            student,
            POSTTEST,
            Submission::for_attempt(attempt.attempt_id, one.clone()),
        )
        .await
        .unwrap();
    assert_eq!(receipt.total_points, attempt.total_points);
    assert_eq!(receipt.questions.len(), attempt.questions.len());
    assert!(!receipt.passed);

    let err = app
        .submissions()
        .submit_assessment(
            student,
            POSTTEST,
            Submission::for_attempt(attempt.attempt_id, correct_answers(&attempt)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let record = app.progress().get_progress(student, MATTER).await.unwrap();
    assert_eq!(record.posttest().attempts, 1);
    assert!(!record.is_completed());
}

#[tokio::test]
async fn posttest_retakes_are_not_capped() {
    let app = services(Storage::in_memory()).await;
    let student = StudentId::new(4);
    app.progress().complete_video(student, MATTER).await.unwrap();

    // Past the policy's attempt limit, which only gates final exams.
    for _ in 0..4 {
        let attempt = app.compose().compose(student, POSTTEST).await.unwrap();
        app.submissions()
            .submit_assessment(
                student,
                POSTTEST,
                Submission::for_attempt(attempt.attempt_id, wrong_answers(&attempt)),
            )
            .await
            .unwrap();
    }
    let attempt = app.compose().compose(student, POSTTEST).await.unwrap();
    let receipt = app
        .submissions()
        .submit_assessment(
            student,
            POSTTEST,
            Submission::for_attempt(attempt.attempt_id, correct_answers(&attempt)),
        )
        .await
        .unwrap();
    let update = receipt.progress.unwrap();
    assert!(update.newly_completed);
    assert_eq!(update.progress.posttest().attempts, 5);
}
