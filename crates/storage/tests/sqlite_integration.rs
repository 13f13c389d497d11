use chrono::Duration;
use course_core::model::{
    Answer, AnswerRecord, AssessmentId, AttemptRecord, BankId, ChapterId, Enrollment,
    NewTestResult, ProgressRecord, QuestionId, StudentId, SubjectId, TestOutcome, TestRef,
    TestResult, TestType,
};
use course_core::time::fixed_now;
use storage::demo::{self, DEMO_FINAL_EXAM, DEMO_SUBJECT};
use storage::repository::{
    AssessmentRepository, AttemptRepository, CourseRepository, EnrollmentRepository,
    ProgressRepository, QuestionBankRepository, Storage, StorageError, TestResultRepository,
};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn progress_merge_is_field_level_and_monotonic() {
    let repo = repo("memdb_progress").await;
    let (student, chapter, subject) = (StudentId::new(7), ChapterId::new(1), SubjectId::new(1));
    let now = fixed_now();

    let zero = ProgressRecord::new(student, chapter, subject);
    let merged = repo
        .merge_progress(student, chapter, subject, &zero.video_heartbeat(60, true, now))
        .await
        .unwrap();
    assert_eq!(merged.video_progress(), 60);

    // A stale heartbeat built from the zero record must not move progress back
    // or clobber the document flag written in between.
    repo.merge_progress(student, chapter, subject, &zero.document_opened(now))
        .await
        .unwrap();
    let stale = zero.video_heartbeat(30, true, now + Duration::seconds(5));
    let merged = repo
        .merge_progress(student, chapter, subject, &stale)
        .await
        .unwrap();
    assert_eq!(merged.video_progress(), 60);
    assert!(merged.document_viewed());

    let stored = repo.get_progress(student, chapter).await.unwrap().unwrap();
    assert_eq!(stored, merged);
}

#[tokio::test]
async fn completion_survives_later_failing_posttest() {
    let repo = repo("memdb_completion").await;
    let (student, chapter, subject) = (StudentId::new(1), ChapterId::new(2), SubjectId::new(1));
    let now = fixed_now();

    let mut rec = ProgressRecord::new(student, chapter, subject);
    let patch = rec.video_completed(true, now);
    rec.apply(patch.clone());
    repo.merge_progress(student, chapter, subject, &patch).await.unwrap();

    let pass = TestOutcome {
        score: 8,
        percentage: 80,
        passed: true,
    };
    let patch = rec.posttest_submitted(pass, now);
    assert!(patch.completes());
    rec.apply(patch.clone());
    let merged = repo
        .merge_progress(student, chapter, subject, &patch)
        .await
        .unwrap();
    assert!(merged.is_completed());
    assert_eq!(merged.completed_at(), Some(now));

    let fail = TestOutcome {
        score: 1,
        percentage: 10,
        passed: false,
    };
    let later = now + Duration::minutes(10);
    let merged = repo
        .merge_progress(student, chapter, subject, &rec.posttest_submitted(fail, later))
        .await
        .unwrap();
    assert!(merged.is_completed());
    assert_eq!(merged.completed_at(), Some(now));
    assert_eq!(merged.posttest().attempts, 2);
    assert!(!merged.posttest().passed);
}

#[tokio::test]
async fn demo_course_round_trips_and_protects_banks() {
    let repo = repo("memdb_demo").await;
    let storage = Storage::sqlite("sqlite:file:memdb_demo?mode=memory&cache=shared")
        .await
        .expect("storage");
    let course = demo::seed(&storage, fixed_now()).await.unwrap();

    let chapters = repo.chapters_for_subject(DEMO_SUBJECT).await.unwrap();
    assert_eq!(chapters, course.chapters);

    let bank = repo.get_bank(BankId::new(1)).await.unwrap().unwrap();
    assert_eq!(bank, course.banks[1]);

    let final_exam = repo
        .final_exam_for_subject(DEMO_SUBJECT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(final_exam.id(), DEMO_FINAL_EXAM);

    // Referenced by a posttest and by the final exam.
    assert!(matches!(
        repo.delete_bank(BankId::new(2)).await,
        Err(StorageError::Conflict(_))
    ));
    // Referenced as the first chapter's pretest.
    assert!(matches!(
        repo.delete_bank(BankId::new(100)).await,
        Err(StorageError::Conflict(_))
    ));
    assert!(matches!(
        repo.delete_bank(BankId::new(999)).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn enrollment_is_unique_per_pair() {
    let repo = repo("memdb_enroll").await;
    let first = Enrollment::new(StudentId::new(1), SubjectId::new(1), fixed_now());
    let second = Enrollment::new(
        StudentId::new(1),
        SubjectId::new(2),
        fixed_now() + Duration::minutes(1),
    );
    repo.enroll(&first).await.unwrap();
    repo.enroll(&second).await.unwrap();
    assert!(matches!(
        repo.enroll(&first).await,
        Err(StorageError::Conflict(_))
    ));

    let listed = repo.enrollments_for_student(StudentId::new(1)).await.unwrap();
    assert_eq!(listed, vec![first.clone(), second]);

    repo.unenroll(StudentId::new(1), SubjectId::new(2)).await.unwrap();
    assert!(matches!(
        repo.unenroll(StudentId::new(1), SubjectId::new(2)).await,
        Err(StorageError::NotFound)
    ));
    assert_eq!(
        repo.enrollments_for_subject(SubjectId::new(1)).await.unwrap(),
        vec![first]
    );
}

#[tokio::test]
async fn results_and_attempts_round_trip() {
    let repo = repo("memdb_results").await;
    let test = TestRef::Assessment(AssessmentId::new(201));

    let attempt = AttemptRecord::new(
        StudentId::new(3),
        AssessmentId::new(201),
        vec![QuestionId::new(101), QuestionId::new(106)],
        4,
        fixed_now(),
        15,
    );
    repo.insert_attempt(&attempt).await.unwrap();
    assert!(matches!(
        repo.insert_attempt(&attempt).await,
        Err(StorageError::Conflict(_))
    ));
    assert_eq!(repo.get_attempt(attempt.id()).await.unwrap(), Some(attempt));

    let result = |minutes: i64, score: u32| {
        TestResult::new(NewTestResult {
            student_id: StudentId::new(3),
            test_type: TestType::Posttest,
            test_ref: test,
            subject_id: SubjectId::new(1),
            chapter_id: Some(ChapterId::new(1)),
            score,
            total_points: 4,
            passing_score: 60,
            answers: vec![AnswerRecord {
                question_index: 0,
                question_id: QuestionId::new(106),
                question_text: "Match".into(),
                user_answer: Some(Answer::Matches(vec!["a".into(), "b".into()])),
                correct_answer: Some(Answer::Matches(vec!["a".into(), "b".into()])),
                is_correct: true,
                points: score,
            }],
            submitted_at: fixed_now() + Duration::minutes(minutes),
            duration_secs: 300,
        })
        .unwrap()
    };
    let later = result(20, 4);
    let earlier = result(5, 1);
    repo.append_result(&later).await.unwrap();
    repo.append_result(&earlier).await.unwrap();

    let stored = repo.results_for(StudentId::new(3), test).await.unwrap();
    assert_eq!(stored, vec![earlier, later]);
    assert!(
        repo.results_for(StudentId::new(3), TestRef::Bank(BankId::new(201)))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn attempt_is_graded_once() {
    let repo = repo("memdb_attempt_once").await;
    repo.migrate().await.expect("migrations are idempotent");

    let attempt = AttemptRecord::new(
        StudentId::new(4),
        AssessmentId::new(201),
        vec![QuestionId::new(101)],
        1,
        fixed_now(),
        15,
    );
    repo.insert_attempt(&attempt).await.unwrap();
    let at = fixed_now() + Duration::minutes(3);
    repo.mark_attempt_submitted(attempt.id(), at).await.unwrap();

    assert!(matches!(
        repo.mark_attempt_submitted(attempt.id(), at).await,
        Err(StorageError::Conflict(_))
    ));
    assert!(matches!(
        repo.mark_attempt_submitted(uuid::Uuid::new_v4(), at).await,
        Err(StorageError::NotFound)
    ));
    let stored = repo.get_attempt(attempt.id()).await.unwrap().unwrap();
    assert_eq!(stored.submitted_at(), Some(at));
}
