//! Access rules for a subject's final exam.

use serde::Serialize;
use thiserror::Error;

use crate::model::{PresentationPolicy, TestResult, latest};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateError {
    #[error("learn all chapters first")]
    NotEligible,

    #[error("no more retakes ({attempts} of {max} attempts used)")]
    AttemptsExhausted { attempts: u32, max: u32 },
}

/// Gate state as shown to the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    pub can_view: bool,
    pub can_submit: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub attempts_remaining: u32,
    pub last_passed: Option<bool>,
    pub retake_offered: bool,
}

/// # Errors
///
/// `GateError::NotEligible` unless every chapter of the subject is completed.
pub fn check_view(can_take_final_exam: bool) -> Result<(), GateError> {
    if can_take_final_exam {
        Ok(())
    } else {
        Err(GateError::NotEligible)
    }
}

/// Submission is allowed while attempts remain, or when the latest attempt
/// already passed.
///
/// # Errors
///
/// `GateError::AttemptsExhausted` otherwise.
pub fn check_submit(
    presentation: &PresentationPolicy,
    results: &[TestResult],
) -> Result<(), GateError> {
    let attempts = attempt_count(results);
    let max = presentation.effective_max_attempts();
    let latest_passed = latest(results).is_some_and(TestResult::passed);
    if attempts < max || latest_passed {
        Ok(())
    } else {
        Err(GateError::AttemptsExhausted { attempts, max })
    }
}

/// Combines both checks into a status without failing.
#[must_use]
pub fn status(
    can_take_final_exam: bool,
    presentation: &PresentationPolicy,
    results: &[TestResult],
) -> GateStatus {
    let attempts = attempt_count(results);
    let max_attempts = presentation.effective_max_attempts();
    let last_passed = latest(results).map(TestResult::passed);
    let attempts_remaining = max_attempts.saturating_sub(attempts);
    let can_view = check_view(can_take_final_exam).is_ok();

    GateStatus {
        can_view,
        can_submit: can_view && check_submit(presentation, results).is_ok(),
        attempts,
        max_attempts,
        attempts_remaining,
        last_passed,
        retake_offered: can_view && last_passed == Some(false) && attempts_remaining > 0,
    }
}

fn attempt_count(results: &[TestResult]) -> u32 {
    u32::try_from(results.len()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AssessmentId, NewTestResult, StudentId, SubjectId, TestRef, TestType,
    };
    use crate::time::fixed_now;
    use chrono::Duration;

    fn result(minutes_after: i64, score: u32) -> TestResult {
        TestResult::new(NewTestResult {
            student_id: StudentId::new(1),
            test_type: TestType::Final,
            test_ref: TestRef::Assessment(AssessmentId::new(9)),
            subject_id: SubjectId::new(1),
            chapter_id: None,
            score,
            total_points: 10,
            passing_score: 60,
            answers: Vec::new(),
            submitted_at: fixed_now() + Duration::minutes(minutes_after),
            duration_secs: 120,
        })
        .unwrap()
    }

    #[test]
    fn view_requires_all_chapters() {
        assert_eq!(check_view(false), Err(GateError::NotEligible));
        assert!(check_view(true).is_ok());
    }

    #[test]
    fn attempts_exhausted_after_max_failures() {
        let policy = PresentationPolicy {
            max_attempts: 2,
            ..PresentationPolicy::default()
        };
        let one = vec![result(0, 2)];
        assert!(check_submit(&policy, &one).is_ok());

        let two = vec![result(0, 2), result(10, 3)];
        assert_eq!(
            check_submit(&policy, &two),
            Err(GateError::AttemptsExhausted { attempts: 2, max: 2 })
        );
    }

    #[test]
    fn passed_latest_attempt_keeps_submission_open() {
        let policy = PresentationPolicy {
            max_attempts: 1,
            ..PresentationPolicy::default()
        };
        let passed = vec![result(0, 9)];
        assert!(check_submit(&policy, &passed).is_ok());
    }

    #[test]
    fn no_retake_means_single_attempt() {
        let policy = PresentationPolicy {
            allow_retake: false,
            max_attempts: 5,
            ..PresentationPolicy::default()
        };
        let failed = vec![result(0, 1)];
        assert_eq!(
            check_submit(&policy, &failed),
            Err(GateError::AttemptsExhausted { attempts: 1, max: 1 })
        );
    }

    #[test]
    fn status_reports_remaining_and_retake() {
        let policy = PresentationPolicy::default();
        let s = status(true, &policy, &[result(0, 2)]);
        assert!(s.can_view);
        assert!(s.can_submit);
        assert_eq!(s.attempts_remaining, 2);
        assert_eq!(s.last_passed, Some(false));
        assert!(s.retake_offered);

        let blocked = status(false, &policy, &[]);
        assert!(!blocked.can_view);
        assert!(!blocked.can_submit);
        assert!(!blocked.retake_offered);
    }
}
