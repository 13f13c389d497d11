use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use course_core::exam_gate::{self, GateStatus};
use course_core::model::{
    AssessmentId, Enrollment, ProgressRecord, StudentId, Subject, SubjectId, TestRef,
};
use course_core::rollup::{SubjectRollup, reconcile_subjects, rollup_subject};
use storage::repository::{
    AssessmentRepository, CourseRepository, EnrollmentRepository, ProgressRepository,
    TestResultRepository,
};

use crate::Clock;
use crate::config::EngineConfig;
use crate::error::EnrollmentServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalExamSummary {
    pub assessment_id: AssessmentId,
    #[serde(flatten)]
    pub gate: GateStatus,
}

/// One subject in a student's own progress view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    pub is_enrolled: bool,
    #[serde(flatten)]
    pub rollup: SubjectRollup,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_exam: Option<FinalExamSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyProgress {
    pub student_id: StudentId,
    pub subjects: Vec<SubjectProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student_id: StudentId,
    pub enrolled_at: DateTime<Utc>,
    #[serde(flatten)]
    pub rollup: SubjectRollup,
}

/// Class view of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReport {
    pub subject: Subject,
    pub students: Vec<StudentReport>,
}

/// Enrollment writes plus the subject-level views folded from progress.
pub struct EnrollmentService {
    clock: Clock,
    config: EngineConfig,
    courses: Arc<dyn CourseRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<dyn ProgressRepository>,
    assessments: Arc<dyn AssessmentRepository>,
    results: Arc<dyn TestResultRepository>,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: EngineConfig,
        courses: Arc<dyn CourseRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<dyn ProgressRepository>,
        assessments: Arc<dyn AssessmentRepository>,
        results: Arc<dyn TestResultRepository>,
    ) -> Self {
        Self {
            clock,
            config,
            courses,
            enrollments,
            progress,
            assessments,
            results,
        }
    }

    async fn subject(&self, id: SubjectId) -> Result<Subject, EnrollmentServiceError> {
        self.courses
            .get_subject(id)
            .await?
            .ok_or(EnrollmentServiceError::SubjectNotFound(id))
    }

    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::SubjectNotFound` for an unknown subject.
    /// Returns `StorageError::Conflict` (as `EnrollmentServiceError::Storage`)
    /// if the student is already enrolled.
    pub async fn enroll(
        &self,
        student: StudentId,
        subject: SubjectId,
    ) -> Result<Enrollment, EnrollmentServiceError> {
        self.subject(subject).await?;
        let enrollment = Enrollment::new(student, subject, self.clock.now());
        self.enrollments.enroll(&enrollment).await?;
        info!(student = %student, subject = %subject, "enrolled");
        Ok(enrollment)
    }

    /// Removes the enrollment. Progress already recorded is kept and keeps
    /// showing up in `my_progress` as not enrolled.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` (as `EnrollmentServiceError::Storage`)
    /// if there was no enrollment.
    pub async fn unenroll(
        &self,
        student: StudentId,
        subject: SubjectId,
    ) -> Result<(), EnrollmentServiceError> {
        self.enrollments.unenroll(student, subject).await?;
        info!(student = %student, subject = %subject, "unenrolled");
        Ok(())
    }

    /// Every subject the student is enrolled in or has progress in, folded at
    /// the student-facing video threshold.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::Storage` if repository access fails.
    pub async fn my_progress(
        &self,
        student: StudentId,
    ) -> Result<MyProgress, EnrollmentServiceError> {
        let enrolled: Vec<SubjectId> = self
            .enrollments
            .enrollments_for_student(student)
            .await?
            .into_iter()
            .map(|e| e.subject_id)
            .collect();
        let records = self.progress.progress_for_student(student).await?;
        let memberships = reconcile_subjects(&enrolled, &records);
        debug!(
            student = %student,
            enrolled = enrolled.len(),
            subjects = memberships.len(),
            "building progress view"
        );

        let mut subjects = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let subject_id = membership.subject_id;
            let chapters = self.courses.chapters_for_subject(subject_id).await?;
            let own: Vec<ProgressRecord> = records
                .iter()
                .filter(|r| r.subject_id() == subject_id)
                .cloned()
                .collect();
            let rollup = rollup_subject(
                subject_id,
                &chapters,
                &own,
                self.config.student_video_threshold,
            );
            let final_exam = self
                .final_exam_summary(student, subject_id, rollup.can_take_final_exam)
                .await?;
            subjects.push(SubjectProgress {
                subject: self.courses.get_subject(subject_id).await?,
                is_enrolled: membership.is_enrolled,
                rollup,
                final_exam,
            });
        }

        Ok(MyProgress {
            student_id: student,
            subjects,
        })
    }

    /// Every enrolled student of `subject`, folded at the teacher-facing
    /// video threshold.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::SubjectNotFound` for an unknown subject.
    /// Returns `EnrollmentServiceError::Storage` if repository access fails.
    pub async fn subject_report(
        &self,
        subject: SubjectId,
    ) -> Result<SubjectReport, EnrollmentServiceError> {
        let details = self.subject(subject).await?;
        let chapters = self.courses.chapters_for_subject(subject).await?;
        let enrollments = self.enrollments.enrollments_for_subject(subject).await?;

        let mut by_student: HashMap<StudentId, Vec<ProgressRecord>> = HashMap::new();
        for record in self.progress.progress_for_subject(subject).await? {
            by_student.entry(record.student_id()).or_default().push(record);
        }

        let students = enrollments
            .into_iter()
            .map(|enrollment| {
                let records = by_student
                    .remove(&enrollment.student_id)
                    .unwrap_or_default();
                StudentReport {
                    student_id: enrollment.student_id,
                    enrolled_at: enrollment.enrolled_at,
                    rollup: rollup_subject(
                        subject,
                        &chapters,
                        &records,
                        self.config.teacher_video_threshold,
                    ),
                }
            })
            .collect();

        Ok(SubjectReport {
            subject: details,
            students,
        })
    }

    async fn final_exam_summary(
        &self,
        student: StudentId,
        subject: SubjectId,
        can_take_final_exam: bool,
    ) -> Result<Option<FinalExamSummary>, EnrollmentServiceError> {
        let Some(definition) = self.assessments.final_exam_for_subject(subject).await? else {
            return Ok(None);
        };
        let results = self
            .results
            .results_for(student, TestRef::Assessment(definition.id()))
            .await?;
        Ok(Some(FinalExamSummary {
            assessment_id: definition.id(),
            gate: exam_gate::status(can_take_final_exam, definition.presentation(), &results),
        }))
    }
}
