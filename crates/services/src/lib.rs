#![forbid(unsafe_code)]

pub mod app_services;
pub mod compose_service;
pub mod config;
pub mod enrollment_service;
pub mod error;
pub mod final_exam_service;
pub mod locks;
pub mod progress_service;
pub mod submission_service;

pub use course_core::Clock;

pub use app_services::AppServices;
pub use compose_service::{ComposeService, ComposedAttempt, PretestPaper};
pub use config::EngineConfig;
pub use enrollment_service::{
    EnrollmentService, FinalExamSummary, MyProgress, StudentReport, SubjectProgress, SubjectReport,
};
pub use error::{
    AppServicesError, ComposeServiceError, EnrollmentServiceError, ErrorKind, FinalExamError,
    ForbiddenReason, ProgressServiceError, SubmissionError,
};
pub use final_exam_service::{FinalExamService, FinalExamStatus};
pub use progress_service::{ProgressService, ProgressUpdate};
pub use submission_service::{GradedQuestion, Submission, SubmissionReceipt, SubmissionService};
