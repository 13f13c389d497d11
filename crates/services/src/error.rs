//! Shared error types for the services crate.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use course_core::composer::ComposeError;
use course_core::exam_gate::GateError;
use course_core::model::{AssessmentId, ChapterId, ResultError, SubjectId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Why a request was refused although everything it names exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    NotEligible,
    AttemptsExhausted,
    DeadlineExceeded,
    NotAttemptOwner,
}

/// Coarse classification callers map onto their own transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidPolicy,
    Conflict,
    Forbidden(ForbiddenReason),
    Internal,
}

fn storage_kind(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::NotFound => ErrorKind::NotFound,
        StorageError::Conflict(_) => ErrorKind::Conflict,
        _ => ErrorKind::Internal,
    }
}

fn compose_kind(err: &ComposeError) -> ErrorKind {
    match err {
        ComposeError::BankNotFound(_) => ErrorKind::NotFound,
        _ => ErrorKind::InvalidPolicy,
    }
}

fn gate_kind(err: &GateError) -> ErrorKind {
    match err {
        GateError::NotEligible => ErrorKind::Forbidden(ForbiddenReason::NotEligible),
        _ => ErrorKind::Forbidden(ForbiddenReason::AttemptsExhausted),
    }
}

/// Errors emitted by `ComposeService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComposeServiceError {
    #[error("assessment {0} not found")]
    AssessmentNotFound(AssessmentId),
    #[error("chapter {0} not found")]
    ChapterNotFound(ChapterId),
    #[error("chapter {0} has no pretest")]
    NoPretest(ChapterId),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Progress(#[from] ProgressServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ComposeServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AssessmentNotFound(_) | Self::ChapterNotFound(_) | Self::NoPretest(_) => {
                ErrorKind::NotFound
            }
            Self::Compose(e) => compose_kind(e),
            Self::Gate(e) => gate_kind(e),
            Self::Progress(e) => e.kind(),
            Self::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("chapter {0} not found")]
    ChapterNotFound(ChapterId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ChapterNotFound(_) => ErrorKind::NotFound,
            Self::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `SubmissionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error("attempt {0} not found")]
    AttemptNotFound(Uuid),
    #[error("attempt {0} belongs to another student")]
    NotAttemptOwner(Uuid),
    #[error("attempt {0} was already submitted")]
    AlreadySubmitted(Uuid),
    #[error("assessment {0} needs the attempt that served its questions")]
    AttemptRequired(AssessmentId),
    #[error("attempt {attempt} ran past its deadline {deadline}")]
    DeadlineExceeded {
        attempt: Uuid,
        deadline: DateTime<Utc>,
    },
    #[error("assessment {0} not found")]
    AssessmentNotFound(AssessmentId),
    #[error("chapter {0} not found")]
    ChapterNotFound(ChapterId),
    #[error("chapter {0} has no pretest")]
    NoPretest(ChapterId),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Progress(#[from] ProgressServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SubmissionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AttemptNotFound(_)
            | Self::AssessmentNotFound(_)
            | Self::ChapterNotFound(_)
            | Self::NoPretest(_) => ErrorKind::NotFound,
            Self::NotAttemptOwner(_) => ErrorKind::Forbidden(ForbiddenReason::NotAttemptOwner),
            Self::AlreadySubmitted(_) => ErrorKind::Conflict,
            Self::AttemptRequired(_) => ErrorKind::InvalidPolicy,
            Self::DeadlineExceeded { .. } => {
                ErrorKind::Forbidden(ForbiddenReason::DeadlineExceeded)
            }
            Self::Compose(e) => compose_kind(e),
            Self::Gate(e) => gate_kind(e),
            Self::Result(_) => ErrorKind::Internal,
            Self::Progress(e) => e.kind(),
            Self::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `EnrollmentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnrollmentServiceError {
    #[error("subject {0} not found")]
    SubjectNotFound(SubjectId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EnrollmentServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SubjectNotFound(_) => ErrorKind::NotFound,
            Self::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `FinalExamService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FinalExamError {
    #[error("subject {0} has no final exam")]
    NoFinalExam(SubjectId),
    #[error(transparent)]
    Compose(#[from] ComposeServiceError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Progress(#[from] ProgressServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl FinalExamError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoFinalExam(_) => ErrorKind::NotFound,
            Self::Compose(e) => e.kind(),
            Self::Submission(e) => e.kind(),
            Self::Progress(e) => e.kind(),
            Self::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
