use thiserror::Error;

use crate::composer::ComposeError;
use crate::exam_gate::GateError;
use crate::model::{
    AssessmentError, BankError, ProgressError, QuestionError, ResultError,
};

/// Any domain error, for callers that do not care which rule failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Bank(#[from] BankError),
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Gate(#[from] GateError),
}
