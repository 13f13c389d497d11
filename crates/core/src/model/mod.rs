mod assessment;
mod attempt;
mod course;
mod enrollment;
mod ids;
mod progress;
mod question;
mod question_bank;
mod test_result;

pub use ids::{AssessmentId, BankId, ChapterId, ParseIdError, QuestionId, StudentId, SubjectId};

pub use assessment::{
    AssessmentDefinition, AssessmentDocument, AssessmentError, AssessmentKind, CompositionPolicy,
    PresentationPolicy, QuotaRequest, TypeCounts,
};
pub use attempt::AttemptRecord;
pub use course::{Chapter, Subject};
pub use enrollment::Enrollment;
pub use progress::{
    ProgressError, ProgressPatch, ProgressRecord, ProgressSnapshot, TestOutcome, TestProgress,
    VIDEO_COMPLETE_PERCENT,
};
pub use question::{MatchingPair, Question, QuestionDraft, QuestionError, QuestionType};
pub use question_bank::{BankDocument, BankError, QuestionBank};
pub use test_result::{
    Answer, AnswerRecord, NewTestResult, ResultError, TestRef, TestResult, TestType, latest,
    percentage,
};
