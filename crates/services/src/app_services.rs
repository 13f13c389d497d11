use std::sync::Arc;

use course_core::grading::{AnswerComparator, ExactMatchComparator};
use storage::repository::Storage;

use crate::Clock;
use crate::compose_service::ComposeService;
use crate::config::EngineConfig;
use crate::enrollment_service::EnrollmentService;
use crate::error::AppServicesError;
use crate::final_exam_service::FinalExamService;
use crate::progress_service::ProgressService;
use crate::submission_service::SubmissionService;

/// Assembles the engine's services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    progress: Arc<ProgressService>,
    compose: Arc<ComposeService>,
    submissions: Arc<SubmissionService>,
    enrollments: Arc<EnrollmentService>,
    final_exams: Arc<FinalExamService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(storage, clock, config))
    }

    /// Build services backed by in-memory repositories.
    #[must_use]
    pub fn in_memory(clock: Clock, config: EngineConfig) -> Self {
        Self::new(Storage::in_memory(), clock, config)
    }

    #[must_use]
    pub fn new(storage: Storage, clock: Clock, config: EngineConfig) -> Self {
        Self::with_comparator(storage, clock, config, Arc::new(ExactMatchComparator))
    }

    /// Like `new` with a custom answer comparator.
    #[must_use]
    pub fn with_comparator(
        storage: Storage,
        clock: Clock,
        config: EngineConfig,
        comparator: Arc<dyn AnswerComparator>,
    ) -> Self {
        let progress = Arc::new(ProgressService::new(
            clock,
            config.clone(),
            Arc::clone(&storage.courses),
            Arc::clone(&storage.progress),
        ));
        let compose = Arc::new(ComposeService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.banks),
            Arc::clone(&storage.assessments),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.results),
            Arc::clone(&progress),
        ));
        let submissions = Arc::new(SubmissionService::new(
            clock,
            config.clone(),
            comparator,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.banks),
            Arc::clone(&storage.assessments),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.results),
            Arc::clone(&progress),
        ));
        let enrollments = Arc::new(EnrollmentService::new(
            clock,
            config,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.assessments),
            Arc::clone(&storage.results),
        ));
        let final_exams = Arc::new(FinalExamService::new(
            Arc::clone(&storage.assessments),
            Arc::clone(&storage.results),
            Arc::clone(&progress),
            Arc::clone(&compose),
            Arc::clone(&submissions),
        ));

        Self {
            storage,
            progress,
            compose,
            submissions,
            enrollments,
            final_exams,
        }
    }

    /// The repositories the services were built on.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn compose(&self) -> Arc<ComposeService> {
        Arc::clone(&self.compose)
    }

    #[must_use]
    pub fn submissions(&self) -> Arc<SubmissionService> {
        Arc::clone(&self.submissions)
    }

    #[must_use]
    pub fn enrollments(&self) -> Arc<EnrollmentService> {
        Arc::clone(&self.enrollments)
    }

    #[must_use]
    pub fn final_exams(&self) -> Arc<FinalExamService> {
        Arc::clone(&self.final_exams)
    }
}
