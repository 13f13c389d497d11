use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use course_core::model::{
    Chapter, ChapterId, ProgressPatch, ProgressRecord, StudentId, SubjectId, TestOutcome,
};
use course_core::rollup::{SubjectRollup, rollup_subject};
use course_core::stage::{self, ChapterTests, PipelineStage};
use storage::repository::{CourseRepository, ProgressRepository};

use crate::Clock;
use crate::config::EngineConfig;
use crate::error::ProgressServiceError;
use crate::locks::ProgressLocks;

/// A progress record after an event, with the stage derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub progress: ProgressRecord,
    pub stage: PipelineStage,
    /// True only for the event that completed the chapter.
    pub newly_completed: bool,
}

/// Applies learning events to per-chapter progress.
///
/// Every write is a field-level merge. Inside one process, writes to the
/// same (student, chapter) pair are also serialized unless the lock is
/// switched off in `EngineConfig`.
pub struct ProgressService {
    clock: Clock,
    config: EngineConfig,
    courses: Arc<dyn CourseRepository>,
    progress: Arc<dyn ProgressRepository>,
    locks: ProgressLocks,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: EngineConfig,
        courses: Arc<dyn CourseRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            config,
            courses,
            progress,
            locks: ProgressLocks::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn chapter(&self, id: ChapterId) -> Result<Chapter, ProgressServiceError> {
        self.courses
            .get_chapter(id)
            .await?
            .ok_or(ProgressServiceError::ChapterNotFound(id))
    }

    /// The stored record, or the default-zero record when nothing was
    /// recorded yet.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::ChapterNotFound` for an unknown chapter.
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn get_progress(
        &self,
        student: StudentId,
        chapter: ChapterId,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let chapter = self.chapter(chapter).await?;
        Ok(self.load_or_default(student, &chapter).await?)
    }

    /// Where the student stands in the chapter pipeline.
    ///
    /// # Errors
    ///
    /// Same as `get_progress`.
    pub async fn stage(
        &self,
        student: StudentId,
        chapter: ChapterId,
    ) -> Result<PipelineStage, ProgressServiceError> {
        let chapter = self.chapter(chapter).await?;
        let record = self.progress.get_progress(student, chapter.id).await?;
        Ok(stage::resolve_or_default(
            record.as_ref(),
            ChapterTests::of(&chapter),
        ))
    }

    /// Video heartbeat with the furthest percentage reached.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError` if the chapter is unknown or the write fails.
    pub async fn record_video(
        &self,
        student: StudentId,
        chapter: ChapterId,
        percent: u8,
    ) -> Result<ProgressUpdate, ProgressServiceError> {
        self.update(student, chapter, |record, chapter, now| {
            record.video_heartbeat(percent, chapter.has_posttest(), now)
        })
        .await
    }

    /// Explicit end-of-video event.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError` if the chapter is unknown or the write fails.
    pub async fn complete_video(
        &self,
        student: StudentId,
        chapter: ChapterId,
    ) -> Result<ProgressUpdate, ProgressServiceError> {
        self.update(student, chapter, |record, chapter, now| {
            record.video_completed(chapter.has_posttest(), now)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError` if the chapter is unknown or the write fails.
    pub async fn record_document_view(
        &self,
        student: StudentId,
        chapter: ChapterId,
    ) -> Result<ProgressUpdate, ProgressServiceError> {
        self.update(student, chapter, |record, _, now| record.document_opened(now))
            .await
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError` if the chapter is unknown or the write fails.
    pub async fn record_pretest(
        &self,
        student: StudentId,
        chapter: ChapterId,
        outcome: TestOutcome,
    ) -> Result<ProgressUpdate, ProgressServiceError> {
        self.update(student, chapter, |record, _, now| {
            record.pretest_submitted(outcome, now)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError` if the chapter is unknown or the write fails.
    pub async fn record_posttest(
        &self,
        student: StudentId,
        chapter: ChapterId,
        outcome: TestOutcome,
    ) -> Result<ProgressUpdate, ProgressServiceError> {
        self.update(student, chapter, |record, _, now| {
            record.posttest_submitted(outcome, now)
        })
        .await
    }

    /// One subject folded for one student at the given video threshold.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn subject_rollup(
        &self,
        student: StudentId,
        subject: SubjectId,
        video_threshold: u8,
    ) -> Result<SubjectRollup, ProgressServiceError> {
        let chapters = self.courses.chapters_for_subject(subject).await?;
        let records: Vec<ProgressRecord> = self
            .progress
            .progress_for_student(student)
            .await?
            .into_iter()
            .filter(|r| r.subject_id() == subject)
            .collect();
        debug!(
            student = %student,
            subject = %subject,
            chapters = chapters.len(),
            records = records.len(),
            "rolling up subject"
        );
        Ok(rollup_subject(subject, &chapters, &records, video_threshold))
    }

    async fn load_or_default(
        &self,
        student: StudentId,
        chapter: &Chapter,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        Ok(self
            .progress
            .get_progress(student, chapter.id)
            .await?
            .unwrap_or_else(|| ProgressRecord::new(student, chapter.id, chapter.subject_id)))
    }

    async fn update(
        &self,
        student: StudentId,
        chapter: ChapterId,
        event: impl FnOnce(&ProgressRecord, &Chapter, DateTime<Utc>) -> ProgressPatch,
    ) -> Result<ProgressUpdate, ProgressServiceError> {
        let _guard = if self.config.progress_lock {
            Some(self.locks.acquire(student, chapter).await)
        } else {
            None
        };

        let chapter = self.chapter(chapter).await?;
        let tests = ChapterTests::of(&chapter);
        let current = self.load_or_default(student, &chapter).await?;
        let patch = event(&current, &chapter, self.clock.now());

        if patch.is_noop() {
            debug!(student = %student, chapter = %chapter.id, "progress event changed nothing");
            return Ok(ProgressUpdate {
                stage: stage::resolve(&current, tests),
                progress: current,
                newly_completed: false,
            });
        }

        let was_completed = current.is_completed();
        let merged = self
            .progress
            .merge_progress(student, chapter.id, chapter.subject_id, &patch)
            .await?;
        let newly_completed = !was_completed && merged.is_completed();
        if newly_completed {
            info!(student = %student, chapter = %chapter.id, "chapter completed");
        }

        Ok(ProgressUpdate {
            stage: stage::resolve(&merged, tests),
            progress: merged,
            newly_completed,
        })
    }
}
