use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ChapterId, StudentId, SubjectId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("video progress must be within 0..=100, got {0}")]
    InvalidVideoProgress(u8),

    #[error("test percentage must be within 0..=100, got {0}")]
    InvalidPercentage(u8),

    #[error("completed record is missing its completion time")]
    MissingCompletedAt,
}

/// Percentage at which a heartbeat counts as the video-complete event.
pub const VIDEO_COMPLETE_PERCENT: u8 = 100;

//
// ─── TEST PROGRESS ─────────────────────────────────────────────────────────────
//

/// Pretest or posttest slice of a progress record. Score fields hold the most
/// recent attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestProgress {
    pub completed: bool,
    pub score: u32,
    pub percentage: u8,
    pub passed: bool,
    pub attempts: u32,
}

/// Graded outcome of one pretest or posttest submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestOutcome {
    pub score: u32,
    pub percentage: u8,
    pub passed: bool,
}

impl TestProgress {
    fn after(self, outcome: TestOutcome) -> Self {
        Self {
            completed: true,
            score: outcome.score,
            percentage: outcome.percentage.min(100),
            passed: outcome.passed,
            attempts: self.attempts.saturating_add(1),
        }
    }
}

//
// ─── PATCH ─────────────────────────────────────────────────────────────────────
//

/// Field-level change set produced by one progress event.
///
/// Stores apply it as an upsert that only touches the `Some` fields, so two
/// events on the same record only race on the fields they both write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressPatch {
    pub video_watched: Option<bool>,
    pub video_progress: Option<u8>,
    pub document_viewed: Option<bool>,
    pub pretest: Option<TestProgress>,
    pub posttest: Option<TestProgress>,
    /// `Some` marks the record completed at that instant.
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressPatch {
    #[must_use]
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            video_watched: None,
            video_progress: None,
            document_viewed: None,
            pretest: None,
            posttest: None,
            completed_at: None,
            updated_at: at,
        }
    }

    /// True when the patch would change nothing but the timestamp.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.video_watched.is_none()
            && self.video_progress.is_none()
            && self.document_viewed.is_none()
            && self.pretest.is_none()
            && self.posttest.is_none()
            && self.completed_at.is_none()
    }

    /// True when this patch carries the completion event.
    #[must_use]
    pub fn completes(&self) -> bool {
        self.completed_at.is_some()
    }
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

/// Storage-facing shape of a progress record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub student_id: StudentId,
    pub chapter_id: ChapterId,
    pub subject_id: SubjectId,
    pub video_watched: bool,
    pub video_progress: u8,
    pub document_viewed: bool,
    pub pretest: TestProgress,
    pub posttest: TestProgress,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Per (student, chapter) learning signals.
///
/// The pipeline stage is never stored here; see `crate::stage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    student_id: StudentId,
    chapter_id: ChapterId,
    subject_id: SubjectId,
    video_watched: bool,
    video_progress: u8,
    document_viewed: bool,
    pretest: TestProgress,
    posttest: TestProgress,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// The default-zero record used before any interaction with a chapter.
    #[must_use]
    pub fn new(student_id: StudentId, chapter_id: ChapterId, subject_id: SubjectId) -> Self {
        Self {
            student_id,
            chapter_id,
            subject_id,
            video_watched: false,
            video_progress: 0,
            document_viewed: false,
            pretest: TestProgress::default(),
            posttest: TestProgress::default(),
            is_completed: false,
            completed_at: None,
            updated_at: None,
        }
    }

    /// Rehydrate a record from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if percentages are out of range or a completed
    /// record has no completion time.
    pub fn from_snapshot(s: ProgressSnapshot) -> Result<Self, ProgressError> {
        if s.video_progress > 100 {
            return Err(ProgressError::InvalidVideoProgress(s.video_progress));
        }
        for test in [&s.pretest, &s.posttest] {
            if test.percentage > 100 {
                return Err(ProgressError::InvalidPercentage(test.percentage));
            }
        }
        if s.is_completed && s.completed_at.is_none() {
            return Err(ProgressError::MissingCompletedAt);
        }
        Ok(Self {
            student_id: s.student_id,
            chapter_id: s.chapter_id,
            subject_id: s.subject_id,
            video_watched: s.video_watched,
            video_progress: s.video_progress,
            document_viewed: s.document_viewed,
            pretest: s.pretest,
            posttest: s.posttest,
            is_completed: s.is_completed,
            completed_at: s.completed_at,
            updated_at: s.updated_at,
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            student_id: self.student_id,
            chapter_id: self.chapter_id,
            subject_id: self.subject_id,
            video_watched: self.video_watched,
            video_progress: self.video_progress,
            document_viewed: self.document_viewed,
            pretest: self.pretest,
            posttest: self.posttest,
            is_completed: self.is_completed,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
        }
    }

    // Accessors
    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn chapter_id(&self) -> ChapterId {
        self.chapter_id
    }

    #[must_use]
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    #[must_use]
    pub fn video_watched(&self) -> bool {
        self.video_watched
    }

    #[must_use]
    pub fn video_progress(&self) -> u8 {
        self.video_progress
    }

    #[must_use]
    pub fn document_viewed(&self) -> bool {
        self.document_viewed
    }

    #[must_use]
    pub fn pretest(&self) -> &TestProgress {
        &self.pretest
    }

    #[must_use]
    pub fn posttest(&self) -> &TestProgress {
        &self.posttest
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    //
    // ─── EVENTS ───────────────────────────────────────────────────────────
    //
    // Each event returns the patch it would write; `merge` applies it. The
    // methods never mutate `self` so callers can persist first.

    /// Video heartbeat. Progress never moves backwards; reaching
    /// `VIDEO_COMPLETE_PERCENT` is the video-complete event.
    #[must_use]
    pub fn video_heartbeat(
        &self,
        percent: u8,
        has_posttest: bool,
        now: DateTime<Utc>,
    ) -> ProgressPatch {
        let percent = percent.min(100);
        let mut patch = ProgressPatch::empty(now);
        if percent > self.video_progress {
            patch.video_progress = Some(percent);
        }
        if percent >= VIDEO_COMPLETE_PERCENT && !self.video_watched {
            patch.video_watched = Some(true);
        }
        self.complete_if_qualified(&mut patch, has_posttest);
        patch
    }

    /// Explicit video-complete event, independent of the reported percentage.
    #[must_use]
    pub fn video_completed(&self, has_posttest: bool, now: DateTime<Utc>) -> ProgressPatch {
        self.video_heartbeat(VIDEO_COMPLETE_PERCENT, has_posttest, now)
    }

    #[must_use]
    pub fn document_opened(&self, now: DateTime<Utc>) -> ProgressPatch {
        let mut patch = ProgressPatch::empty(now);
        if !self.document_viewed {
            patch.document_viewed = Some(true);
        }
        patch
    }

    #[must_use]
    pub fn pretest_submitted(&self, outcome: TestOutcome, now: DateTime<Utc>) -> ProgressPatch {
        let mut patch = ProgressPatch::empty(now);
        patch.pretest = Some(self.pretest.after(outcome));
        patch
    }

    /// Posttest submission. A pass is the completion event when the video has
    /// already been watched.
    #[must_use]
    pub fn posttest_submitted(&self, outcome: TestOutcome, now: DateTime<Utc>) -> ProgressPatch {
        let mut patch = ProgressPatch::empty(now);
        patch.posttest = Some(self.posttest.after(outcome));
        self.complete_if_qualified(&mut patch, true);
        patch
    }

    /// The only writer of `is_completed`: video watched and either no posttest
    /// or a passed posttest. Never un-completes.
    fn complete_if_qualified(&self, patch: &mut ProgressPatch, has_posttest: bool) {
        if self.is_completed {
            return;
        }
        let watched = patch.video_watched.unwrap_or(self.video_watched);
        let posttest_passed = patch.posttest.map_or(self.posttest.passed, |p| p.passed);
        if watched && (!has_posttest || posttest_passed) {
            patch.completed_at = Some(patch.updated_at);
        }
    }

    /// Applies a patch field by field. Video progress only moves forward.
    pub fn merge(&mut self, patch: &ProgressPatch) {
        if let Some(v) = patch.video_watched {
            self.video_watched = v;
        }
        if let Some(v) = patch.video_progress {
            self.video_progress = self.video_progress.max(v.min(100));
        }
        if let Some(v) = patch.document_viewed {
            self.document_viewed = v;
        }
        if let Some(v) = patch.pretest {
            self.pretest = v;
        }
        if let Some(v) = patch.posttest {
            self.posttest = v;
        }
        if let Some(at) = patch.completed_at {
            if !self.is_completed {
                self.is_completed = true;
                self.completed_at = Some(at);
            }
        }
        self.updated_at = Some(patch.updated_at);
    }

    /// Convenience for callers that hold the record in memory.
    pub fn apply(&mut self, patch: ProgressPatch) -> bool {
        let completes = patch.completes() && !self.is_completed;
        self.merge(&patch);
        completes
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
