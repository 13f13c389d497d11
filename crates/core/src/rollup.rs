//! Subject-level rollups folded over a student's chapter progress.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::{Chapter, ChapterId, ProgressRecord, SubjectId};
use crate::stage::{self, ChapterTests, PipelineStage};

/// Video percentage counted as watched in the student's own progress view.
pub const STUDENT_VIDEO_THRESHOLD: u8 = 90;

/// Video percentage counted as watched in the teacher's class report.
pub const TEACHER_VIDEO_THRESHOLD: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRollup {
    pub chapter_id: ChapterId,
    pub title: String,
    pub position: u32,
    pub video_progress: u8,
    pub video_watched: bool,
    pub is_completed: bool,
    pub stage: PipelineStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRollup {
    pub subject_id: SubjectId,
    pub total_chapters: u32,
    pub completed_chapters: u32,
    pub video_watched_chapters: u32,
    /// Unweighted mean of chapter video progress, rounded half up.
    pub subject_progress: u8,
    pub can_take_final_exam: bool,
    pub chapters: Vec<ChapterRollup>,
}

/// Folds `progress` over the subject's `chapters`.
///
/// A chapter without a record counts as 0% watched and not completed.
/// Records for chapters outside `chapters` are ignored.
#[must_use]
pub fn rollup_subject(
    subject_id: SubjectId,
    chapters: &[Chapter],
    progress: &[ProgressRecord],
    video_threshold: u8,
) -> SubjectRollup {
    let by_chapter: HashMap<ChapterId, &ProgressRecord> =
        progress.iter().map(|p| (p.chapter_id(), p)).collect();

    let mut ordered: Vec<&Chapter> = chapters.iter().collect();
    ordered.sort_by_key(|c| (c.position, c.id));

    let mut rows = Vec::with_capacity(ordered.len());
    let mut completed = 0_u32;
    let mut watched = 0_u32;
    let mut progress_sum = 0_u64;

    for chapter in ordered {
        let record = by_chapter.get(&chapter.id).copied();
        let video_progress = record.map_or(0, ProgressRecord::video_progress);
        let is_completed = record.is_some_and(ProgressRecord::is_completed);
        let video_watched =
            record.is_some_and(ProgressRecord::video_watched) || video_progress >= video_threshold;

        if is_completed {
            completed += 1;
        }
        if video_watched {
            watched += 1;
        }
        progress_sum += u64::from(video_progress);

        rows.push(ChapterRollup {
            chapter_id: chapter.id,
            title: chapter.title.clone(),
            position: chapter.position,
            video_progress,
            video_watched,
            is_completed,
            stage: stage::resolve_or_default(record, ChapterTests::of(chapter)),
        });
    }

    let total = u32::try_from(rows.len()).unwrap_or(u32::MAX);
    SubjectRollup {
        subject_id,
        total_chapters: total,
        completed_chapters: completed,
        video_watched_chapters: watched,
        subject_progress: mean_rounded(progress_sum, u64::from(total)),
        can_take_final_exam: total > 0 && completed == total,
        chapters: rows,
    }
}

fn mean_rounded(sum: u64, count: u64) -> u8 {
    if count == 0 {
        return 0;
    }
    u8::try_from((sum * 2 + count) / (count * 2)).unwrap_or(100)
}

/// A subject shown in a student's progress view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMembership {
    pub subject_id: SubjectId,
    pub is_enrolled: bool,
}

/// Enrolled subjects ∪ subjects reachable through any progress record.
///
/// Enrolled subjects come first in enrollment order, followed by subjects
/// known only from progress in ascending id order.
#[must_use]
pub fn reconcile_subjects(
    enrolled: &[SubjectId],
    progress: &[ProgressRecord],
) -> Vec<SubjectMembership> {
    let mut seen = HashSet::new();
    let mut out: Vec<SubjectMembership> = enrolled
        .iter()
        .filter(|id| seen.insert(**id))
        .map(|id| SubjectMembership {
            subject_id: *id,
            is_enrolled: true,
        })
        .collect();

    let orphaned: BTreeSet<SubjectId> = progress
        .iter()
        .map(ProgressRecord::subject_id)
        .filter(|id| !seen.contains(id))
        .collect();
    out.extend(orphaned.into_iter().map(|subject_id| SubjectMembership {
        subject_id,
        is_enrolled: false,
    }));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssessmentId, BankId, StudentId};
    use crate::time::fixed_now;

    fn chapters(n: u64) -> Vec<Chapter> {
        (1..=n)
            .map(|i| {
                Chapter::new(
                    ChapterId::new(i),
                    SubjectId::new(1),
                    format!("Ch {i}"),
                    u32::try_from(i).unwrap(),
                )
            })
            .collect()
    }

    fn watched_to(chapter: u64, percent: u8) -> ProgressRecord {
        let mut rec =
            ProgressRecord::new(StudentId::new(1), ChapterId::new(chapter), SubjectId::new(1));
        rec.apply(rec.video_heartbeat(percent, true, fixed_now()));
        rec
    }

    fn completed(chapter: u64) -> ProgressRecord {
        let mut rec =
            ProgressRecord::new(StudentId::new(1), ChapterId::new(chapter), SubjectId::new(1));
        rec.apply(rec.video_completed(false, fixed_now()));
        rec
    }

    #[test]
    fn subject_progress_is_unweighted_mean() {
        let progress = vec![watched_to(1, 100), watched_to(2, 40)];
        let r = rollup_subject(SubjectId::new(1), &chapters(3), &progress, STUDENT_VIDEO_THRESHOLD);

        assert_eq!(r.completed_chapters, 0);
        assert_eq!(r.subject_progress, 47);
        assert_eq!(r.chapters[2].video_progress, 0);
        assert!(!r.can_take_final_exam);
    }

    #[test]
    fn empty_subject_has_zero_progress_and_no_final() {
        let r = rollup_subject(SubjectId::new(1), &[], &[], STUDENT_VIDEO_THRESHOLD);
        assert_eq!(r.subject_progress, 0);
        assert_eq!(r.total_chapters, 0);
        assert!(!r.can_take_final_exam);
    }

    #[test]
    fn final_exam_eligibility_boundary() {
        let chapters = chapters(3);
        let two = vec![completed(1), completed(2)];
        let r = rollup_subject(SubjectId::new(1), &chapters, &two, STUDENT_VIDEO_THRESHOLD);
        assert_eq!(r.completed_chapters, 2);
        assert!(!r.can_take_final_exam);

        let three = vec![completed(1), completed(2), completed(3)];
        let r = rollup_subject(SubjectId::new(1), &chapters, &three, STUDENT_VIDEO_THRESHOLD);
        assert!(r.can_take_final_exam);
    }

    #[test]
    fn thresholds_differ_between_audiences() {
        let progress = vec![watched_to(1, 95)];
        let student =
            rollup_subject(SubjectId::new(1), &chapters(1), &progress, STUDENT_VIDEO_THRESHOLD);
        let teacher =
            rollup_subject(SubjectId::new(1), &chapters(1), &progress, TEACHER_VIDEO_THRESHOLD);
        assert_eq!(student.video_watched_chapters, 1);
        assert_eq!(teacher.video_watched_chapters, 0);
    }

    #[test]
    fn chapter_rows_carry_resolved_stage() {
        let chapters = vec![
            Chapter::new(ChapterId::new(1), SubjectId::new(1), "Intro", 1)
                .with_pretest(BankId::new(1))
                .with_posttest(AssessmentId::new(1)),
            Chapter::new(ChapterId::new(2), SubjectId::new(1), "Next", 2),
        ];
        let r = rollup_subject(SubjectId::new(1), &chapters, &[], STUDENT_VIDEO_THRESHOLD);
        assert_eq!(r.chapters[0].stage, PipelineStage::PretestPending);
        assert_eq!(r.chapters[1].stage, PipelineStage::Learning);
    }

    #[test]
    fn reconcile_unions_enrolled_and_orphaned() {
        let mut orphan =
            ProgressRecord::new(StudentId::new(1), ChapterId::new(9), SubjectId::new(5));
        orphan.apply(orphan.document_opened(fixed_now()));
        let enrolled_progress =
            ProgressRecord::new(StudentId::new(1), ChapterId::new(1), SubjectId::new(2));

        let subjects = reconcile_subjects(
            &[SubjectId::new(2), SubjectId::new(3), SubjectId::new(2)],
            &[orphan, enrolled_progress],
        );
        assert_eq!(
            subjects,
            vec![
                SubjectMembership {
                    subject_id: SubjectId::new(2),
                    is_enrolled: true
                },
                SubjectMembership {
                    subject_id: SubjectId::new(3),
                    is_enrolled: true
                },
                SubjectMembership {
                    subject_id: SubjectId::new(5),
                    is_enrolled: false
                },
            ]
        );
    }
}
