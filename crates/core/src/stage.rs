//! Derives where a student is in a chapter's learn → assess pipeline.
//!
//! The stage is never persisted. It is recomputed from the independent
//! progress signals every time it is needed, so it cannot drift from them.

use serde::{Deserialize, Serialize};

use crate::model::{Chapter, ProgressRecord};

/// Pipeline stages in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    PretestPending,
    Learning,
    PosttestPending,
    Completed,
}

impl PipelineStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::PretestPending => "pretest-pending",
            PipelineStage::Learning => "learning",
            PipelineStage::PosttestPending => "posttest-pending",
            PipelineStage::Completed => "completed",
        }
    }
}

/// Which assessments a chapter carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChapterTests {
    pub has_pretest: bool,
    pub has_posttest: bool,
}

impl ChapterTests {
    #[must_use]
    pub fn of(chapter: &Chapter) -> Self {
        Self {
            has_pretest: chapter.has_pretest(),
            has_posttest: chapter.has_posttest(),
        }
    }
}

/// First matching rule wins; the conditions overlap.
#[must_use]
pub fn resolve(progress: &ProgressRecord, tests: ChapterTests) -> PipelineStage {
    resolve_flags(
        progress.is_completed(),
        progress.video_watched(),
        progress.pretest().completed,
        tests,
    )
}

/// Same as `resolve`, treating a missing record as the default-zero record.
#[must_use]
pub fn resolve_or_default(progress: Option<&ProgressRecord>, tests: ChapterTests) -> PipelineStage {
    match progress {
        Some(p) => resolve(p, tests),
        None => resolve_flags(false, false, false, tests),
    }
}

fn resolve_flags(
    is_completed: bool,
    video_watched: bool,
    pretest_completed: bool,
    tests: ChapterTests,
) -> PipelineStage {
    if is_completed {
        PipelineStage::Completed
    } else if video_watched && tests.has_posttest {
        PipelineStage::PosttestPending
    } else if pretest_completed || !tests.has_pretest {
        PipelineStage::Learning
    } else {
        PipelineStage::PretestPending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChapterId, StudentId, SubjectId, TestOutcome};
    use crate::time::fixed_now;

    fn expected(
        completed: bool,
        watched: bool,
        pretest_done: bool,
        tests: ChapterTests,
    ) -> PipelineStage {
        if completed {
            return PipelineStage::Completed;
        }
        if watched && tests.has_posttest {
            return PipelineStage::PosttestPending;
        }
        if pretest_done || !tests.has_pretest {
            return PipelineStage::Learning;
        }
        PipelineStage::PretestPending
    }

    #[test]
    fn truth_table_matches_rules() {
        for completed in [false, true] {
            for watched in [false, true] {
                for pretest_done in [false, true] {
                    for has_pretest in [false, true] {
                        for has_posttest in [false, true] {
                            let tests = ChapterTests {
                                has_pretest,
                                has_posttest,
                            };
                            assert_eq!(
                                resolve_flags(completed, watched, pretest_done, tests),
                                expected(completed, watched, pretest_done, tests),
                                "completed={completed} watched={watched} pretest={pretest_done} \
                                 has_pretest={has_pretest} has_posttest={has_posttest}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn default_record_depends_on_pretest_presence() {
        let with_pretest = ChapterTests {
            has_pretest: true,
            has_posttest: true,
        };
        let without = ChapterTests {
            has_pretest: false,
            has_posttest: true,
        };
        assert_eq!(resolve_or_default(None, with_pretest), PipelineStage::PretestPending);
        assert_eq!(resolve_or_default(None, without), PipelineStage::Learning);

        let zero = ProgressRecord::new(StudentId::new(1), ChapterId::new(1), SubjectId::new(1));
        assert_eq!(resolve(&zero, with_pretest), PipelineStage::PretestPending);
    }

    #[test]
    fn pretest_then_video_without_posttest_reaches_completed() {
        let tests = ChapterTests {
            has_pretest: true,
            has_posttest: false,
        };
        let now = fixed_now();
        let mut rec = ProgressRecord::new(StudentId::new(1), ChapterId::new(1), SubjectId::new(1));
        assert_eq!(resolve(&rec, tests), PipelineStage::PretestPending);

        let outcome = TestOutcome {
            score: 3,
            percentage: 60,
            passed: true,
        };
        rec.apply(rec.pretest_submitted(outcome, now));
        assert_eq!(resolve(&rec, tests), PipelineStage::Learning);

        rec.apply(rec.video_completed(tests.has_posttest, now));
        assert!(rec.is_completed());
        assert_eq!(resolve(&rec, tests), PipelineStage::Completed);
    }

    #[test]
    fn watched_video_with_posttest_waits_for_posttest() {
        let tests = ChapterTests {
            has_pretest: false,
            has_posttest: true,
        };
        let mut rec = ProgressRecord::new(StudentId::new(1), ChapterId::new(1), SubjectId::new(1));
        rec.apply(rec.video_completed(true, fixed_now()));
        assert_eq!(resolve(&rec, tests), PipelineStage::PosttestPending);
    }
}
