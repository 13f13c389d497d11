//! Engine tunables with environment overrides.

use chrono::Duration;
use tracing::warn;

use course_core::rollup::{STUDENT_VIDEO_THRESHOLD, TEACHER_VIDEO_THRESHOLD};

pub const STUDENT_THRESHOLD_ENV: &str = "COURSE_STUDENT_VIDEO_THRESHOLD";
pub const TEACHER_THRESHOLD_ENV: &str = "COURSE_TEACHER_VIDEO_THRESHOLD";
pub const ENFORCE_DEADLINE_ENV: &str = "COURSE_ENFORCE_DEADLINE";
pub const DEADLINE_GRACE_ENV: &str = "COURSE_DEADLINE_GRACE_SECS";
pub const PROGRESS_LOCK_ENV: &str = "COURSE_PROGRESS_LOCK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Video percentage counted as watched in a student's own view.
    pub student_video_threshold: u8,
    /// Video percentage counted as watched in the class report.
    pub teacher_video_threshold: u8,
    /// Reject submissions that arrive after the attempt deadline.
    pub enforce_deadline: bool,
    pub deadline_grace_secs: u32,
    /// Serialize progress writes per (student, chapter) inside this process.
    pub progress_lock: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            student_video_threshold: STUDENT_VIDEO_THRESHOLD,
            teacher_video_threshold: TEACHER_VIDEO_THRESHOLD,
            enforce_deadline: false,
            deadline_grace_secs: 30,
            progress_lock: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `COURSE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like `from_env` with an injectable lookup. Unparseable values keep the
    /// default and log a warning.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            student_video_threshold: read(&lookup, STUDENT_THRESHOLD_ENV, parse_percent)
                .unwrap_or(defaults.student_video_threshold),
            teacher_video_threshold: read(&lookup, TEACHER_THRESHOLD_ENV, parse_percent)
                .unwrap_or(defaults.teacher_video_threshold),
            enforce_deadline: read(&lookup, ENFORCE_DEADLINE_ENV, parse_flag)
                .unwrap_or(defaults.enforce_deadline),
            deadline_grace_secs: read(&lookup, DEADLINE_GRACE_ENV, |s| s.parse().ok())
                .unwrap_or(defaults.deadline_grace_secs),
            progress_lock: read(&lookup, PROGRESS_LOCK_ENV, parse_flag)
                .unwrap_or(defaults.progress_lock),
        }
    }

    #[must_use]
    pub fn deadline_grace(&self) -> Duration {
        Duration::seconds(i64::from(self.deadline_grace_secs))
    }
}

fn read<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        warn!(key, value = %raw, "ignoring invalid configuration value");
    }
    parsed
}

fn parse_percent(s: &str) -> Option<u8> {
    s.parse::<u8>().ok().filter(|v| *v <= 100)
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_keep_thresholds_distinct() {
        let config = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.student_video_threshold, 90);
        assert_eq!(config.teacher_video_threshold, 100);
    }

    #[test]
    fn overrides_apply_and_invalid_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            (STUDENT_THRESHOLD_ENV, "80"),
            (TEACHER_THRESHOLD_ENV, "150"),
            (ENFORCE_DEADLINE_ENV, "yes"),
            (DEADLINE_GRACE_ENV, "x"),
            (PROGRESS_LOCK_ENV, "off"),
        ]));
        assert_eq!(config.student_video_threshold, 80);
        assert_eq!(config.teacher_video_threshold, 100);
        assert!(config.enforce_deadline);
        assert_eq!(config.deadline_grace_secs, 30);
        assert!(!config.progress_lock);
    }
}
