// src/detection/calibration.rs
//! Calibration movement patterns
//!
//! A calibration run asks the user to repeat movements while the recording
//! flags which channels should be active. Patterns cover every channel on its
//! own first, then every ordered pair of channels from different muscle
//! groups. A channel's group is the part of its id before the first `_`
//! (`fi_ext` and `fi_flx` are both `fi`). Ids without such a prefix belong to
//! no group and only get an isolated pattern.

use crate::config::constants::calibration::{DEFAULT_INTERVALS_SECS, DEFAULT_REPEATS};
use std::time::Duration;

/// One movement pattern to prompt
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPattern {
    pub repeats: u32,
    /// Channels held active
    pub primary: Vec<String>,
    /// Channels paired with the primary ones; empty for isolated patterns
    pub secondary: Vec<String>,
    /// Hold durations in seconds, each used once per repeat
    pub intervals: Vec<f64>,
}

/// One step of a pattern's prompt schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueStep {
    pub active: bool,
    pub duration: Duration,
}

impl CalibrationPattern {
    pub fn is_isolated(&self) -> bool {
        self.secondary.is_empty()
    }

    /// Every channel the pattern activates
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.primary.iter().chain(&self.secondary).map(String::as_str)
    }

    /// Slots of the active channels within `ids` (packet order)
    pub fn cue_slots(&self, ids: &[&str]) -> Vec<usize> {
        self.channels()
            .filter_map(|ch| ids.iter().position(|id| *id == ch))
            .collect()
    }

    /// Alternating hold/relax steps: for each repeat, each interval is held
    /// and then relaxed for the same duration
    pub fn schedule(&self) -> Vec<CueStep> {
        let mut steps = Vec::with_capacity(self.repeats as usize * self.intervals.len() * 2);
        for _ in 0..self.repeats {
            for &secs in &self.intervals {
                let duration = Duration::from_secs_f64(secs.max(0.0));
                steps.push(CueStep { active: true, duration });
                steps.push(CueStep { active: false, duration });
            }
        }
        steps
    }

    pub fn total_duration(&self) -> Duration {
        self.schedule().iter().map(|s| s.duration).sum()
    }
}

/// Muscle group of a channel id, `None` when the id has no `group_` prefix
pub fn muscle_group(id: &str) -> Option<&str> {
    match id.split_once('_') {
        Some((group, _)) if !group.is_empty() => Some(group),
        _ => None,
    }
}

/// Patterns for `ids`: isolated channels (sorted) first, then cross-group pairs
pub fn populate_patterns(ids: &[&str], repeats: u32, intervals: &[f64]) -> Vec<CalibrationPattern> {
    let mut sorted: Vec<&str> = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let pattern = |primary: &str, secondary: Option<&str>| CalibrationPattern {
        repeats,
        primary: vec![primary.to_string()],
        secondary: secondary.map(|s| vec![s.to_string()]).unwrap_or_default(),
        intervals: intervals.to_vec(),
    };

    let mut patterns: Vec<CalibrationPattern> =
        sorted.iter().map(|id| pattern(*id, None)).collect();
    for m in &sorted {
        let Some(group) = muscle_group(m) else {
            continue;
        };
        for o in &sorted {
            if matches!(muscle_group(o), Some(other) if other != group) {
                patterns.push(pattern(*m, Some(*o)));
            }
        }
    }
    patterns
}

/// [`populate_patterns`] with the default repeats and intervals
pub fn default_patterns(ids: &[&str]) -> Vec<CalibrationPattern> {
    populate_patterns(ids, DEFAULT_REPEATS, &DEFAULT_INTERVALS_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDS: [&str; 4] = ["th_add", "fi_ext", "th_abd", "fi_flx"];

    #[test]
    fn test_group_prefix() {
        assert_eq!(muscle_group("fi_ext"), Some("fi"));
        assert_eq!(muscle_group("th_abd_left"), Some("th"));
        assert_eq!(muscle_group("plain"), None);
        assert_eq!(muscle_group("_ext"), None);
    }

    #[test]
    fn test_ungrouped_ids_never_paired() {
        let patterns = default_patterns(&["fi_ext", "plain", "th_abd"]);
        let isolated = patterns.iter().filter(|p| p.is_isolated()).count();
        assert_eq!(isolated, 3);
        let pairs: Vec<(&str, &str)> = patterns
            .iter()
            .filter(|p| !p.is_isolated())
            .map(|p| (p.primary[0].as_str(), p.secondary[0].as_str()))
            .collect();
        assert_eq!(pairs, vec![("fi_ext", "th_abd"), ("th_abd", "fi_ext")]);
    }

    #[test]
    fn test_all_ungrouped_gives_isolated_only() {
        let patterns = default_patterns(&["left", "right"]);
        assert_eq!(patterns.len(), 2);
        assert!(patterns.iter().all(CalibrationPattern::is_isolated));
    }

    #[test]
    fn test_isolated_patterns_first_and_sorted() {
        let patterns = default_patterns(&IDS);
        let isolated: Vec<&str> = patterns
            .iter()
            .take_while(|p| p.is_isolated())
            .map(|p| p.primary[0].as_str())
            .collect();
        assert_eq!(isolated, vec!["fi_ext", "fi_flx", "th_abd", "th_add"]);
    }

    #[test]
    fn test_pairs_cross_groups_only() {
        let patterns = default_patterns(&IDS);
        // 4 isolated + each channel paired with the 2 of the other group
        assert_eq!(patterns.len(), 4 + 8);
        for p in patterns.iter().filter(|p| !p.is_isolated()) {
            let primary = muscle_group(&p.primary[0]).unwrap();
            assert_ne!(Some(primary), muscle_group(&p.secondary[0]));
        }
        assert_eq!(patterns[4].primary, vec!["fi_ext"]);
        assert_eq!(patterns[4].secondary, vec!["th_abd"]);
    }

    #[test]
    fn test_schedule() {
        let pattern = populate_patterns(&["fi_ext"], 2, &[1.0, 2.0]).remove(0);
        let steps = pattern.schedule();
        assert_eq!(steps.len(), 8);
        assert!(steps[0].active && !steps[1].active);
        assert_eq!(pattern.total_duration(), Duration::from_secs(12));
    }

    #[test]
    fn test_cue_slots() {
        let patterns = default_patterns(&IDS);
        let pair = &patterns[4];
        let packet_order = ["fi_ext", "fi_flx", "th_abd", "th_add"];
        assert_eq!(pair.cue_slots(&packet_order), vec![0, 2]);
    }
}
