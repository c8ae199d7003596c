use crate::session::SessionState;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

pub const CHARS_PER_WORD: f64 = 5.0;

/// `cursor / len * 100` clamped to `[0, 100]`; `0` for empty content.
pub fn progress_percent(cursor: usize, content_len: usize) -> f64 {
    if content_len == 0 {
        return 0.0;
    }
    (cursor as f64 / content_len as f64 * 100.0).clamp(0.0, 100.0)
}

/// Words per minute over correct characters, five characters to the word.
/// `0` until some time has elapsed.
pub fn wpm(correct_count: u64, elapsed_active_ms: u64) -> f64 {
    if elapsed_active_ms == 0 {
        return 0.0;
    }
    (correct_count as f64 / CHARS_PER_WORD) / (elapsed_active_ms as f64 / 60_000.0)
}

/// Percentage of keystrokes that were correct; `100` before any keystroke.
pub fn accuracy(correct_count: u64, incorrect_count: u64) -> f64 {
    let total = correct_count + incorrect_count;
    if total == 0 {
        return 100.0;
    }
    correct_count as f64 / total as f64 * 100.0
}

/// Percentage of keystrokes that were wrong; `0` before any keystroke.
pub fn error_rate(correct_count: u64, incorrect_count: u64) -> f64 {
    let total = correct_count + incorrect_count;
    if total == 0 {
        return 0.0;
    }
    incorrect_count as f64 / total as f64 * 100.0
}

/// The `n` most frequent mistakes, highest count first.
///
/// Equal counts are ordered by key label so the result is deterministic.
pub fn top_mistakes(mistake_frequency: &BTreeMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    mistake_frequency
        .iter()
        .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
        .take(n)
        .map(|(label, count)| (label.clone(), *count))
        .collect()
}

/// Everything derived from a session at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub progress: f64,
    pub wpm: f64,
    pub accuracy: f64,
    pub error_rate: f64,
    pub top_mistakes: Vec<(String, u64)>,
}

impl Metrics {
    pub fn from_state(state: &SessionState, content_len: usize, top_n: usize) -> Self {
        Self {
            progress: progress_percent(state.cursor, content_len),
            wpm: wpm(state.correct_count, state.elapsed_active_ms),
            accuracy: accuracy(state.correct_count, state.incorrect_count),
            error_rate: error_rate(state.correct_count, state.incorrect_count),
            top_mistakes: top_mistakes(&state.mistake_frequency, top_n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freq(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn zero_guards() {
        assert_eq!(accuracy(0, 0), 100.0);
        assert_eq!(error_rate(0, 0), 0.0);
        assert_eq!(wpm(42, 0), 0.0);
        assert_eq!(progress_percent(3, 0), 0.0);
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_percent(0, 4), 0.0);
        assert_eq!(progress_percent(1, 4), 25.0);
        assert_eq!(progress_percent(4, 4), 100.0);
        assert_eq!(progress_percent(9, 4), 100.0);
    }

    #[test]
    fn wpm_uses_five_chars_per_word() {
        // 50 chars in one minute is 10 words
        assert_eq!(wpm(50, 60_000), 10.0);
        // 25 chars in 30 seconds is also 10 wpm
        assert_eq!(wpm(25, 30_000), 10.0);
        assert_eq!(wpm(0, 5_000), 0.0);
    }

    #[test]
    fn accuracy_and_error_rate_are_complements() {
        assert_eq!(accuracy(3, 1), 75.0);
        assert_eq!(error_rate(3, 1), 25.0);
        assert_eq!(accuracy(0, 2), 0.0);
        assert_eq!(error_rate(0, 2), 100.0);
    }

    #[test]
    fn top_mistakes_sorted_by_count_desc() {
        let mistakes = freq(&[("a", 1), ("b", 5), ("c", 3)]);
        assert_eq!(
            top_mistakes(&mistakes, 2),
            vec![("b".to_string(), 5), ("c".to_string(), 3)]
        );
    }

    #[test]
    fn top_mistakes_ties_break_by_label() {
        let mistakes = freq(&[("z", 2), ("Space", 2), ("m", 2), ("q", 7)]);
        let labels: Vec<String> = top_mistakes(&mistakes, 10)
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["q", "Space", "m", "z"]);
    }

    #[test]
    fn top_mistakes_handles_empty_and_zero_n() {
        assert!(top_mistakes(&BTreeMap::new(), 5).is_empty());
        assert!(top_mistakes(&freq(&[("a", 1)]), 0).is_empty());
    }

    #[test]
    fn metrics_from_state() {
        let state = SessionState {
            cursor: 5,
            correct_count: 5,
            incorrect_count: 5,
            elapsed_active_ms: 6_000,
            mistake_frequency: freq(&[("x", 4), ("y", 1)]),
            ..Default::default()
        };
        let metrics = Metrics::from_state(&state, 10, 1);
        assert_eq!(metrics.progress, 50.0);
        assert_eq!(metrics.wpm, 10.0);
        assert_eq!(metrics.accuracy, 50.0);
        assert_eq!(metrics.error_rate, 50.0);
        assert_eq!(metrics.top_mistakes, vec![("x".to_string(), 4)]);
    }
}
