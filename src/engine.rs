use crate::clock::{Clock, MonotonicClock};
use crate::key::{next_expected_key, Key};
use crate::metrics::Metrics;
use crate::session::{FlashMarker, LessonContent, PersistedSnapshot, SessionState};
use crate::typing_policy::{judge, Outcome};
use tracing::{debug, info, warn};

/// Result of a single [`TypingEngine::register_key`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    /// No lesson loaded or the lesson is already complete. Nothing changed.
    Rejected,
    Backspace(FlashMarker),
    Correct(FlashMarker),
    Incorrect(FlashMarker),
}

impl KeyOutcome {
    pub fn accepted(&self) -> bool {
        !matches!(self, KeyOutcome::Rejected)
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, KeyOutcome::Correct(_))
    }

    pub fn marker(&self) -> Option<FlashMarker> {
        match self {
            KeyOutcome::Rejected => None,
            KeyOutcome::Backspace(m) | KeyOutcome::Correct(m) | KeyOutcome::Incorrect(m) => {
                Some(*m)
            }
        }
    }
}

/// State machine for one lesson attempt.
///
/// Time only enters through the injected [`Clock`] (for `start` and
/// `apply_snapshot`) and through the timestamp handed to [`Self::tick`];
/// the engine never schedules anything itself.
#[derive(Debug)]
pub struct TypingEngine<C: Clock = MonotonicClock> {
    clock: C,
    lesson_id: Option<String>,
    content: Option<Vec<char>>,
    state: SessionState,
    baseline_ms: Option<f64>,
    marker_seq: u64,
}

impl Default for TypingEngine<MonotonicClock> {
    fn default() -> Self {
        Self::new(MonotonicClock::new())
    }
}

impl<C: Clock> TypingEngine<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            lesson_id: None,
            content: None,
            state: SessionState::default(),
            baseline_ms: None,
            marker_seq: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn lesson_id(&self) -> Option<&str> {
        self.lesson_id.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.content.is_some()
    }

    pub fn content_len(&self) -> usize {
        self.content.as_ref().map_or(0, |c| c.len())
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn snapshot(&self) -> PersistedSnapshot {
        self.state.snapshot()
    }

    pub fn metrics(&self, top_n: usize) -> Metrics {
        Metrics::from_state(&self.state, self.content_len(), top_n)
    }

    /// Start a fresh session on `lesson`, discarding whatever was in progress.
    pub fn load_lesson(&mut self, lesson: &LessonContent) {
        self.content = Some(lesson.text.chars().collect());
        self.lesson_id = Some(lesson.id.clone());
        self.reinitialize();
        info!(lesson = %lesson.id, len = self.content_len(), "lesson loaded");
    }

    /// Restart the loaded lesson from scratch.
    pub fn reset(&mut self) {
        self.reinitialize();
        debug!(lesson = ?self.lesson_id, "session reset");
    }

    fn reinitialize(&mut self) {
        let content: &[char] = self.content.as_deref().unwrap_or_default();
        self.state = SessionState {
            completed: self.content.is_some() && content.is_empty(),
            next_expected_key: next_expected_key(content, 0),
            ..Default::default()
        };
        self.baseline_ms = None;
    }

    /// Restore counters from a persisted snapshot. Does not start the clock.
    pub fn apply_snapshot(&mut self, snapshot: &PersistedSnapshot) {
        let Some(content) = self.content.as_deref() else {
            warn!("snapshot ignored, no lesson loaded");
            return;
        };

        let len = content.len();
        if snapshot.cursor > len {
            warn!(cursor = snapshot.cursor, len, "snapshot cursor out of range, clamping");
        }
        let cursor = snapshot.cursor.min(len);
        let completed = cursor == len;

        self.state = SessionState {
            cursor,
            correct_count: snapshot.correct_count,
            incorrect_count: snapshot.incorrect_count,
            backspace_count: snapshot.backspace_count,
            elapsed_active_ms: snapshot.elapsed_active_ms,
            running: false,
            completed,
            active_key: None,
            mistake_frequency: snapshot.mistake_frequency.clone(),
            next_expected_key: next_expected_key(content, cursor),
        };
        self.baseline_ms = if completed {
            None
        } else {
            Some(self.clock.now_ms() - snapshot.elapsed_active_ms as f64)
        };
    }

    /// Start (or resume) the clock. No-op while running, once complete, or
    /// before a lesson is loaded.
    pub fn start(&mut self) {
        if self.state.running || self.state.completed || self.content.is_none() {
            return;
        }
        self.baseline_ms = Some(self.clock.now_ms() - self.state.elapsed_active_ms as f64);
        self.state.running = true;
    }

    /// Pause without losing progress. Safe to call at any time.
    pub fn stop(&mut self) {
        self.state.running = false;
        self.baseline_ms = None;
        self.state.active_key = None;
    }

    pub fn tick(&mut self, now_ms: f64) {
        if !self.state.running {
            return;
        }
        if let Some(baseline) = self.baseline_ms {
            self.state.elapsed_active_ms = (now_ms - baseline).floor().max(0.0) as u64;
        }
    }

    pub fn release_key(&mut self) {
        self.state.active_key = None;
    }

    pub fn register_key(&mut self, key: Key) -> KeyOutcome {
        if self.content.is_none() || self.state.completed {
            return KeyOutcome::Rejected;
        }

        self.state.active_key = Some(key.label());

        if key.is_backspace() {
            self.state.backspace_count += 1;
            let marker = self.flash(self.state.cursor.saturating_sub(1), false);
            return KeyOutcome::Backspace(marker);
        }

        if !self.state.running {
            self.start();
        }

        let index = self.state.cursor;
        let expected = self.content.as_ref().and_then(|c| c.get(index).copied());

        match judge(expected, key) {
            Outcome::Correct => {
                self.state.cursor += 1;
                self.state.correct_count += 1;

                let content: &[char] = self.content.as_deref().unwrap_or_default();
                self.state.completed = self.state.cursor == content.len();
                self.state.next_expected_key = next_expected_key(content, self.state.cursor);
                if self.state.completed {
                    self.state.running = false;
                    self.baseline_ms = None;
                    info!(
                        lesson = ?self.lesson_id,
                        elapsed_ms = self.state.elapsed_active_ms,
                        "lesson completed"
                    );
                }
                KeyOutcome::Correct(self.flash(index, true))
            }
            Outcome::Incorrect => {
                self.state.incorrect_count += 1;
                *self.state.mistake_frequency.entry(key.label()).or_insert(0) += 1;
                KeyOutcome::Incorrect(self.flash(index, false))
            }
        }
    }

    fn flash(&mut self, index: usize, correct: bool) -> FlashMarker {
        self.marker_seq += 1;
        FlashMarker {
            index,
            correct,
            token: self.marker_seq,
        }
    }
}
