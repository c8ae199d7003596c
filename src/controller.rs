use crate::clock::{Clock, MonotonicClock};
use crate::engine::{KeyOutcome, TypingEngine};
use crate::history::{ResultLog, SessionResult};
use crate::key::Key;
use crate::metrics::Metrics;
use crate::progress::ProgressStore;
use crate::session::LessonContent;
use tracing::{info, warn};

/// Owns the engine for the active lesson and keeps its progress saved.
///
/// Snapshots are scheduled after every accepted key and on blur; the
/// progress store debounces them. Keys and blur also advance the clock to
/// the current time before acting. Completion flushes immediately and, with a
/// result log attached, records the attempt once.
pub struct SessionController<C: Clock = MonotonicClock> {
    engine: TypingEngine<C>,
    progress: ProgressStore,
    history: Option<ResultLog>,
    top_n: usize,
    recorded: bool,
}

impl<C: Clock> SessionController<C> {
    pub fn new(engine: TypingEngine<C>, progress: ProgressStore) -> Self {
        Self {
            engine,
            progress,
            history: None,
            top_n: 5,
            recorded: false,
        }
    }

    pub fn with_history(mut self, log: ResultLog) -> Self {
        self.history = Some(log);
        self
    }

    pub fn with_top_mistakes(mut self, n: usize) -> Self {
        self.top_n = n;
        self
    }

    pub fn engine(&self) -> &TypingEngine<C> {
        &self.engine
    }

    pub fn metrics(&self) -> Metrics {
        self.engine.metrics(self.top_n)
    }

    /// Load `lesson` and resume saved progress for it, if any.
    /// Returns whether a snapshot was applied.
    pub fn open(&mut self, lesson: &LessonContent) -> bool {
        self.engine.load_lesson(lesson);
        let resumed = match self.progress.load(&lesson.id) {
            Some(snapshot) => {
                self.engine.apply_snapshot(&snapshot);
                info!(
                    lesson = %lesson.id,
                    cursor = self.engine.state().cursor,
                    elapsed_ms = self.engine.state().elapsed_active_ms,
                    "resumed saved progress"
                );
                true
            }
            None => false,
        };
        // A lesson resumed as complete was already recorded
        self.recorded = self.engine.state().completed;
        resumed
    }

    pub fn press(&mut self, key: Key) -> KeyOutcome {
        // Bring elapsed time up to this keystroke so a completing key
        // doesn't lose the time since the last frame
        self.tick_now();
        let outcome = self.engine.register_key(key);
        if outcome.accepted() {
            self.persist();
        }
        if self.engine.state().completed && !self.recorded {
            self.finish();
        }
        outcome
    }

    pub fn release(&mut self) {
        self.engine.release_key();
    }

    /// Window lost focus: pause the clock and save.
    pub fn blur(&mut self) {
        self.engine.release_key();
        let was_running = self.engine.state().running;
        self.tick_now();
        self.engine.stop();
        if was_running {
            self.persist();
        }
    }

    pub fn tick(&mut self, now_ms: f64) {
        self.engine.tick(now_ms);
    }

    /// Tick with the engine's own clock.
    pub fn tick_now(&mut self) {
        let now = self.engine.now_ms();
        self.engine.tick(now);
    }

    /// Start the lesson over and forget its saved progress.
    pub fn retry(&mut self) {
        self.engine.reset();
        self.recorded = false;
        if let Some(id) = self.engine.lesson_id() {
            self.progress.clear(id);
        }
    }

    /// Schedule a save of the current state.
    pub fn persist(&self) {
        if let Some(id) = self.engine.lesson_id() {
            self.progress.save(id, &self.engine.snapshot());
        }
    }

    pub fn flush(&self) {
        self.progress.flush();
    }

    fn finish(&mut self) {
        self.recorded = true;
        self.progress.flush();

        let (Some(log), Some(id)) = (&self.history, self.engine.lesson_id()) else {
            return;
        };
        let state = self.engine.state();
        let result = SessionResult::from_session(id, state, self.engine.content_len(), self.top_n);
        if let Err(e) = log.append(&result) {
            warn!(lesson = id, error = %e, "failed to record session result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn controller(store: Arc<MemoryStore>, clock: ManualClock) -> SessionController<ManualClock> {
        SessionController::new(
            TypingEngine::new(clock),
            ProgressStore::new(store, Duration::from_millis(10)),
        )
    }

    fn type_str(c: &mut SessionController<ManualClock>, text: &str) {
        for ch in text.chars() {
            c.press(Key::from_char(ch));
        }
    }

    #[test]
    fn progress_survives_reopen() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at(0.0);
        let lesson = LessonContent::new("l1", "hello world");

        {
            let mut first = controller(store.clone(), clock.clone());
            assert!(!first.open(&lesson));
            type_str(&mut first, "helxlo");
            clock.set(2_000.0);
            first.tick_now();
            first.blur();
        }

        let mut second = controller(store, clock.clone());
        assert!(second.open(&lesson));
        let state = second.engine().state();
        assert_eq!(state.cursor, 5);
        assert_eq!(state.incorrect_count, 1);
        assert_eq!(state.elapsed_active_ms, 2_000);
        assert!(!state.running);
        assert_eq!(state.mistake_frequency.get("x"), Some(&1));
    }

    #[test]
    fn retry_clears_saved_progress() {
        let store = Arc::new(MemoryStore::new());
        let lesson = LessonContent::new("l1", "abc");
        let mut c = controller(store.clone(), ManualClock::default());
        c.open(&lesson);
        type_str(&mut c, "ab");
        c.retry();
        assert_eq!(c.engine().state().cursor, 0);

        let mut again = controller(store, ManualClock::default());
        assert!(!again.open(&lesson));
    }

    #[test]
    fn blur_pauses_without_losing_counts() {
        let mut c = controller(Arc::new(MemoryStore::new()), ManualClock::default());
        c.open(&LessonContent::new("l1", "abc"));
        type_str(&mut c, "ax");
        c.blur();
        let state = c.engine().state();
        assert!(!state.running);
        assert_eq!(state.cursor, 1);
        assert!(state.active_key.is_none());
        assert_eq!(state.correct_count, 1);
        assert_eq!(state.incorrect_count, 1);
    }

    #[test]
    fn completion_records_history_once() {
        let dir = tempdir().unwrap();
        let log = ResultLog::with_path(dir.path().join("history.csv"));
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at(0.0);
        let lesson = LessonContent::new("l1", "ok");

        let mut c = controller(store.clone(), clock.clone()).with_history(log.clone());
        c.open(&lesson);
        c.press(Key::Char('o'));
        clock.set(1_200.0);
        c.press(Key::Char('k'));
        assert!(c.engine().state().completed);
        c.press(Key::Char('k'));

        let rows = log.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lesson_id, "l1");
        assert_eq!(rows[0].elapsed_ms, 1_200);

        // Reopening a finished lesson does not record it again
        let mut reopened = controller(store, clock).with_history(log.clone());
        assert!(reopened.open(&lesson));
        assert!(reopened.engine().state().completed);
        reopened.press(Key::Char('o'));
        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn works_without_storage() {
        let engine = TypingEngine::new(ManualClock::default());
        let mut c = SessionController::new(engine, ProgressStore::unavailable());
        assert!(!c.open(&LessonContent::new("l1", "a")));
        assert!(c.press(Key::Char('a')).is_correct());
        assert!(c.engine().state().completed);
        assert_eq!(c.metrics().progress, 100.0);
    }
}
