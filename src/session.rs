use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A lesson as supplied by the content provider. Immutable for the lifetime
/// of a session; changing the text means loading a new lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonContent {
    pub id: String,
    pub text: String,
}

impl LessonContent {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Length in characters, which is what the cursor indexes.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

/// Runtime state of one lesson attempt.
///
/// Only [`crate::engine::TypingEngine`] mutates this; everyone else gets a
/// shared reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub cursor: usize,
    pub correct_count: u64,
    pub incorrect_count: u64,
    pub backspace_count: u64,
    pub elapsed_active_ms: u64,
    pub running: bool,
    pub completed: bool,
    /// Most recently pressed key label, for highlighting.
    pub active_key: Option<String>,
    pub mistake_frequency: BTreeMap<String, u64>,
    /// Empty once the lesson is complete.
    pub next_expected_key: String,
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        if self.completed {
            SessionStatus::Completed
        } else if self.running {
            SessionStatus::Running
        } else if self.has_progress() {
            SessionStatus::Paused
        } else {
            SessionStatus::Idle
        }
    }

    pub fn has_progress(&self) -> bool {
        self.cursor > 0
            || self.correct_count > 0
            || self.incorrect_count > 0
            || self.backspace_count > 0
            || self.elapsed_active_ms > 0
    }

    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            cursor: self.cursor,
            correct_count: self.correct_count,
            incorrect_count: self.incorrect_count,
            backspace_count: self.backspace_count,
            elapsed_active_ms: self.elapsed_active_ms,
            mistake_frequency: self.mistake_frequency.clone(),
            updated_at: None,
        }
    }
}

/// The serializable part of [`SessionState`], stored per lesson.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub cursor: usize,
    pub correct_count: u64,
    pub incorrect_count: u64,
    pub backspace_count: u64,
    pub elapsed_active_ms: u64,
    #[serde(default)]
    pub mistake_frequency: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One-shot feedback for the most recent keystroke. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashMarker {
    pub index: usize,
    pub correct: bool,
    /// Unique per emitted marker so repeated outcomes at the same index
    /// still read as new events.
    pub token: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lesson_len_counts_chars() {
        let lesson = LessonContent::new("l1", "héllo");
        assert_eq!(lesson.len(), 5);
        assert!(!lesson.is_empty());
        assert!(LessonContent::new("l2", "").is_empty());
    }

    #[test]
    fn status_follows_flags() {
        let mut state = SessionState::default();
        assert_eq!(state.status(), SessionStatus::Idle);

        state.running = true;
        assert_eq!(state.status(), SessionStatus::Running);

        state.running = false;
        state.elapsed_active_ms = 10;
        assert_eq!(state.status(), SessionStatus::Paused);

        state.completed = true;
        assert_eq!(state.status(), SessionStatus::Completed);
        assert_eq!(state.status().to_string(), "Completed");
    }

    #[test]
    fn snapshot_uses_camel_case_on_the_wire() {
        let mut state = SessionState {
            cursor: 3,
            correct_count: 3,
            incorrect_count: 1,
            backspace_count: 2,
            elapsed_active_ms: 4200,
            ..Default::default()
        };
        state.mistake_frequency.insert("Space".into(), 1);

        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["cursor"], 3);
        assert_eq!(json["correctCount"], 3);
        assert_eq!(json["incorrectCount"], 1);
        assert_eq!(json["backspaceCount"], 2);
        assert_eq!(json["elapsedActiveMs"], 4200);
        assert_eq!(json["mistakeFrequency"]["Space"], 1);
        assert!(json.get("updatedAt").is_none());
    }

    #[test]
    fn snapshot_tolerates_missing_optional_fields() {
        let raw = r#"{"cursor":1,"correctCount":1,"incorrectCount":0,
            "backspaceCount":0,"elapsedActiveMs":50}"#;
        let snap: PersistedSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snap.cursor, 1);
        assert!(snap.mistake_frequency.is_empty());
        assert!(snap.updated_at.is_none());
    }
}
