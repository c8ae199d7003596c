use crate::error::HistoryError;
use crate::metrics::{self, Metrics};
use crate::session::SessionState;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// One completed lesson attempt, as written to the result log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub date: DateTime<Local>,
    pub lesson_id: String,
    pub chars: usize,
    pub elapsed_ms: u64,
    pub wpm: f64,
    pub accuracy: f64,
    pub error_rate: f64,
    pub backspaces: u64,
    /// `label:count` pairs separated by spaces, most frequent first.
    pub top_mistakes: String,
}

impl SessionResult {
    pub fn from_session(
        lesson_id: &str,
        state: &SessionState,
        content_len: usize,
        top_n: usize,
    ) -> Self {
        let m = Metrics::from_state(state, content_len, top_n);
        Self {
            date: Local::now(),
            lesson_id: lesson_id.to_string(),
            chars: content_len,
            elapsed_ms: state.elapsed_active_ms,
            wpm: round2(m.wpm),
            accuracy: round2(m.accuracy),
            error_rate: round2(m.error_rate),
            backspaces: state.backspace_count,
            top_mistakes: format_mistakes(&metrics::top_mistakes(&state.mistake_frequency, top_n)),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn format_mistakes(mistakes: &[(String, u64)]) -> String {
    mistakes
        .iter()
        .map(|(label, count)| format!("{label}:{count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append-only CSV log of completed sessions
#[derive(Debug, Clone)]
pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, result: &SessionResult) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Header only when the file is new
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(result)?;
        writer.flush()?;
        Ok(())
    }

    /// All recorded results, oldest first. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<SessionResult>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut results = Vec::new();
        for row in reader.deserialize() {
            results.push(row?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn finished_state() -> SessionState {
        let mut mistakes = BTreeMap::new();
        mistakes.insert("Space".to_string(), 2);
        mistakes.insert("e".to_string(), 1);
        SessionState {
            cursor: 10,
            correct_count: 10,
            incorrect_count: 3,
            backspace_count: 4,
            elapsed_active_ms: 12_000,
            completed: true,
            mistake_frequency: mistakes,
            ..Default::default()
        }
    }

    #[test]
    fn result_from_session() {
        let result = SessionResult::from_session("home-row", &finished_state(), 10, 5);
        assert_eq!(result.lesson_id, "home-row");
        assert_eq!(result.chars, 10);
        assert_eq!(result.wpm, 10.0);
        assert_eq!(result.accuracy, 76.92);
        assert_eq!(result.error_rate, 23.08);
        assert_eq!(result.backspaces, 4);
        assert_eq!(result.top_mistakes, "Space:2 e:1");
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let log = ResultLog::with_path(dir.path().join("sub").join("history.csv"));

        assert!(log.read_all().unwrap().is_empty());

        let first = SessionResult::from_session("a", &finished_state(), 10, 5);
        let second = SessionResult::from_session("b", &finished_state(), 10, 1);
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let rows = log.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].lesson_id, "a");
        assert_eq!(rows[1].lesson_id, "b");
        assert_eq!(rows[1].top_mistakes, "Space:2");
        assert_eq!(rows[0].date, first.date);

        // Exactly one header line
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("date,")).count(), 1);
    }
}
