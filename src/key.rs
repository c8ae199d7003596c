use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::fmt;

/// A typing key as delivered to the engine.
///
/// Space and Enter get their own variants so that `Key::Char(' ')` and
/// `Key::Space` never have to be told apart downstream; use [`Key::from_char`]
/// to build a key from raw text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Space,
    Enter,
    Backspace,
}

impl Key {
    pub fn from_char(c: char) -> Self {
        match c {
            ' ' => Key::Space,
            '\n' => Key::Enter,
            c => Key::Char(c),
        }
    }

    /// The literal character this key produces, if any.
    pub fn as_char(&self) -> Option<char> {
        match self {
            Key::Char(c) => Some(*c),
            Key::Space => Some(' '),
            Key::Enter => Some('\n'),
            Key::Backspace => None,
        }
    }

    pub fn is_backspace(&self) -> bool {
        matches!(self, Key::Backspace)
    }

    /// Display label shared by key highlighting and mistake aggregation.
    pub fn label(&self) -> String {
        match self {
            Key::Backspace => "Backspace".to_string(),
            Key::Space => "Space".to_string(),
            Key::Enter => "Enter".to_string(),
            Key::Char(c) => normalize_label(&c.to_string()),
        }
    }

    /// Parse a key label as produced by [`Key::label`] (or a raw single char).
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Space" => Some(Key::Space),
            "Enter" => Some(Key::Enter),
            "Backspace" => Some(Key::Backspace),
            _ => {
                let mut chars = label.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Key::from_char(c)),
                    _ => None,
                }
            }
        }
    }

    /// Map a terminal key-down to a typing key.
    ///
    /// Returns `None` for key-ups, modifier chords (Ctrl/Alt/Super/Meta held)
    /// and anything that is not a printable character, Enter or Backspace.
    /// Shift is allowed since it only selects the character.
    pub fn from_key_event(event: &KeyEvent) -> Option<Self> {
        if event.kind == KeyEventKind::Release {
            return None;
        }

        let chord =
            KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER | KeyModifiers::META;
        if event.modifiers.intersects(chord) {
            return None;
        }

        match event.code {
            KeyCode::Char(c) if !c.is_control() => Some(Key::from_char(c)),
            KeyCode::Enter => Some(Key::Enter),
            KeyCode::Backspace => Some(Key::Backspace),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Normalize a raw key value into its display label.
///
/// `" "` becomes `Space`, `"\n"` and `Enter` become `Enter`; every other
/// value, single character or named key, passes through unchanged.
pub fn normalize_label(raw: &str) -> String {
    match raw {
        " " => "Space".to_string(),
        "\n" | "Enter" => "Enter".to_string(),
        other => other.to_string(),
    }
}

/// The label of the key the learner has to press next, or an empty string
/// once the cursor has reached the end of the content.
pub fn next_expected_key(content: &[char], cursor: usize) -> String {
    match content.get(cursor) {
        Some(c) => normalize_label(&c.to_string()),
        None => String::new(),
    }
}
