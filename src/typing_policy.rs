use crate::key::Key;

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
}

/// Judge a keystroke against the expected character.
///
/// Case-sensitive literal comparison; Space and Enter match `' '` and `'\n'`.
/// Nothing matches past the end of the content, and Backspace never matches.
pub fn judge(expected: Option<char>, key: Key) -> Outcome {
    match (expected, key.as_char()) {
        (Some(want), Some(got)) if want == got => Outcome::Correct,
        _ => Outcome::Incorrect,
    }
}
