// Library surface for the typing-session engine; the binary in main.rs is a
// thin terminal driver over it.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod history;
pub mod key;
pub mod metrics;
pub mod progress;
pub mod runtime;
pub mod session;
pub mod store;
pub mod typing_policy;

pub use controller::SessionController;
pub use engine::{KeyOutcome, TypingEngine};
pub use key::Key;
pub use session::{FlashMarker, LessonContent, PersistedSnapshot, SessionState};
