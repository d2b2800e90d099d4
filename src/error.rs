//! Error types shared across the session engine and connection services.

use thiserror::Error;

/// Errors surfaced by the session engine to the connection layer.
///
/// None of these are fatal: console commands that fail are reported back as
/// `ERROR` messages, buzzer-side failures are logged and dropped, and
/// persistence failures never disturb the in-memory session.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A referenced game, question, jingle, or buzzer does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The operation is not valid in the current session state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}
