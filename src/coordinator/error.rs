//! Typed errors for the coordinator client.

use thiserror::Error;

/// Errors surfaced by [`super::client::CoordinatorClient`].
///
/// Callers distinguish `Transport` (retryable, logged and retried on the
/// next tick per the error-handling design) from `Decode` (a malformed
/// value returned by the coordinator, never fatal).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("coordinator returned malformed value for key '{key}': {reason}")]
    Decode { key: String, reason: String },

    #[error("coordinator responded with unexpected status {status} for key '{key}'")]
    UnexpectedStatus { key: String, status: u16 },
}

impl CoordinatorError {
    #[must_use]
    pub fn decode(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Transport errors are the only ones worth retrying; a bad status or
    /// a decode failure means the coordinator answered and we should act on it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
