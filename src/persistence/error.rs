//! Persistence error types.

use std::fmt;

/// Errors that can occur during persistence operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// Referenced packet does not exist
    NotFound(&'static str),
    /// Topic name or filter rejected before touching the store
    InvalidTopic {
        topic: String,
        reason: &'static str,
    },
    /// Store was destroyed
    Destroyed,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "{}", what),
            Self::InvalidTopic { topic, reason } => {
                write!(f, "invalid topic {:?}: {}", topic, reason)
            }
            Self::Destroyed => write!(f, "persistence destroyed"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl PersistenceError {
    pub(crate) fn no_such_packet() -> Self {
        Self::NotFound("no such packet")
    }

    pub(crate) fn invalid_topic(topic: &str, reason: &'static str) -> Self {
        Self::InvalidTopic {
            topic: topic.to_string(),
            reason,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
