//! Error types for acm200-core



/// Result type alias for acm200 protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Line could not be parsed
    #[error("Malformed frame {frame:?}: {reason}")]
    MalformedFrame {
        frame: String,
        reason: String,
    },

    /// Command refers to a zone or input the matrix does not have
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Device answered with ERR
    #[error("Device rejected {command}: {reason}")]
    Rejected {
        command: String,
        reason: String,
    },

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Value outside what the protocol can express
    #[error("Type error: {0}")]
    Types(#[from] acm200_types::Error),
}

impl Error {
    pub(crate) fn malformed(frame: &str, reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            frame: frame.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if error is recoverable (the exchange can continue)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedFrame { .. })
    }
}
