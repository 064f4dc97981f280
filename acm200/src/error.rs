//! High-level error types

use acm200_core::Command;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] acm200_core::Error),
    
    #[error("Transport error: {0}")]
    Transport(#[from] acm200_transport::Error),
    
    #[error("Type error: {0}")]
    Types(#[from] acm200_types::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Device rejected {command}: {reason}")]
    CommandRejected {
        command: String,
        reason: String,
    },

    #[error("{command} timed out after {attempts} attempt(s)")]
    CommandTimeout {
        command: Command,
        attempts: u32,
    },

    #[error("Device unreachable after {attempts} attempt(s): {reason}")]
    DeviceUnreachable {
        attempts: u32,
        reason: String,
    },

    #[error("Unknown source {0:?}")]
    UnknownSource(String),

    #[error("Dispatcher has shut down")]
    Shutdown,
}

impl Error {
    /// Check if retrying later might succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_recoverable(),
            Self::Transport(_)
            | Self::CommandTimeout { .. }
            | Self::DeviceUnreachable { .. } => true,
            Self::Types(_)
            | Self::InvalidCommand(_)
            | Self::CommandRejected { .. }
            | Self::UnknownSource(_)
            | Self::Shutdown => false,
        }
    }

    /// Lift core errors that have a dedicated top-level variant
    pub(crate) fn from_core(error: acm200_core::Error) -> Self {
        match error {
            acm200_core::Error::InvalidCommand(msg) => Self::InvalidCommand(msg),
            acm200_core::Error::Rejected { command, reason } => {
                Self::CommandRejected { command, reason }
            }
            other => Self::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_core_lifts_rejection() {
        let err = Error::from_core(acm200_core::Error::Rejected {
            command: "STATUS".into(),
            reason: "unsupported".into(),
        });
        assert!(matches!(err, Error::CommandRejected { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_timeouts_are_recoverable() {
        let err = Error::DeviceUnreachable {
            attempts: 3,
            reason: "connection refused".into(),
        };
        assert!(err.is_recoverable());
        assert!(!Error::Shutdown.is_recoverable());
    }
}
