//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,
    
    #[error("Already connected")]
    AlreadyConnected,
    
    #[error("Connection timeout")]
    ConnectionTimeout,
    
    #[error("Read timeout")]
    ReadTimeout,
    
    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Frame exceeds {max} bytes")]
    FrameTooLong {
        max: usize,
    },
    
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Check if the link is gone and must be reconnected
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::ConnectionClosed
                | Self::FrameTooLong { .. }
                | Self::Io(_)
        )
    }

    /// Check if the error happened while opening the link
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout | Self::InvalidAddress(_) | Self::Io(_)
        )
    }
}
