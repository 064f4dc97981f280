//! Transport layer for the ACM200 protocol
//!
//! Provides the line-framed TCP link to the matrix control port.

pub mod tcp;
pub mod error;

pub use error::{Error, Result};
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Transport trait for the matrix control link
///
/// A transport owns at most one connection. Any I/O failure closes it; the
/// owner decides whether and when to call [`Transport::connect`] again.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;
    
    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;
    
    /// Check if connected
    fn is_connected(&self) -> bool;
    
    /// Send one complete frame
    async fn send(&mut self, data: &[u8]) -> Result<()>;
    
    /// Receive the next frame (with timeout)
    ///
    /// Frames arrive in order; each successful connect starts a new sequence.
    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut>;
    
    /// Get remote address
    fn remote_addr(&self) -> String;
}
