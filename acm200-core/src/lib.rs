//! # acm200-core
//!
//! Core protocol implementation for the Blustream ACM200 matrix.
//!
//! This crate provides the low-level protocol primitives:
//! - Command definitions and validation
//! - Line encoding/decoding
//! - Reply correlation for the half-duplex request/reply exchange
//! - Connection session tracking
//! - Protocol constants

pub mod codec;
pub mod command;
pub mod constants;
pub mod error;
pub mod reply;
pub mod session;

pub use codec::{DecodedMessage, ReplyLine, ZoneStatus, decode, encode};
pub use command::Command;
pub use error::{Error, Result};
pub use reply::{Collect, Reply, ReplyCollector};
pub use session::{Session, SessionState};

/// Longest line accepted from the device
pub const MAX_LINE_LENGTH: usize = 4096;
