//! Session management for the ACM200 control link
//!
//! A session represents the link to the device and tracks:
//! - Link state
//! - Connection epoch (increments per successful connect)
//! - Commands sent on the link

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection
    Disconnected,

    /// Connect attempt in progress
    Connecting,

    /// Ready for commands
    Connected,
}

/// Session tracker
///
/// Thread-safe and can be cloned cheaply (Arc internally). The dispatcher
/// worker drives the transitions; everyone else only reads.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Successful connects so far
    epoch: AtomicU32,

    /// Commands written to the link (retries included)
    commands_sent: AtomicU64,

    /// Current session state
    state: parking_lot::RwLock<SessionState>,
}

impl Session {
    /// Create a new disconnected session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                epoch: AtomicU32::new(0),
                commands_sent: AtomicU64::new(0),
                state: parking_lot::RwLock::new(SessionState::Disconnected),
            }),
        }
    }

    /// Number of connections established so far
    pub fn epoch(&self) -> u32 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        matches!(self.state(), SessionState::Connected)
    }

    /// Start a connect attempt
    pub fn begin_connect(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != SessionState::Disconnected {
            return Err(Error::InvalidSessionState(
                format!("Cannot connect from state: {:?}", *state)
            ));
        }

        *state = SessionState::Connecting;
        Ok(())
    }

    /// Mark the connect attempt successful, returns the new epoch
    pub fn establish(&self) -> Result<u32> {
        let mut state = self.inner.state.write();

        if *state != SessionState::Connecting {
            return Err(Error::InvalidSessionState(
                format!("Cannot establish from state: {:?}", *state)
            ));
        }

        *state = SessionState::Connected;
        Ok(self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Close session
    pub fn close(&self) {
        *self.inner.state.write() = SessionState::Disconnected;
    }

    /// Count one command written to the link, returns its sequence number
    pub fn record_command(&self) -> u64 {
        self.inner.commands_sent.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn commands_sent(&self) -> u64 {
        self.inner.commands_sent.load(Ordering::Acquire)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
