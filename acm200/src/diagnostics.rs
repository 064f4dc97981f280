//! Structured diagnostic events for the host's telemetry layer
//!
//! Every event is also logged through `tracing` at the point it is raised;
//! the bus only fans events out to whoever subscribed.

use std::time::Duration;

use tokio::sync::broadcast;

use acm200_core::Command;
use acm200_types::ZoneId;

/// Something noteworthy happened on the control link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// Link established (epoch counts connects)
    Connected { addr: String, epoch: u32 },

    /// Link lost or closed
    ConnectionLost { addr: String, reason: String },

    /// Connect attempt failed
    ConnectFailed { addr: String, attempt: u32, reason: String },

    /// Command attempt timed out and will be retried
    CommandRetry { command: Command, attempt: u32, delay: Duration },

    /// Command finished with an error
    CommandFailed { command: Command, error: String },

    /// Unparseable or uncorrelated line thrown away
    FrameDiscarded { frame: String, reason: String },

    /// Bulk status query failed; the cycle marks every zone stale
    PollFailed { reason: String },

    /// Poll cycle finished
    PollCompleted { confirmed: usize, failed: Vec<ZoneId> },

    /// Bulk query unsupported; poller switched to per-zone queries
    BulkQueryDisabled,
}

/// Broadcast bus for [`DiagnosticEvent`]s
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
#[derive(Debug, Clone)]
pub struct Diagnostics {
    sender: broadcast::Sender<DiagnosticEvent>,
}

impl Diagnostics {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: DiagnosticEvent) {
        // no receivers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = Diagnostics::default();
        bus.publish(DiagnosticEvent::BulkQueryDisabled);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = Diagnostics::new(4);
        let mut rx = bus.subscribe();

        bus.publish(DiagnosticEvent::Connected {
            addr: "10.0.0.1:23".into(),
            epoch: 1,
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            DiagnosticEvent::Connected {
                addr: "10.0.0.1:23".into(),
                epoch: 1
            }
        );
    }
}
