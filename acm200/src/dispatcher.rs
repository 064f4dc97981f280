//! Command dispatcher
//!
//! All traffic to the matrix goes through one worker task that owns the
//! [`Transport`]. Callers submit commands over a FIFO queue and wait on a
//! oneshot reply, so at most one request is ever outstanding on the wire and
//! commands leave in the order they were submitted.
//!
//! ```text
//! execute() ──► mpsc queue ──► Worker ──► Transport ──► device
//!    ▲                           │
//!    └──────── oneshot ◄─────────┘   (unsolicited events ──► StateStore)
//! ```
//!
//! The worker owns the retry policy. Timeouts are retried with exponential
//! backoff up to `max_attempts`; a lost link is reconnected and the command
//! resubmitted. Only when reconnecting keeps failing does every queued caller
//! get [`Error::DeviceUnreachable`].
//!
//! The worker also merges each command's outcome into the [`StateStore`]
//! (optimistic echo or stale marking) before answering the caller, so a poll
//! queued behind a command always lands after that command's echo.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use acm200_core::{decode, encode, Collect, Command, DecodedMessage, Reply, ReplyCollector, Session};
use acm200_transport::Transport;
use acm200_types::{Capacity, MatrixConfig};

use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::error::{Error, Result};
use crate::store::{PollResult, StateStore};

/// Retry and queue settings for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub capacity: Capacity,
    pub command_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub reconnect_attempts: u32,
    pub queue_capacity: usize,
}

impl DispatchSettings {
    pub fn from_config(config: &MatrixConfig) -> Self {
        Self {
            capacity: config.capacity(),
            command_timeout: config.command_timeout,
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            reconnect_attempts: config.reconnect_attempts.max(1),
            queue_capacity: config.queue_capacity.max(1),
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}

/// Lifecycle of the request in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Pending,
    Success,
    Failure,
    Timeout,
}

/// The single request awaiting a device reply
#[derive(Debug)]
pub struct PendingCommand {
    /// Correlation key (wire text)
    pub key: String,
    pub command: Command,
    pub issued_at: Instant,
    pub attempts: u32,
    pub status: PendingStatus,
}

impl PendingCommand {
    fn new(command: Command) -> Self {
        Self {
            key: command.to_string(),
            command,
            issued_at: Instant::now(),
            attempts: 0,
            status: PendingStatus::Pending,
        }
    }

    fn finish(&mut self, status: PendingStatus) {
        self.status = status;
        debug!(
            "{} finished as {:?} after {} attempt(s) in {:?}",
            self.key,
            self.status,
            self.attempts,
            self.issued_at.elapsed()
        );
    }
}

enum Job {
    Connect,
    Execute(Command),
}

struct Request {
    job: Job,
    respond_to: oneshot::Sender<Result<Reply>>,
}

/// Handle for submitting commands; cheap to clone
///
/// The worker stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    queue: mpsc::Sender<Request>,
    capacity: Capacity,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.job {
            Job::Connect => f.write_str("Request(connect)"),
            Job::Execute(command) => write!(f, "Request({})", command),
        }
    }
}

impl Dispatcher {
    /// Start the worker task. Must be called from within a Tokio runtime.
    pub fn spawn(
        transport: Box<dyn Transport>,
        settings: DispatchSettings,
        session: Session,
        store: StateStore,
        diagnostics: Diagnostics,
    ) -> (Self, JoinHandle<()>) {
        let (queue, requests) = mpsc::channel(settings.queue_capacity);
        let capacity = settings.capacity;

        let worker = Worker {
            transport,
            settings,
            session,
            store,
            diagnostics,
        };
        let task = tokio::spawn(worker.run(requests));

        (Self { queue, capacity }, task)
    }

    /// Run one command and wait for its reply
    ///
    /// Commands addressing ports outside the configured capacity are rejected
    /// here and never reach the device. Dropping the returned future stops
    /// waiting but does not retract a command already queued or sent.
    pub async fn execute(&self, command: Command) -> Result<Reply> {
        command.validate(&self.capacity).map_err(Error::from_core)?;
        self.submit(Job::Execute(command)).await
    }

    /// Make sure the link is up
    pub async fn connect(&self) -> Result<()> {
        self.submit(Job::Connect).await.map(|_| ())
    }

    async fn submit(&self, job: Job) -> Result<Reply> {
        let (respond_to, response) = oneshot::channel();
        self.queue
            .send(Request { job, respond_to })
            .await
            .map_err(|_| Error::Shutdown)?;
        response.await.map_err(|_| Error::Shutdown)?
    }
}

/// Why one send/receive exchange did not produce a reply
enum AttemptError {
    TimedOut,
    Rejected(acm200_core::Error),
    Link(acm200_transport::Error),
}

enum LastFailure {
    Timeout,
    Link(acm200_transport::Error),
}

struct Worker {
    transport: Box<dyn Transport>,
    settings: DispatchSettings,
    session: Session,
    store: StateStore,
    diagnostics: Diagnostics,
}

impl Worker {
    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        while let Some(request) = requests.recv().await {
            trace!("Dequeued {:?}", request);

            let outcome = match request.job {
                Job::Connect => self.ensure_connected().await.map(|_| Reply::Accepted),
                Job::Execute(command) => self.process(command).await,
            };
            let unreachable = matches!(outcome, Err(Error::DeviceUnreachable { .. }));

            if request.respond_to.send(outcome).is_err() {
                debug!("Caller stopped waiting; reply dropped");
            }

            if unreachable {
                self.drain(&mut requests);
            }
        }

        self.shutdown().await;
    }

    /// Fail everything still queued after the device became unreachable
    fn drain(&mut self, requests: &mut mpsc::Receiver<Request>) {
        let mut drained = 0;
        while let Ok(request) = requests.try_recv() {
            if let Job::Execute(command) = request.job {
                self.store.mark_command_failed(&command);
            }
            let _ = request.respond_to.send(Err(Error::DeviceUnreachable {
                attempts: 0,
                reason: "queued behind a command that found the device unreachable".into(),
            }));
            drained += 1;
        }
        if drained > 0 {
            warn!("Drained {} queued command(s): device unreachable", drained);
        }
    }

    /// Run a command and merge its outcome before the next request is dequeued
    async fn process(&mut self, command: Command) -> Result<Reply> {
        let outcome = self.exchange(command).await;
        match &outcome {
            Ok(_) => self.store.apply_command_echo(&command),
            Err(_) => self.store.mark_command_failed(&command),
        };
        outcome
    }

    async fn exchange(&mut self, command: Command) -> Result<Reply> {
        let mut pending = PendingCommand::new(command);
        let wire = encode(&command);

        loop {
            if let Err(e) = self.ensure_connected().await {
                pending.finish(PendingStatus::Failure);
                self.report_failure(command, &e);
                return Err(e);
            }

            pending.attempts += 1;
            debug!("Sending {} (attempt {}/{})", pending.key, pending.attempts, self.settings.max_attempts);

            let last = match self.attempt(command, &wire).await {
                Ok(reply) => {
                    pending.finish(PendingStatus::Success);
                    return Ok(reply);
                }
                Err(AttemptError::Rejected(e)) => {
                    pending.finish(PendingStatus::Failure);
                    let e = Error::from_core(e);
                    self.report_failure(command, &e);
                    return Err(e);
                }
                Err(AttemptError::TimedOut) => {
                    warn!("No reply to {} within {:?}", pending.key, self.settings.command_timeout);
                    LastFailure::Timeout
                }
                Err(AttemptError::Link(e)) => {
                    self.link_lost(&e.to_string()).await;
                    LastFailure::Link(e)
                }
            };

            if pending.attempts >= self.settings.max_attempts {
                let e = match last {
                    LastFailure::Timeout => {
                        pending.finish(PendingStatus::Timeout);
                        Error::CommandTimeout {
                            command,
                            attempts: pending.attempts,
                        }
                    }
                    // no reconnect was tried, so the queue behind us is left alone
                    LastFailure::Link(e) => {
                        pending.finish(PendingStatus::Failure);
                        Error::Transport(e)
                    }
                };
                self.report_failure(command, &e);
                return Err(e);
            }

            // a lost link is resubmitted as soon as the reconnect succeeds
            if let LastFailure::Timeout = last {
                let delay = self.settings.backoff(pending.attempts);
                self.diagnostics.publish(DiagnosticEvent::CommandRetry {
                    command,
                    attempt: pending.attempts,
                    delay,
                });
                sleep(delay).await;
            }
        }
    }

    /// One send plus the wait for its reply
    async fn attempt(
        &mut self,
        command: Command,
        wire: &[u8],
    ) -> std::result::Result<Reply, AttemptError> {
        self.transport.send(wire).await.map_err(AttemptError::Link)?;
        let seq = self.session.record_command();
        trace!("Sent #{}: {}", seq, command);

        let deadline = Instant::now() + self.settings.command_timeout;
        let mut collector = ReplyCollector::new(command);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AttemptError::TimedOut);
            }

            let frame = match self.transport.receive(remaining).await {
                Ok(frame) => frame,
                Err(acm200_transport::Error::ReadTimeout) => return Err(AttemptError::TimedOut),
                Err(e) => return Err(AttemptError::Link(e)),
            };

            match decode(&frame) {
                Err(e) => {
                    warn!("Discarding frame: {}", e);
                    self.diagnostics.publish(DiagnosticEvent::FrameDiscarded {
                        frame: String::from_utf8_lossy(&frame).into_owned(),
                        reason: e.to_string(),
                    });
                }
                Ok(DecodedMessage::Event(status)) => {
                    debug!("Unsolicited status: {}", status);
                    self.store.apply(&PollResult::observed(vec![status]));
                }
                Ok(DecodedMessage::Reply(line)) => match collector.accept(line) {
                    Collect::Pending => {}
                    Collect::Done(Ok(reply)) => return Ok(reply),
                    Collect::Done(Err(e)) => return Err(AttemptError::Rejected(e)),
                    Collect::Stray(line) => {
                        debug!("Discarding stray reply {:?} while waiting for {}", line, collector.key());
                        self.diagnostics.publish(DiagnosticEvent::FrameDiscarded {
                            frame: String::from_utf8_lossy(&frame).into_owned(),
                            reason: format!("does not answer {}", collector.key()),
                        });
                    }
                },
            }
        }
    }

    /// Connect if needed, retrying with backoff
    ///
    /// Only the worker touches the transport, so at most one connect attempt
    /// runs at a time.
    async fn ensure_connected(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }

        let addr = self.transport.remote_addr();
        self.session.close();
        self.session.begin_connect()?;

        let attempts = self.settings.reconnect_attempts;
        let mut reason = String::new();

        for attempt in 1..=attempts {
            match self.transport.connect().await {
                Ok(()) => {
                    let epoch = self.session.establish()?;
                    info!("Connected to {} (epoch {})", addr, epoch);
                    self.diagnostics.publish(DiagnosticEvent::Connected {
                        addr,
                        epoch,
                    });
                    return Ok(());
                }
                Err(e) => {
                    warn!("Connect to {} failed (attempt {}/{}): {}", addr, attempt, attempts, e);
                    reason = e.to_string();
                    self.diagnostics.publish(DiagnosticEvent::ConnectFailed {
                        addr: addr.clone(),
                        attempt,
                        reason: reason.clone(),
                    });
                    if attempt < attempts {
                        sleep(self.settings.backoff(attempt)).await;
                    }
                }
            }
        }

        self.session.close();
        Err(Error::DeviceUnreachable { attempts, reason })
    }

    async fn link_lost(&mut self, reason: &str) {
        let addr = self.transport.remote_addr();
        warn!("Lost connection to {}: {}", addr, reason);

        if self.transport.is_connected() {
            let _ = self.transport.disconnect().await;
        }
        self.session.close();
        self.diagnostics.publish(DiagnosticEvent::ConnectionLost {
            addr,
            reason: reason.to_string(),
        });
    }

    fn report_failure(&self, command: Command, error: &Error) {
        warn!("{} failed: {}", command, error);
        self.diagnostics.publish(DiagnosticEvent::CommandFailed {
            command,
            error: error.to_string(),
        });
    }

    async fn shutdown(&mut self) {
        if self.transport.is_connected() {
            info!("Dispatcher stopping; disconnecting from {}", self.transport.remote_addr());
            if let Err(e) = self.transport.disconnect().await {
                warn!("Disconnect failed: {}", e);
            }
        }
        self.session.close();
    }
}
