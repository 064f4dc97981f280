//! Periodic state polling
//!
//! A poll cycle asks the device for every zone and merges the answers into
//! the [`StateStore`]. Queries go through the [`Dispatcher`] like any other
//! command, so polls interleave with user commands in FIFO order.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use acm200_core::{Command, ZoneStatus};
use acm200_types::ZoneId;

use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::store::{PollResult, StateChange, StateStore};

/// What one poll cycle achieved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Zones the device answered for
    pub confirmed: Vec<ZoneId>,

    /// Zones whose query failed
    pub failed: Vec<ZoneId>,

    /// Store changes the cycle produced
    pub changes: Vec<StateChange>,
}

impl PollOutcome {
    /// Every zone answered
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Polls zone state through the dispatcher
#[derive(Debug, Clone)]
pub struct Poller {
    inner: Arc<PollerInner>,
}

#[derive(Debug)]
struct PollerInner {
    dispatcher: Dispatcher,
    store: StateStore,
    diagnostics: Diagnostics,
    zones: Vec<ZoneId>,
    bulk: AtomicBool,
}

impl Poller {
    pub fn new(
        dispatcher: Dispatcher,
        store: StateStore,
        diagnostics: Diagnostics,
        zones: Vec<ZoneId>,
        bulk_query: bool,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                dispatcher,
                store,
                diagnostics,
                zones,
                bulk: AtomicBool::new(bulk_query),
            }),
        }
    }

    /// Whether cycles still start with a bulk `STATUS` query
    pub fn uses_bulk_query(&self) -> bool {
        self.inner.bulk.load(Ordering::Acquire)
    }

    /// Run one poll cycle and merge the result
    ///
    /// Never fails: zones that could not be read are reported in
    /// [`PollOutcome::failed`] and marked stale in the store.
    pub async fn poll_once(&self) -> PollOutcome {
        let inner = &self.inner;
        let mut observed: Vec<ZoneStatus> = Vec::new();
        let mut failed: Vec<ZoneId> = Vec::new();

        if self.uses_bulk_query() {
            match inner.dispatcher.execute(Command::QueryAllState).await {
                Ok(reply) => {
                    observed.extend(
                        reply
                            .statuses()
                            .iter()
                            .filter(|s| inner.zones.contains(&s.zone))
                            .copied(),
                    );
                }
                Err(Error::CommandRejected { reason, .. }) => {
                    info!("Bulk status query rejected ({}); polling zones individually", reason);
                    inner.bulk.store(false, Ordering::Release);
                    inner.diagnostics.publish(DiagnosticEvent::BulkQueryDisabled);
                }
                Err(e) => {
                    warn!("Bulk status query failed: {}", e);
                    inner.diagnostics.publish(DiagnosticEvent::PollFailed {
                        reason: e.to_string(),
                    });
                    return self.finish(Vec::new(), inner.zones.clone());
                }
            }
        }

        let answered: BTreeSet<ZoneId> = observed.iter().map(|s| s.zone).collect();
        let missing: Vec<ZoneId> = inner
            .zones
            .iter()
            .copied()
            .filter(|z| !answered.contains(z))
            .collect();

        if !missing.is_empty() && !answered.is_empty() {
            debug!("Bulk answer missed {} zone(s); querying them individually", missing.len());
        }

        let mut remaining = missing.into_iter();
        while let Some(zone) = remaining.next() {
            match inner.dispatcher.execute(Command::QueryZoneState(zone)).await {
                Ok(reply) => observed.extend(reply.statuses().iter().copied()),
                Err(e @ Error::DeviceUnreachable { .. }) | Err(e @ Error::Shutdown) => {
                    warn!("Stopping zone sweep at {}: {}", zone, e);
                    failed.push(zone);
                    failed.extend(remaining.by_ref());
                }
                Err(e) => {
                    warn!("Status query for zone {} failed: {}", zone, e);
                    failed.push(zone);
                }
            }
        }

        self.finish(observed, failed)
    }

    fn finish(&self, observed: Vec<ZoneStatus>, failed: Vec<ZoneId>) -> PollOutcome {
        let inner = &self.inner;
        let confirmed: Vec<ZoneId> = observed.iter().map(|s| s.zone).collect();

        let result = PollResult { observed, failed };
        let changes = inner.store.apply(&result);

        debug!(
            "Poll cycle done: {} zone(s) confirmed, {} failed, {} change(s)",
            confirmed.len(),
            result.failed.len(),
            changes.len()
        );
        inner.diagnostics.publish(DiagnosticEvent::PollCompleted {
            confirmed: confirmed.len(),
            failed: result.failed.clone(),
        });

        PollOutcome {
            confirmed,
            failed: result.failed,
            changes,
        }
    }

    /// Run poll cycles every `period`, starting immediately
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(&self, period: Duration) -> PollerHandle {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let poller = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now(), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Polling every {:?}", period);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {}
                }
                // a started cycle always runs to completion
                poller.poll_once().await;
            }

            debug!("Poller stopped");
        });

        PollerHandle { stop, task }
    }
}

/// Running poll loop
#[derive(Debug)]
pub struct PollerHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Prevent further cycles and wait for the in-flight one to finish
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!("Poller task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
