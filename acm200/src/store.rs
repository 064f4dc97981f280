//! State store
//!
//! Single source of truth for the [`DeviceSnapshot`]. Writers (the poller, the
//! dispatcher's unsolicited events and command echoes) merge under one write
//! lock; readers get a cloned snapshot and never see a half-applied merge.
//! Every field whose value or freshness changes produces exactly one
//! [`StateChange`] on the broadcast channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use acm200_core::{Command, ZoneStatus};
use acm200_types::{DeviceSnapshot, Field, InputId, MatrixConfig, PowerState, ZoneId, ZoneState};

/// Outcome of one poll (or one unsolicited push)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollResult {
    /// Zone states the device reported
    pub observed: Vec<ZoneStatus>,

    /// Zones whose query failed; their fields become stale
    pub failed: Vec<ZoneId>,
}

impl PollResult {
    pub fn observed(observed: Vec<ZoneStatus>) -> Self {
        Self {
            observed,
            failed: Vec::new(),
        }
    }

    pub fn failed(failed: Vec<ZoneId>) -> Self {
        Self {
            observed: Vec::new(),
            failed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty() && self.failed.is_empty()
    }
}

/// Which field of a zone changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Route,
    Power,
}

/// One field of one zone changed value or freshness
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Route {
        zone: ZoneId,
        before: Field<InputId>,
        after: Field<InputId>,
    },
    Power {
        zone: ZoneId,
        before: Field<PowerState>,
        after: Field<PowerState>,
    },
}

impl StateChange {
    pub fn zone(&self) -> ZoneId {
        match self {
            Self::Route { zone, .. } | Self::Power { zone, .. } => *zone,
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Route { .. } => FieldKind::Route,
            Self::Power { .. } => FieldKind::Power,
        }
    }
}

/// Thread-safe snapshot holder with change notifications
#[derive(Debug, Clone)]
pub struct StateStore {
    snapshot: Arc<RwLock<DeviceSnapshot>>,
    changes: broadcast::Sender<StateChange>,
}

impl StateStore {
    /// Default change channel capacity
    pub const CHANNEL_CAPACITY: usize = 256;

    /// Store with every zone unknown
    pub fn new(config: &MatrixConfig) -> Self {
        let (changes, _) = broadcast::channel(Self::CHANNEL_CAPACITY);
        Self {
            snapshot: Arc::new(RwLock::new(DeviceSnapshot::new(config))),
            changes,
        }
    }

    /// Latest consistent snapshot
    pub fn read(&self) -> DeviceSnapshot {
        self.snapshot.read().clone()
    }

    /// Receive changes applied after this call
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Merge a poll result
    ///
    /// Reported values become confirmed. Route and power of failed zones are
    /// marked stale. Values the device did not report are left untouched.
    pub fn apply(&self, result: &PollResult) -> Vec<StateChange> {
        self.update(|snapshot, now, changes| {
            for zone_id in &result.failed {
                let Some(zone) = snapshot.zone_mut(*zone_id) else {
                    warn!("Poll failure reported for unknown zone {}", zone_id);
                    continue;
                };
                track_route(zone, changes, |f| f.mark_stale());
                track_power(zone, changes, |f| f.mark_stale());
            }

            for status in &result.observed {
                let Some(zone) = snapshot.zone_mut(status.zone) else {
                    warn!("Device reported unknown zone {}", status.zone);
                    continue;
                };
                if let Some(input) = status.input {
                    track_route(zone, changes, |f| f.confirm(input, now));
                }
                if let Some(power) = status.power {
                    track_power(zone, changes, |f| f.confirm(power, now));
                }
            }
        })
    }

    /// Optimistically apply a command the device accepted
    ///
    /// The assumed value is tagged optimistic until the next poll confirms
    /// or contradicts it.
    pub fn apply_command_echo(&self, command: &Command) -> Vec<StateChange> {
        self.update(|snapshot, now, changes| match *command {
            Command::SetRoute { zone, input } => {
                if let Some(zone) = snapshot.zone_mut(zone) {
                    track_route(zone, changes, |f| f.assume(input, now));
                }
            }
            Command::SetPower { zone, power } => {
                if let Some(zone) = snapshot.zone_mut(zone) {
                    track_power(zone, changes, |f| f.assume(power, now));
                }
            }
            Command::QueryZoneState(_) | Command::QueryAllState => {}
        })
    }

    /// Mark the field a failed command targeted as stale
    pub fn mark_command_failed(&self, command: &Command) -> Vec<StateChange> {
        self.update(|snapshot, _, changes| match *command {
            Command::SetRoute { zone, .. } => {
                if let Some(zone) = snapshot.zone_mut(zone) {
                    track_route(zone, changes, |f| f.mark_stale());
                }
            }
            Command::SetPower { zone, .. } => {
                if let Some(zone) = snapshot.zone_mut(zone) {
                    track_power(zone, changes, |f| f.mark_stale());
                }
            }
            Command::QueryZoneState(_) | Command::QueryAllState => {}
        })
    }

    fn update<F>(&self, merge: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut DeviceSnapshot, DateTime<Utc>, &mut Vec<StateChange>),
    {
        let mut changes = Vec::new();
        let now = Utc::now();

        {
            let mut snapshot = self.snapshot.write();
            merge(&mut snapshot, now, &mut changes);
            snapshot.taken_at = now;
        }

        if !changes.is_empty() {
            debug!("State store applied {} change(s)", changes.len());
        }

        for change in &changes {
            trace!("State change: {:?}", change);
            // no subscribers is fine
            let _ = self.changes.send(change.clone());
        }

        changes
    }
}

fn track_route(
    zone: &mut ZoneState,
    changes: &mut Vec<StateChange>,
    op: impl FnOnce(&mut Field<InputId>) -> bool,
) {
    let before = zone.route.clone();
    if op(&mut zone.route) {
        changes.push(StateChange::Route {
            zone: zone.id,
            before,
            after: zone.route.clone(),
        });
    }
}

fn track_power(
    zone: &mut ZoneState,
    changes: &mut Vec<StateChange>,
    op: impl FnOnce(&mut Field<PowerState>) -> bool,
) {
    let before = zone.power.clone();
    if op(&mut zone.power) {
        changes.push(StateChange::Power {
            zone: zone.id,
            before,
            after: zone.power.clone(),
        });
    }
}
