//! Freshness-tagged device state
//!
//! The matrix cannot report everything about its receivers and transmitters,
//! so every piece of state carries a [`Freshness`] tag alongside its value.
//! Unknown values are never presented as concrete ones.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::MatrixConfig;
use crate::ids::{Input, InputId, PowerState, ZoneId};

/// How trustworthy a field's value is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Freshness {
    /// Never observed
    #[default]
    Unknown,

    /// Reported by the device in the last poll or push
    Confirmed,

    /// Was confirmed, but a later poll or command against it failed
    Stale,

    /// Assumed locally after the device accepted a command, not yet polled
    Optimistic,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Confirmed => "confirmed",
            Self::Stale => "stale",
            Self::Optimistic => "optimistic",
        };
        f.write_str(name)
    }
}

/// A single state value with its freshness
///
/// Transitions:
///
/// ```text
///   confirm(v)   any        -> Confirmed(v)
///   mark_stale   Confirmed  -> Stale (value kept)
///                Optimistic -> Stale(last confirmed) | Unknown
///   assume(v)    any        -> Optimistic(v), unless already Confirmed(v)
/// ```
///
/// A confirmed value never degrades straight to unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field<T> {
    value: Option<T>,
    freshness: Freshness,
    updated_at: Option<DateTime<Utc>>,
    confirmed: Option<T>,
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self {
            value: None,
            freshness: Freshness::Unknown,
            updated_at: None,
            confirmed: None,
        }
    }
}

impl<T: Copy + PartialEq> Field<T> {
    /// A field that has never been observed
    pub fn unknown() -> Self {
        Self::default()
    }

    /// A field holding a device-confirmed value
    pub fn confirmed(value: T, at: DateTime<Utc>) -> Self {
        Self {
            value: Some(value),
            freshness: Freshness::Confirmed,
            updated_at: Some(at),
            confirmed: Some(value),
        }
    }

    /// Best available value, `None` when unknown
    pub fn value(&self) -> Option<T> {
        self.value
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    /// When the current value was last set or confirmed
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Last value the device itself reported
    pub fn last_confirmed(&self) -> Option<T> {
        self.confirmed
    }

    pub fn is_confirmed(&self) -> bool {
        self.freshness == Freshness::Confirmed
    }

    /// Whether two fields present the same value and freshness
    pub fn same_state(&self, other: &Self) -> bool {
        self.value == other.value && self.freshness == other.freshness
    }

    /// Record a value reported by the device. Returns `true` if the
    /// observable state changed.
    pub fn confirm(&mut self, value: T, at: DateTime<Utc>) -> bool {
        let changed = self.value != Some(value) || self.freshness != Freshness::Confirmed;
        self.value = Some(value);
        self.freshness = Freshness::Confirmed;
        self.updated_at = Some(at);
        self.confirmed = Some(value);
        changed
    }

    /// Flag the value untrustworthy after a failed poll or command.
    pub fn mark_stale(&mut self) -> bool {
        match self.freshness {
            Freshness::Confirmed => {
                self.freshness = Freshness::Stale;
                true
            }
            Freshness::Optimistic => {
                // roll back to what the device last said
                self.value = self.confirmed;
                self.freshness = if self.confirmed.is_some() {
                    Freshness::Stale
                } else {
                    Freshness::Unknown
                };
                true
            }
            Freshness::Unknown | Freshness::Stale => false,
        }
    }

    /// Optimistically assume a value the device has just accepted.
    pub fn assume(&mut self, value: T, at: DateTime<Utc>) -> bool {
        let already = self.value == Some(value)
            && matches!(self.freshness, Freshness::Confirmed | Freshness::Optimistic);
        if already {
            return false;
        }

        self.value = Some(value);
        self.freshness = Freshness::Optimistic;
        self.updated_at = Some(at);
        true
    }
}

/// State of one output zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneState {
    pub id: ZoneId,
    pub label: Option<String>,
    pub route: Field<InputId>,
    pub power: Field<PowerState>,
}

impl ZoneState {
    pub fn new(id: ZoneId, label: Option<String>) -> Self {
        Self {
            id,
            label,
            route: Field::unknown(),
            power: Field::unknown(),
        }
    }

    /// Friendly label, or `Output 001` style fallback
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("Output {:03}", self.id.get()),
        }
    }
}

/// Every zone, route and power value known at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub zones: Vec<ZoneState>,
    pub inputs: Vec<Input>,
    pub taken_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    /// Initial snapshot: all zones unknown
    pub fn new(config: &MatrixConfig) -> Self {
        Self {
            zones: config
                .zone_ids()
                .map(|id| ZoneState::new(id, config.zone_label(id)))
                .collect(),
            inputs: config.inputs(),
            taken_at: Utc::now(),
        }
    }

    pub fn zone(&self, id: ZoneId) -> Option<&ZoneState> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn zone_mut(&mut self, id: ZoneId) -> Option<&mut ZoneState> {
        self.zones.iter_mut().find(|z| z.id == id)
    }

    pub fn input(&self, id: InputId) -> Option<&Input> {
        self.inputs.iter().find(|i| i.id == id)
    }

    /// Best known route per zone; zones with no known input are omitted
    pub fn routes(&self) -> BTreeMap<ZoneId, InputId> {
        self.zones
            .iter()
            .filter_map(|z| z.route.value().map(|input| (z.id, input)))
            .collect()
    }

    /// Zones currently showing `input`
    pub fn zones_fed_by(&self, input: InputId) -> Vec<ZoneId> {
        self.zones
            .iter()
            .filter(|z| z.route.value() == Some(input))
            .map(|z| z.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn input(n: u16) -> InputId {
        InputId::new(n).unwrap()
    }

    #[test]
    fn test_confirm_reports_change_once() {
        let mut field = Field::unknown();
        assert!(field.confirm(input(2), Utc::now()));
        assert!(!field.confirm(input(2), Utc::now()));
        assert!(field.confirm(input(3), Utc::now()));
        assert_eq!(field.value(), Some(input(3)));
    }

    #[test]
    fn test_stale_keeps_confirmed_value() {
        let mut field = Field::confirmed(input(1), Utc::now());
        assert!(field.mark_stale());
        assert_eq!(field.freshness(), Freshness::Stale);
        assert_eq!(field.value(), Some(input(1)));

        // already stale
        assert!(!field.mark_stale());
    }

    #[test]
    fn test_unknown_stays_unknown_when_stale_marked() {
        let mut field: Field<InputId> = Field::unknown();
        assert!(!field.mark_stale());
        assert_eq!(field.freshness(), Freshness::Unknown);
        assert_eq!(field.value(), None);
    }

    #[test]
    fn test_optimistic_rolls_back_on_stale() {
        let mut field = Field::confirmed(input(1), Utc::now());
        assert!(field.assume(input(3), Utc::now()));
        assert_eq!(field.freshness(), Freshness::Optimistic);
        assert_eq!(field.last_confirmed(), Some(input(1)));

        assert!(field.mark_stale());
        assert_eq!(field.value(), Some(input(1)));
        assert_eq!(field.freshness(), Freshness::Stale);
    }

    #[test]
    fn test_optimistic_without_history_rolls_back_to_unknown() {
        let mut field = Field::unknown();
        field.assume(PowerState::On, Utc::now());
        field.mark_stale();
        assert_eq!(field.value(), None);
        assert_eq!(field.freshness(), Freshness::Unknown);
    }

    #[test]
    fn test_assume_matching_confirmed_is_noop() {
        let mut field = Field::confirmed(PowerState::On, Utc::now());
        let before = field.clone();
        assert!(!field.assume(PowerState::On, Utc::now()));
        assert_eq!(field, before);
    }

    #[test]
    fn test_snapshot_fan_out() {
        let config = MatrixConfig::new("10.0.0.5").with_zones(3).with_inputs(2);
        let mut snapshot = DeviceSnapshot::new(&config);
        let now = Utc::now();
        for zone in [1, 3] {
            snapshot
                .zone_mut(ZoneId::new(zone).unwrap())
                .unwrap()
                .route
                .confirm(input(2), now);
        }

        let fed = snapshot.zones_fed_by(input(2));
        assert_eq!(fed, vec![ZoneId::new(1).unwrap(), ZoneId::new(3).unwrap()]);
        assert_eq!(snapshot.routes().len(), 2);
        assert_eq!(snapshot.inputs.len(), 2);
    }
}
