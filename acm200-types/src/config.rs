//! Static matrix configuration
//!
//! A [`MatrixConfig`] is handed to the control core once at construction.
//! Changing any value requires building a new core.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ids::{Input, InputId, MAX_PORT, ZoneId};

/// Default telnet-style control port
pub const DEFAULT_PORT: u16 = 23;

/// Default number of outputs (receivers)
pub const DEFAULT_ZONES: u16 = 9;

/// Default number of inputs (transmitters)
pub const DEFAULT_INPUTS: u16 = 4;

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest poll interval accepted; shorter values are clamped
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Number of zones and inputs a matrix exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub zones: u16,
    pub inputs: u16,
}

impl Capacity {
    pub fn new(zones: u16, inputs: u16) -> Self {
        Self { zones, inputs }
    }

    pub fn contains_zone(&self, zone: ZoneId) -> bool {
        zone.get() <= self.zones
    }

    pub fn contains_input(&self, input: InputId) -> bool {
        input.get() <= self.inputs
    }
}

/// Matrix connection and behaviour settings
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use acm200_types::MatrixConfig;
///
/// let config = MatrixConfig::new("192.168.1.50")
///     .with_zones(8)
///     .with_inputs(4)
///     .with_input_label(1, "Apple TV")
///     .with_poll_interval(Duration::from_secs(15));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.device_key(), "192.168.1.50:23");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixConfig {
    /// Device host name or IP
    pub host: String,

    /// Control port
    pub port: u16,

    /// Number of output zones
    pub zones: u16,

    /// Number of inputs
    pub inputs: u16,

    /// Friendly input names, keyed by input number
    pub input_labels: BTreeMap<u16, String>,

    /// Friendly zone names, keyed by zone number
    pub zone_labels: BTreeMap<u16, String>,

    /// Interval between poll cycles
    pub poll_interval: Duration,

    /// How long one command attempt waits for its reply
    pub command_timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Total send attempts per command before giving up
    pub max_attempts: u32,

    /// First retry delay; doubles per retry
    pub backoff_base: Duration,

    /// Upper bound for the retry delay
    pub backoff_max: Duration,

    /// Connect attempts before the device is declared unreachable
    pub reconnect_attempts: u32,

    /// Whether the device answers the bulk `STATUS` query
    pub bulk_query: bool,

    /// Commands that may wait in the dispatcher queue
    pub queue_capacity: usize,
}

impl MatrixConfig {
    /// Configuration with defaults for everything but the host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            zones: DEFAULT_ZONES,
            inputs: DEFAULT_INPUTS,
            input_labels: BTreeMap::new(),
            zone_labels: BTreeMap::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            command_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(4),
            reconnect_attempts: 3,
            bulk_query: true,
            queue_capacity: 32,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_zones(mut self, zones: u16) -> Self {
        self.zones = zones;
        self
    }

    pub fn with_inputs(mut self, inputs: u16) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_input_label(mut self, input: u16, label: impl Into<String>) -> Self {
        self.input_labels.insert(input, label.into());
        self
    }

    pub fn with_zone_label(mut self, zone: u16, label: impl Into<String>) -> Self {
        self.zone_labels.insert(zone, label.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    pub fn with_bulk_query(mut self, supported: bool) -> Self {
        self.bulk_query = supported;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Check the configuration for values the core cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Validation("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Validation("port must not be 0".into()));
        }
        if self.zones == 0 || self.zones > MAX_PORT {
            return Err(Error::Validation(format!(
                "zone count must be within 1..={}, got {}",
                MAX_PORT, self.zones
            )));
        }
        if self.inputs == 0 || self.inputs > MAX_PORT {
            return Err(Error::Validation(format!(
                "input count must be within 1..={}, got {}",
                MAX_PORT, self.inputs
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::Validation("max_attempts must be at least 1".into()));
        }
        if self.reconnect_attempts == 0 {
            return Err(Error::Validation("reconnect_attempts must be at least 1".into()));
        }
        if self.command_timeout.is_zero() {
            return Err(Error::Validation("command_timeout must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Validation("queue_capacity must be at least 1".into()));
        }
        if let Some(n) = self.input_labels.keys().find(|n| **n == 0 || **n > self.inputs) {
            return Err(Error::Validation(format!("label given for unknown input {}", n)));
        }
        if let Some(n) = self.zone_labels.keys().find(|n| **n == 0 || **n > self.zones) {
            return Err(Error::Validation(format!("label given for unknown zone {}", n)));
        }
        Ok(())
    }

    pub fn capacity(&self) -> Capacity {
        Capacity::new(self.zones, self.inputs)
    }

    /// Poll interval with the lower bound applied
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }

    /// Stable identifier for the device, `host:port`
    pub fn device_key(&self) -> String {
        format!("{}:{}", self.host.trim(), self.port)
    }

    pub fn zone_ids(&self) -> impl Iterator<Item = ZoneId> + '_ {
        (1..=self.zones).filter_map(|n| ZoneId::new(n).ok())
    }

    pub fn input_ids(&self) -> impl Iterator<Item = InputId> + '_ {
        (1..=self.inputs).filter_map(|n| InputId::new(n).ok())
    }

    /// Trimmed friendly label for a zone, if one was configured
    pub fn zone_label(&self, zone: ZoneId) -> Option<String> {
        self.zone_labels
            .get(&zone.get())
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
    }

    /// All inputs with their display labels (`Input N` when unnamed)
    pub fn inputs(&self) -> Vec<Input> {
        self.input_ids()
            .map(|id| {
                let label = self
                    .input_labels
                    .get(&id.get())
                    .map(|label| label.trim())
                    .filter(|label| !label.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Input {}", id));
                Input::new(id, label)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = MatrixConfig::new("10.0.0.2");
        assert_eq!(config.port, 23);
        assert_eq!(config.zones, 9);
        assert_eq!(config.inputs, 4);
        assert_eq!(config.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(MatrixConfig::new("  ").validate().is_err());
        assert!(MatrixConfig::new("h").with_zones(0).validate().is_err());
        assert!(MatrixConfig::new("h").with_inputs(1000).validate().is_err());
        assert!(MatrixConfig::new("h").with_max_attempts(0).validate().is_err());
        assert!(
            MatrixConfig::new("h")
                .with_inputs(2)
                .with_input_label(3, "Sky Q")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_poll_interval_clamped() {
        let config = MatrixConfig::new("h").with_poll_interval(Duration::from_millis(100));
        assert_eq!(config.effective_poll_interval(), MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_input_labels() {
        let config = MatrixConfig::new("h")
            .with_inputs(3)
            .with_input_label(1, " Apple TV ")
            .with_input_label(2, "   ");

        let labels: Vec<String> = config.inputs().into_iter().map(|i| i.label).collect();
        assert_eq!(labels, vec!["Apple TV", "Input 2", "Input 3"]);
    }

    #[test]
    fn test_capacity() {
        let capacity = MatrixConfig::new("h").with_zones(2).capacity();
        assert!(capacity.contains_zone(ZoneId::new(2).unwrap()));
        assert!(!capacity.contains_zone(ZoneId::new(3).unwrap()));
    }
}
