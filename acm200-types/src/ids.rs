//! Port identifiers and per-port values

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Highest port number the three-digit wire format can address
pub const MAX_PORT: u16 = 999;

macro_rules! port_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u16);

        impl $name {
            /// Create an identifier from a 1-based port number
            pub fn new(value: u16) -> Result<Self> {
                if value == 0 || value > MAX_PORT {
                    return Err(Error::Validation(format!(
                        "{} id must be within 1..={}, got {}",
                        $kind, MAX_PORT, value
                    )));
                }
                Ok(Self(value))
            }

            /// Port number as used on the wire
            pub fn get(self) -> u16 {
                self.0
            }
        }

        impl TryFrom<u16> for $name {
            type Error = Error;

            fn try_from(value: u16) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for u16 {
            fn from(id: $name) -> u16 {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let value = s
                    .parse::<u16>()
                    .map_err(|e| Error::Parse(format!("{} id {:?}: {}", $kind, s, e)))?;
                Self::new(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

port_id!(
    /// Output port of the matrix (a room's display or speaker)
    ZoneId,
    "zone"
);

port_id!(
    /// Source port of the matrix
    InputId,
    "input"
);

/// Output power as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// Source port description
///
/// The set of inputs is fixed at startup. The device cannot tell which inputs
/// carry a signal, so `active` stays `None` unless a caller knows better.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub id: InputId,
    pub label: String,
    pub active: Option<bool>,
}

impl Input {
    pub fn new(id: InputId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            active: None,
        }
    }
}
