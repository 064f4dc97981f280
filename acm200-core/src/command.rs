//! ACM200 command definitions

use std::fmt;

use acm200_types::{Capacity, InputId, PowerState, ZoneId};

use crate::constants::keywords;
use crate::error::{Error, Result};

/// Commands understood by the matrix
///
/// The `Display` form is the exact wire text without the line terminator,
/// which is also how replies are correlated to the command.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Route `input` to `zone`
    SetRoute { zone: ZoneId, input: InputId },

    /// Switch a zone's output on or off
    SetPower { zone: ZoneId, power: PowerState },

    /// Ask for one zone's route and power
    QueryZoneState(ZoneId),

    /// Ask for every zone's route and power
    QueryAllState,
}

impl Command {
    pub fn set_route(zone: ZoneId, input: InputId) -> Self {
        Self::SetRoute { zone, input }
    }

    pub fn set_power(zone: ZoneId, on: bool) -> Self {
        Self::SetPower {
            zone,
            power: PowerState::from(on),
        }
    }

    /// Check if this command only reads state
    pub fn is_query(self) -> bool {
        matches!(self, Self::QueryZoneState(_) | Self::QueryAllState)
    }

    /// Zone the command targets, `None` for bulk commands
    pub fn zone(self) -> Option<ZoneId> {
        match self {
            Self::SetRoute { zone, .. }
            | Self::SetPower { zone, .. }
            | Self::QueryZoneState(zone) => Some(zone),
            Self::QueryAllState => None,
        }
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::SetRoute { .. } => "SET_ROUTE",
            Self::SetPower { .. } => "SET_POWER",
            Self::QueryZoneState(_) => "QUERY_ZONE",
            Self::QueryAllState => "QUERY_ALL",
        }
    }

    /// Reject commands addressing ports the matrix does not have
    pub fn validate(self, capacity: &Capacity) -> Result<()> {
        if let Some(zone) = self.zone() {
            if !capacity.contains_zone(zone) {
                return Err(Error::InvalidCommand(format!(
                    "{}: zone {} out of range 1..={}",
                    self.name(),
                    zone,
                    capacity.zones
                )));
            }
        }

        if let Self::SetRoute { input, .. } = self {
            if !capacity.contains_input(input) {
                return Err(Error::InvalidCommand(format!(
                    "{}: input {} out of range 1..={}",
                    self.name(),
                    input,
                    capacity.inputs
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetRoute { zone, input } => write!(
                f,
                "{}{:03}{}{:03}",
                keywords::OUTPUT,
                zone.get(),
                keywords::FROM,
                input.get()
            ),
            Self::SetPower { zone, power } => {
                let state = match power {
                    PowerState::On => keywords::ON,
                    PowerState::Off => keywords::OFF,
                };
                write!(f, "{}{:03}{}", keywords::OUTPUT, zone.get(), state)
            }
            Self::QueryZoneState(zone) => {
                write!(f, "{}{:03}{}", keywords::OUTPUT, zone.get(), keywords::STATUS)
            }
            Self::QueryAllState => f.write_str(keywords::STATUS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(n: u16) -> ZoneId {
        ZoneId::new(n).unwrap()
    }

    fn input(n: u16) -> InputId {
        InputId::new(n).unwrap()
    }

    #[test]
    fn test_command_wire_text() {
        assert_eq!(Command::set_route(zone(1), input(2)).to_string(), "OUT001FR002");
        assert_eq!(Command::set_power(zone(12), true).to_string(), "OUT012ON");
        assert_eq!(Command::set_power(zone(3), false).to_string(), "OUT003OFF");
        assert_eq!(Command::QueryZoneState(zone(9)).to_string(), "OUT009STATUS");
        assert_eq!(Command::QueryAllState.to_string(), "STATUS");
    }

    #[test]
    fn test_command_is_query() {
        assert!(Command::QueryAllState.is_query());
        assert!(Command::QueryZoneState(zone(1)).is_query());
        assert!(!Command::set_power(zone(1), true).is_query());
    }

    #[test]
    fn test_validate_against_capacity() {
        let capacity = Capacity::new(4, 2);

        assert!(Command::set_route(zone(4), input(2)).validate(&capacity).is_ok());
        assert!(matches!(
            Command::set_route(zone(5), input(1)).validate(&capacity),
            Err(Error::InvalidCommand(_))
        ));
        assert!(matches!(
            Command::set_route(zone(1), input(3)).validate(&capacity),
            Err(Error::InvalidCommand(_))
        ));
        assert!(Command::QueryAllState.validate(&capacity).is_ok());
    }
}
