//! Type definitions for acm200
//!
//! Port identifiers, freshness-tagged state fields, device snapshots and the
//! static configuration a [`MatrixConfig`] carries into the control core.

pub mod config;
pub mod device_info;
pub mod error;
pub mod ids;
pub mod snapshot;

pub use config::{Capacity, MatrixConfig};
pub use device_info::DeviceInfo;
pub use error::{Error, Result};
pub use ids::{Input, InputId, PowerState, ZoneId};
pub use snapshot::{DeviceSnapshot, Field, Freshness, ZoneState};
