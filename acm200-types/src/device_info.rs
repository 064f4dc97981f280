//! Device registry information

use std::fmt;

use crate::config::MatrixConfig;

pub const MANUFACTURER: &str = "Blustream";
pub const MODEL: &str = "ACM200";
pub const CONFIGURATION_URL: &str = "https://www.blustream.co.uk/";

/// Identity of the matrix as shown to the host platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Stable device key (`host:port`)
    pub key: String,

    /// Display name
    pub name: String,

    pub manufacturer: String,

    pub model: String,

    /// Vendor web page
    pub configuration_url: Option<String>,
}

impl DeviceInfo {
    pub fn new(key: String, name: String) -> Self {
        Self {
            key,
            name,
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            configuration_url: Some(CONFIGURATION_URL.to_string()),
        }
    }

    pub fn from_config(config: &MatrixConfig) -> Self {
        Self::new(
            config.device_key(),
            format!("Blustream ACM200 ({})", config.host.trim()),
        )
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[{} {} @ {}]",
            self.manufacturer, self.model, self.key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let info = DeviceInfo::from_config(&MatrixConfig::new("10.1.1.9").with_port(2323));
        assert_eq!(info.key, "10.1.1.9:2323");
        assert_eq!(info.name, "Blustream ACM200 (10.1.1.9)");
        assert_eq!(info.to_string(), "Device[Blustream ACM200 @ 10.1.1.9:2323]");
    }
}
