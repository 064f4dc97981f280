//! Protocol constants

use std::time::Duration;

/// Line terminator appended to every command
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wire keywords
pub mod keywords {
    /// Output prefix, followed by a three-digit zone number
    pub const OUTPUT: &str = "OUT";

    /// Route source marker (`OUT001FR002`)
    pub const FROM: &str = "FR";

    /// Input prefix in status lines (`IN002`)
    pub const INPUT: &str = "IN";

    pub const ON: &str = "ON";
    pub const OFF: &str = "OFF";

    /// Status query suffix / bulk query
    pub const STATUS: &str = "STATUS";

    /// Command accepted
    pub const OK: &str = "OK";

    /// Command rejected
    pub const ERR: &str = "ERR";

    /// End of a bulk status listing
    pub const END: &str = "END";

    /// Prefix of unsolicited status pushes
    pub const NOTIFY: &str = "NOTIFY";

    /// Placeholder for a value the device did not report
    pub const NOT_REPORTED: &str = "---";
}
