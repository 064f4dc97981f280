//! # acm200
//!
//! Control core for the Blustream ACM200 HDMI-over-IP matrix controller.
//!
//! ## Features
//!
//! - One shared control link, commands serialised in FIFO order
//! - Timeouts, retries with exponential backoff and automatic reconnect
//! - Periodic polling with per-field freshness (`Unknown`, `Confirmed`,
//!   `Stale`, `Optimistic`)
//! - Change notifications and diagnostic events over broadcast channels
//! - Entity projections (media player, source select, routing overview)
//!
//! ## Quick Start
//!
//! ```no_run
//! use acm200::{Matrix, MatrixConfig};
//!
//! #[tokio::main]
//! async fn main() -> acm200::Result<()> {
//!     let config = MatrixConfig::new("192.168.1.50")
//!         .with_zones(8)
//!         .with_input_label(1, "Apple TV");
//!
//!     let matrix = Matrix::new(config)?;
//!     matrix.connect().await?;
//!     matrix.refresh().await;
//!
//!     matrix.select_source(2, "Apple TV").await?;
//!     println!("{}", matrix.entities().routing_overview(&matrix.snapshot()).value);
//!
//!     matrix.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod diagnostics;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod matrix;
pub mod poller;
pub mod store;

// Re-exports
pub use diagnostics::{DiagnosticEvent, Diagnostics};
pub use dispatcher::{DispatchSettings, Dispatcher};
pub use entity::EntityCatalog;
pub use error::{Error, Result};
pub use matrix::Matrix;
pub use poller::{PollOutcome, Poller, PollerHandle};
pub use store::{FieldKind, PollResult, StateChange, StateStore};

// Re-export types
pub use acm200_core::{Command, Reply, Session};
pub use acm200_transport::{TcpTransport, Transport};
pub use acm200_types::{
    DeviceInfo, DeviceSnapshot, Field, Freshness, InputId, MatrixConfig, PowerState, ZoneId,
};
