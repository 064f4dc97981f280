//! High-level matrix interface

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use acm200_core::{Command, Session};
use acm200_transport::{TcpTransport, Transport};
use acm200_types::{DeviceInfo, DeviceSnapshot, InputId, MatrixConfig, PowerState, ZoneId};

use crate::diagnostics::Diagnostics;
use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::entity::EntityCatalog;
use crate::error::{Error, Result};
use crate::poller::{PollOutcome, Poller, PollerHandle};
use crate::store::{StateChange, StateStore};

/// Blustream ACM200 matrix
///
/// Owns the dispatcher worker, the state store and (once started) the poll
/// loop. Every method can be called concurrently through a shared reference;
/// commands are serialised by the dispatcher.
///
/// # Examples
///
/// ```no_run
/// use acm200::{Matrix, MatrixConfig};
///
/// #[tokio::main]
/// async fn main() -> acm200::Result<()> {
///     let matrix = Matrix::new(MatrixConfig::new("192.168.1.50"))?;
///     matrix.connect().await?;
///
///     matrix.set_route(3, 2).await?;
///     println!("{:?}", matrix.snapshot().routes());
///
///     matrix.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct Matrix {
    config: MatrixConfig,
    dispatcher: Dispatcher,
    worker: JoinHandle<()>,
    session: Session,
    store: StateStore,
    diagnostics: Diagnostics,
    poller: Poller,
    polling: Mutex<Option<PollerHandle>>,
    entities: EntityCatalog,
}

impl Matrix {
    /// Create a matrix reached over TCP
    ///
    /// Must be called from within a Tokio runtime. Does not connect; the
    /// first command (or [`Matrix::connect`]) opens the link.
    pub fn new(config: MatrixConfig) -> Result<Self> {
        let transport = TcpTransport::new(config.host.trim(), config.port)
            .with_connect_timeout(config.connect_timeout);
        Self::with_transport(config, Box::new(transport))
    }

    /// Create a matrix over a caller-supplied transport
    pub fn with_transport(config: MatrixConfig, transport: Box<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let session = Session::new();
        let store = StateStore::new(&config);
        let diagnostics = Diagnostics::default();

        let (dispatcher, worker) = Dispatcher::spawn(
            transport,
            DispatchSettings::from_config(&config),
            session.clone(),
            store.clone(),
            diagnostics.clone(),
        );

        let poller = Poller::new(
            dispatcher.clone(),
            store.clone(),
            diagnostics.clone(),
            config.zone_ids().collect(),
            config.bulk_query,
        );

        debug!(
            "Matrix {} ready: {} zone(s), {} input(s)",
            config.device_key(),
            config.zones,
            config.inputs
        );

        Ok(Self {
            entities: EntityCatalog::new(&config),
            config,
            dispatcher,
            worker,
            session,
            store,
            diagnostics,
            poller,
            polling: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    /// Open the link now instead of on the first command
    pub async fn connect(&self) -> Result<()> {
        self.dispatcher.connect().await
    }

    /// Check if the control link is up
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Latest known state of every zone
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.store.read()
    }

    /// Receive every state change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.store.subscribe()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::from_config(&self.config)
    }

    pub fn entities(&self) -> &EntityCatalog {
        &self.entities
    }

    /// Route `input` to `zone` (both 1-based)
    pub async fn set_route(&self, zone: u16, input: u16) -> Result<()> {
        let zone = ZoneId::new(zone).map_err(|e| Error::InvalidCommand(e.to_string()))?;
        let input = InputId::new(input).map_err(|e| Error::InvalidCommand(e.to_string()))?;

        info!("Routing input {} to zone {}", input, zone);
        self.control(Command::set_route(zone, input)).await
    }

    /// Switch a zone's display on or off
    pub async fn set_power(&self, zone: u16, on: bool) -> Result<()> {
        let zone = ZoneId::new(zone).map_err(|e| Error::InvalidCommand(e.to_string()))?;

        info!("Switching zone {} {}", zone, PowerState::from(on));
        self.control(Command::set_power(zone, on)).await
    }

    /// Route by source label, as shown in the select and media player lists
    pub async fn select_source(&self, zone: u16, label: &str) -> Result<()> {
        let input = self
            .entities
            .input_for_option(label)
            .ok_or_else(|| Error::UnknownSource(label.to_string()))?;
        self.set_route(zone, input.get()).await
    }

    /// Poll the device once, outside the regular schedule
    pub async fn refresh(&self) -> PollOutcome {
        self.poller.poll_once().await
    }

    /// Start periodic polling at the configured interval
    ///
    /// Calling it again while polling is running does nothing.
    pub fn start_polling(&self) -> Result<()> {
        if self.worker.is_finished() {
            return Err(Error::Shutdown);
        }

        let mut polling = self.polling.lock();
        if polling.is_none() {
            *polling = Some(self.poller.spawn(self.config.effective_poll_interval()));
        }
        Ok(())
    }

    /// Stop polling, let queued commands finish and close the link
    pub async fn shutdown(self) {
        let Self {
            config,
            dispatcher,
            worker,
            poller,
            polling,
            ..
        } = self;

        if let Some(handle) = polling.into_inner() {
            handle.stop().await;
        }

        // the worker exits once the last dispatcher handle is gone
        drop(poller);
        drop(dispatcher);

        if let Err(e) = worker.await {
            warn!("Dispatcher task ended abnormally: {}", e);
        }
        info!("Matrix {} shut down", config.device_key());
    }

    /// The dispatcher has already merged the echo or stale marking
    async fn control(&self, command: Command) -> Result<()> {
        self.dispatcher.execute(command).await.map(|_| ())
    }
}

impl std::fmt::Debug for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matrix")
            .field("device", &self.config.device_key())
            .field("connected", &self.is_connected())
            .field("polling", &self.polling.lock().is_some())
            .finish()
    }
}
