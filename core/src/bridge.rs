// Bridge assembly
//
// Wires the daemon connection (I/O context) to the profile modules, enables
// GATT on the daemon and starts the GATT manager (control context).

use crate::avrcp::{AvrcpInterface, AvrcpModule};
use crate::config::BridgeConfig;
use crate::daemon::{spawn_connection, DaemonLink, ResultHandler, Transport};
use crate::dispatch::ServiceDispatcher;
use crate::error::BridgeError;
use crate::gatt::{self, GattEvent, GattInterface, GattManager, GattManagerHandle, GattModule};
use crate::setup::{SetupInterface, SetupModule};
use crate::types::BluetoothStatus;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Module registration mode for GATT
const GATT_MODE: u8 = 0;

pub struct Bridge {
    link: DaemonLink,
    io: JoinHandle<()>,
    setup: SetupInterface,
    avrcp: AvrcpInterface,
    gatt: GattManagerHandle,
    events: Option<UnboundedReceiver<GattEvent>>,
}

impl Bridge {
    /// Connect to the daemon socket named in `config`
    #[cfg(unix)]
    pub async fn connect(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let stream = tokio::net::UnixStream::connect(&config.socket_path).await?;
        info!(socket = %config.socket_path.display(), "connected to Bluetooth daemon");
        Self::with_stream(stream, config).await
    }

    /// Run the bridge over an already connected byte stream
    pub async fn with_stream<S>(stream: S, config: &BridgeConfig) -> Result<Self, BridgeError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let setup_module = Arc::new(SetupModule::new());
        let gatt_module = Arc::new(GattModule::new());
        let avrcp_module = Arc::new(AvrcpModule::new());
        let dispatcher = Arc::new(ServiceDispatcher::new(
            setup_module.clone(),
            gatt_module.clone(),
            avrcp_module.clone(),
        ));

        let (link, io) = spawn_connection(stream, dispatcher);
        let transport: Arc<dyn Transport> = Arc::new(link.clone());
        let setup = SetupInterface::new(setup_module, transport.clone());
        let gatt_interface = GattInterface::new(gatt_module, transport.clone());
        let avrcp = AvrcpInterface::new(avrcp_module, transport);

        if let Err(e) = setup
            .enable(gatt::SERVICE_ID, GATT_MODE, config.gatt_max_clients)
            .await
        {
            warn!("failed to enable GATT: {}", e);
            io.abort();
            return Err(e);
        }
        info!(max_clients = config.gatt_max_clients, "GATT module registered");

        let (gatt, events) = GattManager::spawn(gatt_interface, config.advertising.clone());
        Ok(Self {
            link,
            io,
            setup,
            avrcp,
            gatt,
            events: Some(events),
        })
    }

    pub fn gatt(&self) -> &GattManagerHandle {
        &self.gatt
    }

    /// The GATT event stream; can be taken once
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<GattEvent>> {
        self.events.take()
    }

    pub fn avrcp(&self) -> &AvrcpInterface {
        &self.avrcp
    }

    pub fn is_connected(&self) -> bool {
        !self.link.is_closed() && !self.io.is_finished()
    }

    /// Stop the GATT manager and unregister the GATT module
    pub async fn shutdown(self) -> Result<(), BridgeError> {
        self.gatt.shutdown();

        let (tx, rx) = oneshot::channel();
        self.setup
            .unregister_module(gatt::SERVICE_ID, ResultHandler::from_sender(tx));
        let result = rx.await.unwrap_or(Err(BluetoothStatus::Fail));
        info!("bridge shut down");
        result.map_err(|status| BridgeError::ModuleRegistration {
            service: gatt::SERVICE_ID,
            status,
        })
    }
}
