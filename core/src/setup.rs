//! Setup (core) module: registers profile modules with the daemon
//!
//! The daemon only accepts commands for a service after that service has
//! been registered here. There are no setup notifications.

use crate::codec::CodecError;
use crate::daemon::{ReplyHandler, ResultHandler, Transport};
use crate::error::BridgeError;
use crate::pdu::Pdu;
use crate::types::BluetoothStatus;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Setup service id on the daemon socket
pub const SERVICE_ID: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SetupOpcode {
    Error = 0x00,
    RegisterModule = 0x01,
    UnregisterModule = 0x02,
}

impl SetupOpcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(SetupOpcode::Error),
            0x01 => Some(SetupOpcode::RegisterModule),
            0x02 => Some(SetupOpcode::UnregisterModule),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupCommand {
    RegisterModule {
        service: u8,
        mode: u8,
        max_clients: u32,
    },
    UnregisterModule {
        service: u8,
    },
}

impl SetupCommand {
    pub fn opcode(&self) -> SetupOpcode {
        match self {
            SetupCommand::RegisterModule { .. } => SetupOpcode::RegisterModule,
            SetupCommand::UnregisterModule { .. } => SetupOpcode::UnregisterModule,
        }
    }

    pub fn to_pdu(&self) -> Result<Pdu, CodecError> {
        let mut pdu = Pdu::new(SERVICE_ID, self.opcode() as u8);
        match self {
            SetupCommand::RegisterModule {
                service,
                mode,
                max_clients,
            } => pdu.put(&(service, mode, max_clients))?,
            SetupCommand::UnregisterModule { service } => pdu.put(service)?,
        }
        Ok(pdu)
    }
}

#[derive(Default)]
pub struct SetupModule;

impl SetupModule {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, command: &SetupCommand) -> Result<Pdu, CodecError> {
        command.to_pdu()
    }

    pub fn handle_response(&self, mut pdu: Pdu, handler: ResultHandler<()>) {
        let result = match SetupOpcode::from_u8(pdu.opcode()) {
            Some(SetupOpcode::Error) => match pdu.get::<BluetoothStatus>() {
                Ok(status) => Err(status),
                Err(e) => {
                    warn!("malformed setup error response: {}", e);
                    Err(BluetoothStatus::Fail)
                }
            },
            Some(_) => Ok(()),
            None => {
                warn!(opcode = pdu.opcode(), "unknown setup response opcode");
                Err(BluetoothStatus::Fail)
            }
        };
        pdu.warn_trailing();
        handler.complete(result);
    }

    pub fn handle_notification(&self, pdu: Pdu) {
        debug!(opcode = pdu.opcode(), "ignoring setup notification");
    }
}

#[derive(Clone)]
pub struct SetupInterface {
    module: Arc<SetupModule>,
    transport: Arc<dyn Transport>,
}

impl SetupInterface {
    pub fn new(module: Arc<SetupModule>, transport: Arc<dyn Transport>) -> Self {
        Self { module, transport }
    }

    pub fn send(&self, command: SetupCommand, handler: ResultHandler<()>) {
        let pdu = match self.module.build(&command) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!(opcode = ?command.opcode(), "failed to pack setup command: {}", e);
                handler.fail(BridgeError::from(e).status());
                return;
            }
        };
        if let Err(rejected) = self.transport.send(pdu, ReplyHandler::Setup(handler)) {
            warn!(opcode = ?command.opcode(), "failed to send setup command: {}", rejected.error);
            rejected.fail_handler();
        }
    }

    pub fn register_module(&self, service: u8, mode: u8, max_clients: u32, handler: ResultHandler<()>) {
        self.send(
            SetupCommand::RegisterModule {
                service,
                mode,
                max_clients,
            },
            handler,
        )
    }

    pub fn unregister_module(&self, service: u8, handler: ResultHandler<()>) {
        self.send(SetupCommand::UnregisterModule { service }, handler)
    }

    /// Register `service` and wait for the daemon's answer
    pub async fn enable(&self, service: u8, mode: u8, max_clients: u32) -> Result<(), BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.register_module(service, mode, max_clients, ResultHandler::from_sender(tx));
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(status)) => Err(BridgeError::ModuleRegistration { service, status }),
            Err(_) => Err(BridgeError::ModuleRegistration {
                service,
                status: BluetoothStatus::Fail,
            }),
        }
    }

    /// Unregister `service`; the daemon's answer is only logged
    pub fn disable(&self, service: u8) {
        self.unregister_module(
            service,
            ResultHandler::new(move |result| {
                if let Err(status) = result {
                    warn!(service, %status, "failed to unregister module");
                }
            }),
        );
    }
}
