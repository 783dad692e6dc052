//! Daemon transport: the seam between profile modules and the socket
//!
//! A [`Transport`] takes an encoded [`Pdu`] plus the [`ReplyHandler`] that
//! should receive the daemon's response. Handlers are single-use; exactly one
//! of success or failure is delivered to each, either by the module's
//! response dispatch or by the transport when delivery fails.

pub mod connection;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use connection::{spawn_connection, DaemonLink};

use crate::codec::CodecError;
use crate::gatt::GattReply;
use crate::pdu::Pdu;
use crate::types::BluetoothStatus;
use std::fmt;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Daemon connection closed")]
    Closed,

    #[error("Frame codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(String),
}

impl TransportError {
    pub fn status(&self) -> BluetoothStatus {
        match self {
            TransportError::Closed => BluetoothStatus::NotReady,
            TransportError::Codec(_) => BluetoothStatus::ParmInvalid,
            TransportError::Io(_) => BluetoothStatus::Fail,
        }
    }
}

/// Single-use completion callback for one outstanding command
pub struct ResultHandler<R> {
    callback: Box<dyn FnOnce(Result<R, BluetoothStatus>) + Send>,
}

impl<R: Send + 'static> ResultHandler<R> {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<R, BluetoothStatus>) + Send + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Deliver the outcome into a oneshot channel
    pub fn from_sender(tx: oneshot::Sender<Result<R, BluetoothStatus>>) -> Self {
        Self::new(move |result| {
            let _ = tx.send(result);
        })
    }

    /// Discard the outcome
    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    pub fn complete(self, result: Result<R, BluetoothStatus>) {
        (self.callback)(result)
    }

    pub fn fail(self, status: BluetoothStatus) {
        self.complete(Err(status))
    }
}

impl<R> fmt::Debug for ResultHandler<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResultHandler")
    }
}

/// Result handler tagged with the module whose response it expects
#[derive(Debug)]
pub enum ReplyHandler {
    Setup(ResultHandler<()>),
    Gatt(ResultHandler<GattReply>),
    Avrcp(ResultHandler<()>),
}

impl ReplyHandler {
    pub fn service(&self) -> u8 {
        match self {
            ReplyHandler::Setup(_) => crate::setup::SERVICE_ID,
            ReplyHandler::Gatt(_) => crate::gatt::SERVICE_ID,
            ReplyHandler::Avrcp(_) => crate::avrcp::SERVICE_ID,
        }
    }

    pub fn fail(self, status: BluetoothStatus) {
        match self {
            ReplyHandler::Setup(h) => h.fail(status),
            ReplyHandler::Gatt(h) => h.fail(status),
            ReplyHandler::Avrcp(h) => h.fail(status),
        }
    }
}

/// A send that failed locally; the handler comes back so the caller can
/// fail it through the normal result contract
#[derive(Debug)]
pub struct Rejected {
    pub error: TransportError,
    pub handler: ReplyHandler,
}

impl Rejected {
    pub fn new(error: TransportError, handler: ReplyHandler) -> Self {
        Self { error, handler }
    }

    /// Fail the returned handler with the status matching the error
    pub fn fail_handler(self) {
        let status = self.error.status();
        self.handler.fail(status)
    }
}

pub trait Transport: Send + Sync {
    /// Queue a PDU for the daemon. The handler receives the daemon's
    /// response for this command.
    fn send(&self, pdu: Pdu, handler: ReplyHandler) -> Result<(), Rejected>;
}
