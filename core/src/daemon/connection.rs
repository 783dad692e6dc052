// Daemon connection: the I/O context
//
// Two tasks per connection:
// - a reader that turns the byte stream into PDUs
// - the I/O loop, which writes outgoing frames, keeps the FIFO of result
//   handlers, and runs the service dispatcher for every inbound PDU
//
// The daemon answers commands in the order it receives them, so each
// response is correlated with the oldest outstanding handler.

use super::{Rejected, ReplyHandler, Transport, TransportError};
use crate::dispatch::ServiceDispatcher;
use crate::pdu::{Pdu, PduHeader, HEADER_SIZE};
use crate::types::BluetoothStatus;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

struct Outgoing {
    frame: Vec<u8>,
    handler: ReplyHandler,
}

/// Cloneable sending side of a daemon connection
#[derive(Clone)]
pub struct DaemonLink {
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl DaemonLink {
    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed()
    }
}

impl Transport for DaemonLink {
    fn send(&self, pdu: Pdu, handler: ReplyHandler) -> Result<(), Rejected> {
        let frame = match pdu.to_frame() {
            Ok(frame) => frame,
            Err(e) => return Err(Rejected::new(TransportError::Codec(e), handler)),
        };
        trace!(
            service = pdu.service(),
            opcode = pdu.opcode(),
            len = pdu.len(),
            "queueing command"
        );
        self.outgoing
            .send(Outgoing { frame, handler })
            .map_err(|e| Rejected::new(TransportError::Closed, e.0.handler))
    }
}

/// Start the I/O context over a connected byte stream.
///
/// Returns the sending link and the handle of the I/O loop, which finishes
/// once the stream closes or every link has been dropped.
pub fn spawn_connection<S>(stream: S, dispatcher: Arc<ServiceDispatcher>) -> (DaemonLink, JoinHandle<()>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    tokio::spawn(read_loop(reader, inbound_tx));
    let io = tokio::spawn(io_loop(writer, outgoing_rx, inbound_rx, dispatcher));

    (
        DaemonLink {
            outgoing: outgoing_tx,
        },
        io,
    )
}

async fn read_frame<S: AsyncRead>(reader: &mut ReadHalf<S>) -> Result<Pdu, TransportError> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await.map_err(io_error)?;
    let header = PduHeader::from_bytes(&header)?;

    let mut payload = vec![0u8; header.length as usize];
    reader.read_exact(&mut payload).await.map_err(io_error)?;
    Ok(Pdu::from_parts(header, payload)?)
}

fn io_error(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::Closed
    } else {
        TransportError::Io(e.to_string())
    }
}

async fn read_loop<S: AsyncRead>(
    mut reader: ReadHalf<S>,
    inbound: mpsc::UnboundedSender<Result<Pdu, TransportError>>,
) {
    loop {
        let frame = read_frame(&mut reader).await;
        let stop = frame.is_err();
        if inbound.send(frame).is_err() || stop {
            break;
        }
    }
}

async fn io_loop<S: AsyncWrite>(
    mut writer: WriteHalf<S>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    mut inbound: mpsc::UnboundedReceiver<Result<Pdu, TransportError>>,
    dispatcher: Arc<ServiceDispatcher>,
) {
    let mut pending: VecDeque<ReplyHandler> = VecDeque::new();

    loop {
        tokio::select! {
            command = outgoing.recv() => {
                let Some(Outgoing { frame, handler }) = command else {
                    debug!("all daemon links dropped, closing connection");
                    break;
                };
                let written = match writer.write_all(&frame).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    error!("failed to write to daemon: {}", e);
                    handler.fail(BluetoothStatus::Fail);
                    break;
                }
                pending.push_back(handler);
            }
            frame = inbound.recv() => {
                match frame {
                    Some(Ok(pdu)) => {
                        trace!(
                            service = pdu.service(),
                            opcode = pdu.opcode(),
                            payload = %hex::encode(pdu.payload()),
                            "inbound"
                        );
                        dispatcher.dispatch(pdu, &mut pending)
                    }
                    Some(Err(TransportError::Closed)) | None => {
                        debug!("daemon closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("daemon connection failed: {}", e);
                        break;
                    }
                }
            }
        }
    }

    if !pending.is_empty() {
        warn!(outstanding = pending.len(), "failing commands left on closed connection");
    }
    for handler in pending.drain(..) {
        handler.fail(BluetoothStatus::Fail);
    }

    // Commands queued after the loop stopped never reached the daemon
    outgoing.close();
    while let Ok(Outgoing { handler, .. }) = outgoing.try_recv() {
        handler.fail(BluetoothStatus::NotReady);
    }
}
