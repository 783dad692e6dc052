// Shared fixtures: a scripted daemon on the far end of an in-memory stream

#![allow(dead_code)]

use btbridge_core::codec::Pack;
use btbridge_core::pdu::{Pdu, PduHeader, HEADER_SIZE};
use btbridge_core::{Bridge, BridgeConfig, GattEvent};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc::UnboundedReceiver;

pub const GATT: u8 = 0x09;
pub const SETUP: u8 = 0x00;

/// Guards every await in the fixtures so a protocol mismatch fails the
/// test instead of hanging it
const STEP: Duration = Duration::from_secs(5);

pub struct FakeDaemon {
    stream: DuplexStream,
}

impl FakeDaemon {
    /// Read the next command the bridge sent
    pub async fn recv(&mut self) -> Pdu {
        tokio::time::timeout(STEP, async {
            let mut header = [0u8; HEADER_SIZE];
            self.stream.read_exact(&mut header).await.unwrap();
            let header = PduHeader::from_bytes(&header).unwrap();
            let mut payload = vec![0u8; header.length as usize];
            self.stream.read_exact(&mut payload).await.unwrap();
            Pdu::from_parts(header, payload).unwrap()
        })
        .await
        .expect("bridge sent nothing")
    }

    pub async fn expect(&mut self, service: u8, opcode: u8) -> Pdu {
        let pdu = self.recv().await;
        assert_eq!(
            (pdu.service(), pdu.opcode()),
            (service, opcode),
            "unexpected command"
        );
        pdu
    }

    pub async fn send(&mut self, pdu: Pdu) {
        let frame = pdu.to_frame().unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Empty success response
    pub async fn reply(&mut self, service: u8, opcode: u8) {
        self.send(Pdu::new(service, opcode)).await;
    }

    /// Expect a command and answer it with an empty success response
    pub async fn ack(&mut self, service: u8, opcode: u8) -> Pdu {
        let pdu = self.expect(service, opcode).await;
        self.reply(service, opcode).await;
        pdu
    }

    pub async fn reply_error(&mut self, service: u8, status: u8) {
        let mut pdu = Pdu::new(service, 0x00);
        pdu.put(&status).unwrap();
        self.send(pdu).await;
    }

    /// Send a notification whose payload is built by `build`
    pub async fn notify(&mut self, service: u8, opcode: u8, build: impl FnOnce(&mut Pdu)) {
        let mut pdu = Pdu::new(service, opcode);
        build(&mut pdu);
        self.send(pdu).await;
    }

    pub async fn close(self) {
        drop(self.stream);
    }
}

/// Append several values to a notification payload
pub fn put_all(pdu: &mut Pdu, values: &[&dyn Pack]) {
    for value in values {
        value.pack(pdu).unwrap();
    }
}

/// Start a bridge over an in-memory stream, answering GATT module
/// registration on the daemon side
pub async fn start_bridge() -> (Bridge, FakeDaemon) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut daemon = FakeDaemon { stream: server };
    let config = BridgeConfig::default();

    let (bridge, ()) = tokio::join!(Bridge::with_stream(client, &config), async {
        let register = daemon.expect(SETUP, 0x01).await;
        assert_eq!(register.payload(), &[GATT, 0, 1, 0, 0, 0]);
        daemon.reply(SETUP, 0x01).await;
    });
    (bridge.expect("bridge started"), daemon)
}

pub async fn next_event(events: &mut UnboundedReceiver<GattEvent>) -> GattEvent {
    tokio::time::timeout(STEP, events.recv())
        .await
        .expect("no GATT event")
        .expect("event stream closed")
}
