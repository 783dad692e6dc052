//! GATT notifications: decoding and the handler interface
//!
//! Notification opcodes start at 0x81 and are indexed densely from there.
//! Indices the daemon never assigns, and everything past the last entry,
//! decode to `None` and are ignored by the module.

use super::types::{AttHandle, GattDbElement, GattStatus};
use crate::codec::{Array16, BoolI32, CodecError};
use crate::pdu::Pdu;
use crate::types::BdAddr;
use uuid::Uuid;

/// First notification opcode; the dispatch index is `opcode - BASE`
pub const NOTIFICATION_BASE: u8 = 0x81;

/// One past the highest notification index the daemon defines
pub const NOTIFICATION_COUNT: u8 = 103;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterClientEvent {
    pub status: GattStatus,
    pub client_if: i32,
    pub app_uuid: Uuid,
}

/// Client connect/disconnect result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectEvent {
    pub conn_id: i32,
    pub status: GattStatus,
    pub client_if: i32,
    pub addr: BdAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCompleteEvent {
    pub conn_id: i32,
    pub status: GattStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterForNotificationEvent {
    pub conn_id: i32,
    pub registered: bool,
    pub status: GattStatus,
    pub handle: AttHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyEvent {
    pub conn_id: i32,
    pub addr: BdAddr,
    pub handle: AttHandle,
    pub is_notify: bool,
    pub value: Vec<u8>,
}

/// Characteristic or descriptor read result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEvent {
    pub conn_id: i32,
    pub status: GattStatus,
    pub handle: AttHandle,
    pub read_status: u8,
    pub value_type: u16,
    pub value: Vec<u8>,
}

/// Characteristic or descriptor write result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    pub conn_id: i32,
    pub status: GattStatus,
    pub handle: AttHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteWriteEvent {
    pub conn_id: i32,
    pub status: GattStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRemoteRssiEvent {
    pub client_if: i32,
    pub addr: BdAddr,
    pub rssi: i32,
    pub status: GattStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattDbEvent {
    pub conn_id: i32,
    pub db: Vec<GattDbElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterServerEvent {
    pub status: GattStatus,
    pub server_if: i32,
    pub app_uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub conn_id: i32,
    pub server_if: i32,
    pub connected: bool,
    pub addr: BdAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAddedEvent {
    pub status: GattStatus,
    pub server_if: i32,
    pub db: Vec<GattDbElement>,
}

/// Service stopped or deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandleEvent {
    pub status: GattStatus,
    pub server_if: i32,
    pub service_handle: AttHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReadEvent {
    pub conn_id: i32,
    pub trans_id: i32,
    pub addr: BdAddr,
    pub handle: AttHandle,
    pub offset: i32,
    pub is_long: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestWriteEvent {
    pub conn_id: i32,
    pub trans_id: i32,
    pub addr: BdAddr,
    pub handle: AttHandle,
    pub offset: i32,
    pub value: Vec<u8>,
    pub need_response: bool,
    pub is_prepare: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterScannerEvent {
    pub status: GattStatus,
    pub scanner_id: u8,
    pub app_uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResultEvent {
    pub addr: BdAddr,
    pub rssi: i32,
    pub adv_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAdvertiserEvent {
    pub status: GattStatus,
    pub advertiser_id: u8,
    pub app_uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartAdvertisingEvent {
    pub status: GattStatus,
    pub advertiser_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattNotification {
    RegisterClient(RegisterClientEvent),
    Connect(ConnectEvent),
    Disconnect(ConnectEvent),
    SearchComplete(SearchCompleteEvent),
    RegisterForNotification(RegisterForNotificationEvent),
    Notify(NotifyEvent),
    ReadCharacteristic(ReadEvent),
    WriteCharacteristic(WriteEvent),
    ReadDescriptor(ReadEvent),
    WriteDescriptor(WriteEvent),
    ExecuteWrite(ExecuteWriteEvent),
    ReadRemoteRssi(ReadRemoteRssiEvent),
    GetGattDb(GattDbEvent),
    RegisterServer(RegisterServerEvent),
    Connection(ConnectionEvent),
    ServiceAdded(ServiceAddedEvent),
    ServiceStopped(ServiceHandleEvent),
    ServiceDeleted(ServiceHandleEvent),
    RequestRead(RequestReadEvent),
    RequestWrite(RequestWriteEvent),
    RegisterScanner(RegisterScannerEvent),
    ScanResult(ScanResultEvent),
    RegisterAdvertiser(RegisterAdvertiserEvent),
    StartAdvertising(StartAdvertisingEvent),
}

impl GattNotification {
    /// Decode the notification carried by `pdu`. Returns `Ok(None)` for
    /// opcodes with no assigned notification.
    pub fn decode(pdu: &mut Pdu) -> Result<Option<Self>, CodecError> {
        let opcode = pdu.opcode();
        if opcode < NOTIFICATION_BASE {
            return Ok(None);
        }
        let index = opcode - NOTIFICATION_BASE;
        let notification = match index {
            0 => Self::RegisterClient(RegisterClientEvent {
                status: pdu.get()?,
                client_if: pdu.get()?,
                app_uuid: pdu.get()?,
            }),
            1 => Self::Connect(decode_connect(pdu)?),
            2 => Self::Disconnect(decode_connect(pdu)?),
            3 => Self::SearchComplete(SearchCompleteEvent {
                conn_id: pdu.get()?,
                status: pdu.get()?,
            }),
            4 => Self::RegisterForNotification(RegisterForNotificationEvent {
                conn_id: pdu.get()?,
                registered: pdu.get::<BoolI32>()?.0,
                status: pdu.get()?,
                handle: pdu.get()?,
            }),
            5 => {
                let conn_id = pdu.get()?;
                let addr = pdu.get()?;
                let handle = pdu.get()?;
                let is_notify = pdu.get()?;
                let len = pdu.get::<u16>()? as usize;
                Self::Notify(NotifyEvent {
                    conn_id,
                    addr,
                    handle,
                    is_notify,
                    value: pdu.get_bytes(len)?,
                })
            }
            6 => Self::ReadCharacteristic(decode_read(pdu)?),
            7 => Self::WriteCharacteristic(decode_write(pdu)?),
            8 => Self::ReadDescriptor(decode_read(pdu)?),
            9 => Self::WriteDescriptor(decode_write(pdu)?),
            10 => Self::ExecuteWrite(ExecuteWriteEvent {
                conn_id: pdu.get()?,
                status: pdu.get()?,
            }),
            11 => Self::ReadRemoteRssi(ReadRemoteRssiEvent {
                client_if: pdu.get()?,
                addr: pdu.get()?,
                rssi: pdu.get()?,
                status: pdu.get()?,
            }),
            14 => Self::GetGattDb(GattDbEvent {
                conn_id: pdu.get()?,
                db: pdu.get::<Array16<GattDbElement>>()?.0,
            }),
            32 => Self::RegisterServer(RegisterServerEvent {
                status: pdu.get()?,
                server_if: pdu.get()?,
                app_uuid: pdu.get()?,
            }),
            33 => Self::Connection(ConnectionEvent {
                conn_id: pdu.get()?,
                server_if: pdu.get()?,
                connected: pdu.get::<BoolI32>()?.0,
                addr: pdu.get()?,
            }),
            34 => Self::ServiceAdded(ServiceAddedEvent {
                status: pdu.get()?,
                server_if: pdu.get()?,
                db: pdu.get::<Array16<GattDbElement>>()?.0,
            }),
            35 => Self::ServiceStopped(decode_service_handle(pdu)?),
            36 => Self::ServiceDeleted(decode_service_handle(pdu)?),
            37 | 38 => Self::RequestRead(RequestReadEvent {
                conn_id: pdu.get()?,
                trans_id: pdu.get()?,
                addr: pdu.get()?,
                handle: pdu.get()?,
                offset: pdu.get()?,
                is_long: pdu.get()?,
            }),
            39 | 40 => {
                let conn_id = pdu.get()?;
                let trans_id = pdu.get()?;
                let addr = pdu.get()?;
                let handle = pdu.get()?;
                let offset = pdu.get()?;
                let len = pdu.get::<i32>()?;
                let len = usize::try_from(len).map_err(|_| CodecError::InvalidValue {
                    field: "write request length",
                    value: len as i64,
                })?;
                Self::RequestWrite(RequestWriteEvent {
                    conn_id,
                    trans_id,
                    addr,
                    handle,
                    offset,
                    value: pdu.get_bytes(len)?,
                    need_response: pdu.get()?,
                    is_prepare: pdu.get()?,
                })
            }
            64 => Self::RegisterScanner(RegisterScannerEvent {
                status: pdu.get()?,
                scanner_id: pdu.get()?,
                app_uuid: pdu.get()?,
            }),
            76 => {
                let addr = pdu.get()?;
                let rssi = pdu.get()?;
                let len = pdu.get::<u16>()? as usize;
                Self::ScanResult(ScanResultEvent {
                    addr,
                    rssi,
                    adv_data: pdu.get_bytes(len)?,
                })
            }
            96 => Self::RegisterAdvertiser(RegisterAdvertiserEvent {
                status: pdu.get()?,
                advertiser_id: pdu.get()?,
                app_uuid: pdu.get()?,
            }),
            102 => Self::StartAdvertising(StartAdvertisingEvent {
                status: pdu.get()?,
                advertiser_id: pdu.get()?,
            }),
            _ => return Ok(None),
        };
        Ok(Some(notification))
    }

    /// Hand the notification to the matching handler method
    pub fn deliver(self, handler: &dyn GattNotificationHandler) {
        use GattNotification::*;
        match self {
            RegisterClient(e) => handler.register_client(e),
            Connect(e) => handler.connect(e),
            Disconnect(e) => handler.disconnect(e),
            SearchComplete(e) => handler.search_complete(e),
            RegisterForNotification(e) => handler.register_for_notification(e),
            Notify(e) => handler.notify(e),
            ReadCharacteristic(e) => handler.read_characteristic(e),
            WriteCharacteristic(e) => handler.write_characteristic(e),
            ReadDescriptor(e) => handler.read_descriptor(e),
            WriteDescriptor(e) => handler.write_descriptor(e),
            ExecuteWrite(e) => handler.execute_write(e),
            ReadRemoteRssi(e) => handler.read_remote_rssi(e),
            GetGattDb(e) => handler.get_gatt_db(e),
            RegisterServer(e) => handler.register_server(e),
            Connection(e) => handler.connection(e),
            ServiceAdded(e) => handler.service_added(e),
            ServiceStopped(e) => handler.service_stopped(e),
            ServiceDeleted(e) => handler.service_deleted(e),
            RequestRead(e) => handler.request_read(e),
            RequestWrite(e) => handler.request_write(e),
            RegisterScanner(e) => handler.register_scanner(e),
            ScanResult(e) => handler.scan_result(e),
            RegisterAdvertiser(e) => handler.register_advertiser(e),
            StartAdvertising(e) => handler.start_advertising(e),
        }
    }
}

fn decode_connect(pdu: &mut Pdu) -> Result<ConnectEvent, CodecError> {
    Ok(ConnectEvent {
        conn_id: pdu.get()?,
        status: pdu.get()?,
        client_if: pdu.get()?,
        addr: pdu.get()?,
    })
}

fn decode_read(pdu: &mut Pdu) -> Result<ReadEvent, CodecError> {
    let conn_id = pdu.get()?;
    let status = pdu.get()?;
    let handle = pdu.get()?;
    let read_status = pdu.get()?;
    let value_type = pdu.get()?;
    let len = pdu.get::<u16>()? as usize;
    Ok(ReadEvent {
        conn_id,
        status,
        handle,
        read_status,
        value_type,
        value: pdu.get_bytes(len)?,
    })
}

fn decode_write(pdu: &mut Pdu) -> Result<WriteEvent, CodecError> {
    Ok(WriteEvent {
        conn_id: pdu.get()?,
        status: pdu.get()?,
        handle: pdu.get()?,
    })
}

fn decode_service_handle(pdu: &mut Pdu) -> Result<ServiceHandleEvent, CodecError> {
    Ok(ServiceHandleEvent {
        status: pdu.get()?,
        server_if: pdu.get()?,
        service_handle: pdu.get()?,
    })
}

/// Receiver of asynchronous GATT events.
///
/// Called on the I/O context. Every method defaults to doing nothing so an
/// implementation only overrides the events it cares about.
#[cfg_attr(test, mockall::automock)]
pub trait GattNotificationHandler: Send + Sync {
    fn register_client(&self, _event: RegisterClientEvent) {}
    fn connect(&self, _event: ConnectEvent) {}
    fn disconnect(&self, _event: ConnectEvent) {}
    fn search_complete(&self, _event: SearchCompleteEvent) {}
    fn register_for_notification(&self, _event: RegisterForNotificationEvent) {}
    fn notify(&self, _event: NotifyEvent) {}
    fn read_characteristic(&self, _event: ReadEvent) {}
    fn write_characteristic(&self, _event: WriteEvent) {}
    fn read_descriptor(&self, _event: ReadEvent) {}
    fn write_descriptor(&self, _event: WriteEvent) {}
    fn execute_write(&self, _event: ExecuteWriteEvent) {}
    fn read_remote_rssi(&self, _event: ReadRemoteRssiEvent) {}
    fn get_gatt_db(&self, _event: GattDbEvent) {}
    fn register_server(&self, _event: RegisterServerEvent) {}
    fn connection(&self, _event: ConnectionEvent) {}
    fn service_added(&self, _event: ServiceAddedEvent) {}
    fn service_stopped(&self, _event: ServiceHandleEvent) {}
    fn service_deleted(&self, _event: ServiceHandleEvent) {}
    fn request_read(&self, _event: RequestReadEvent) {}
    fn request_write(&self, _event: RequestWriteEvent) {}
    fn register_scanner(&self, _event: RegisterScannerEvent) {}
    fn scan_result(&self, _event: ScanResultEvent) {}
    fn register_advertiser(&self, _event: RegisterAdvertiserEvent) {}
    fn start_advertising(&self, _event: StartAdvertisingEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Pack;
    use crate::gatt::types::GattAttrType;
    use crate::pdu::PduHeader;

    fn inbound(opcode: u8, build: impl FnOnce(&mut Pdu)) -> Pdu {
        let mut out = Pdu::new(0x09, opcode);
        build(&mut out);
        let header = PduHeader::new(0x09, opcode, out.len() as u16);
        Pdu::from_parts(header, out.payload().to_vec()).unwrap()
    }

    #[test]
    fn test_decode_register_client() {
        let uuid = Uuid::from_u128(0x1234);
        let mut pdu = inbound(0x81, |p| {
            p.put(&0i32).unwrap();
            p.put(&7i32).unwrap();
            p.put(&uuid).unwrap();
        });
        let n = GattNotification::decode(&mut pdu).unwrap().unwrap();
        assert_eq!(
            n,
            GattNotification::RegisterClient(RegisterClientEvent {
                status: GattStatus::SUCCESS,
                client_if: 7,
                app_uuid: uuid,
            })
        );
        assert_eq!(pdu.remaining(), 0);
    }

    #[test]
    fn test_decode_read_characteristic() {
        let mut pdu = inbound(0x87, |p| {
            p.put(&(3i32, 5i32)).unwrap();
            p.put(&AttHandle(0x2a)).unwrap();
            p.put(&0u8).unwrap();
            p.put(&(0u16, 2u16)).unwrap();
            p.append(&[0xde, 0xad]).unwrap();
        });
        match GattNotification::decode(&mut pdu).unwrap() {
            Some(GattNotification::ReadCharacteristic(e)) => {
                assert_eq!(e.conn_id, 3);
                assert_eq!(e.status, GattStatus::INSUFFICIENT_AUTHENTICATION);
                assert_eq!(e.handle, AttHandle(0x2a));
                assert_eq!(e.value, vec![0xde, 0xad]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_connection_bool_is_four_bytes() {
        let addr = BdAddr([6, 5, 4, 3, 2, 1]);
        let mut pdu = inbound(0xa2, |p| {
            p.put(&(9i32, 2i32, &BoolI32(true))).unwrap();
            addr.pack(p).unwrap();
        });
        let n = GattNotification::decode(&mut pdu).unwrap().unwrap();
        assert_eq!(
            n,
            GattNotification::Connection(ConnectionEvent {
                conn_id: 9,
                server_if: 2,
                connected: true,
                addr,
            })
        );
    }

    #[test]
    fn test_decode_gatt_db() {
        let element = GattDbElement::new(GattAttrType::PrimaryService, Uuid::from_u128(0x180f));
        let mut pdu = inbound(0x8f, |p| {
            p.put(&1i32).unwrap();
            p.put(&Array16(vec![element.clone()])).unwrap();
        });
        match GattNotification::decode(&mut pdu).unwrap() {
            Some(GattNotification::GetGattDb(e)) => assert_eq!(e.db, vec![element]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_request_write() {
        let mut pdu = inbound(0xa9, |p| {
            p.put(&(1i32, 77i32, &BdAddr::ANY)).unwrap();
            p.put(&AttHandle(0x30)).unwrap();
            p.put(&(0i32, 1i32)).unwrap();
            p.append(&[0x42]).unwrap();
            p.put(&(true, false)).unwrap();
        });
        match GattNotification::decode(&mut pdu).unwrap() {
            Some(GattNotification::RequestWrite(e)) => {
                assert_eq!(e.trans_id, 77);
                assert_eq!(e.value, vec![0x42]);
                assert!(e.need_response);
                assert!(!e.is_prepare);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_gaps_and_out_of_range_ignored() {
        for opcode in [0x80u8, 0x8d, 0x8e, 0x90, 0xc0, 0xe8, 0xff] {
            let mut pdu = inbound(opcode, |p| p.append(&[0; 8]).unwrap());
            assert_eq!(GattNotification::decode(&mut pdu).unwrap(), None);
        }
    }

    #[test]
    fn test_truncated_notification() {
        let mut pdu = inbound(0x84, |p| p.put(&1i32).unwrap());
        assert!(matches!(
            GattNotification::decode(&mut pdu),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_deliver_calls_matching_method() {
        let mut handler = MockGattNotificationHandler::new();
        handler
            .expect_search_complete()
            .withf(|e| e.conn_id == 4)
            .times(1)
            .return_const(());
        GattNotification::SearchComplete(SearchCompleteEvent {
            conn_id: 4,
            status: GattStatus::SUCCESS,
        })
        .deliver(&handler);
    }
}
