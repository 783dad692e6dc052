// GATT command packers
//
// One variant per daemon command. Field order and widths follow the daemon's
// wire format exactly; in particular only ClientSearchService carries its
// UUID byte-reversed, every register command sends it in natural order.

use super::opcode::GattOpcode;
use super::types::{
    AdvertiseData, AdvertisingParams, AttHandle, GattAuthReq, GattDbElement, GattResponse,
    GattStatus, GattWriteType,
};
use super::SERVICE_ID;
use crate::codec::{len_u16, Array16, BoolI32, CodecError, ReversedUuid};
use crate::pdu::Pdu;
use crate::types::{BdAddr, LinkTransport};
use uuid::Uuid;

/// Advertising event properties for connectable advertising with and
/// without a scan response
const ADV_PROPS_NO_SCAN_RESPONSE: u16 = 0x0013;
const ADV_PROPS_WITH_SCAN_RESPONSE: u16 = 0x0012;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattCommand {
    ClientRegisterClient {
        app_uuid: Uuid,
    },
    ClientUnregisterClient {
        client_if: i32,
    },
    ClientConnect {
        client_if: i32,
        addr: BdAddr,
        is_direct: bool,
        transport: LinkTransport,
    },
    ClientDisconnect {
        client_if: i32,
        addr: BdAddr,
        conn_id: i32,
    },
    ClientRefresh {
        client_if: i32,
        addr: BdAddr,
    },
    /// `None` searches every service
    ClientSearchService {
        conn_id: i32,
        filter: Option<Uuid>,
    },
    ClientReadCharacteristic {
        conn_id: i32,
        handle: AttHandle,
        auth_req: GattAuthReq,
    },
    ClientWriteCharacteristic {
        conn_id: i32,
        handle: AttHandle,
        write_type: GattWriteType,
        auth_req: GattAuthReq,
        value: Vec<u8>,
    },
    ClientReadDescriptor {
        conn_id: i32,
        handle: AttHandle,
        auth_req: GattAuthReq,
    },
    ClientWriteDescriptor {
        conn_id: i32,
        handle: AttHandle,
        write_type: GattWriteType,
        auth_req: GattAuthReq,
        value: Vec<u8>,
    },
    ClientExecuteWrite {
        conn_id: i32,
        execute: bool,
    },
    ClientRegisterForNotification {
        client_if: i32,
        addr: BdAddr,
        handle: AttHandle,
    },
    ClientDeregisterForNotification {
        client_if: i32,
        addr: BdAddr,
        handle: AttHandle,
    },
    ClientReadRemoteRssi {
        client_if: i32,
        addr: BdAddr,
    },
    ClientGetDeviceType {
        addr: BdAddr,
    },
    ClientTestCommand {
        command: i32,
        addr: BdAddr,
        params: [u16; 5],
    },
    ClientGetGattDb {
        conn_id: i32,
    },
    ServerRegisterServer {
        app_uuid: Uuid,
    },
    ServerUnregisterServer {
        server_if: i32,
    },
    ServerConnect {
        server_if: i32,
        addr: BdAddr,
        is_direct: bool,
        transport: LinkTransport,
    },
    ServerDisconnect {
        server_if: i32,
        addr: BdAddr,
        conn_id: i32,
    },
    ServerAddService {
        server_if: i32,
        db: Vec<GattDbElement>,
    },
    ServerStopService {
        server_if: i32,
        service_handle: AttHandle,
    },
    ServerDeleteService {
        server_if: i32,
        service_handle: AttHandle,
    },
    ServerSendIndication {
        server_if: i32,
        handle: AttHandle,
        conn_id: i32,
        confirm: bool,
        value: Vec<u8>,
    },
    ServerSendResponse {
        conn_id: i32,
        trans_id: i32,
        status: GattStatus,
        response: GattResponse,
    },
    ScannerRegisterScanner {
        app_uuid: Uuid,
    },
    ScannerUnregister {
        scanner_id: u8,
    },
    ScannerScan {
        start: bool,
    },
    AdvertiserRegisterAdvertiser {
        app_uuid: Uuid,
    },
    AdvertiserUnregister {
        advertiser_id: u8,
    },
    AdvertiserStartAdvertising {
        advertiser_id: u8,
        params: AdvertisingParams,
        data: AdvertiseData,
        scan_response: AdvertiseData,
    },
}

impl GattCommand {
    pub fn opcode(&self) -> GattOpcode {
        use GattCommand::*;
        match self {
            ClientRegisterClient { .. } => GattOpcode::ClientRegisterClient,
            ClientUnregisterClient { .. } => GattOpcode::ClientUnregisterClient,
            ClientConnect { .. } => GattOpcode::ClientConnect,
            ClientDisconnect { .. } => GattOpcode::ClientDisconnect,
            ClientRefresh { .. } => GattOpcode::ClientRefresh,
            ClientSearchService { .. } => GattOpcode::ClientSearchService,
            ClientReadCharacteristic { .. } => GattOpcode::ClientReadCharacteristic,
            ClientWriteCharacteristic { .. } => GattOpcode::ClientWriteCharacteristic,
            ClientReadDescriptor { .. } => GattOpcode::ClientReadDescriptor,
            ClientWriteDescriptor { .. } => GattOpcode::ClientWriteDescriptor,
            ClientExecuteWrite { .. } => GattOpcode::ClientExecuteWrite,
            ClientRegisterForNotification { .. } => GattOpcode::ClientRegisterForNotification,
            ClientDeregisterForNotification { .. } => GattOpcode::ClientDeregisterForNotification,
            ClientReadRemoteRssi { .. } => GattOpcode::ClientReadRemoteRssi,
            ClientGetDeviceType { .. } => GattOpcode::ClientGetDeviceType,
            ClientTestCommand { .. } => GattOpcode::ClientTestCommand,
            ClientGetGattDb { .. } => GattOpcode::ClientGetGattDb,
            ServerRegisterServer { .. } => GattOpcode::ServerRegisterServer,
            ServerUnregisterServer { .. } => GattOpcode::ServerUnregisterServer,
            ServerConnect { .. } => GattOpcode::ServerConnect,
            ServerDisconnect { .. } => GattOpcode::ServerDisconnect,
            ServerAddService { .. } => GattOpcode::ServerAddService,
            ServerStopService { .. } => GattOpcode::ServerStopService,
            ServerDeleteService { .. } => GattOpcode::ServerDeleteService,
            ServerSendIndication { .. } => GattOpcode::ServerSendIndication,
            ServerSendResponse { .. } => GattOpcode::ServerSendResponse,
            ScannerRegisterScanner { .. } => GattOpcode::ScannerRegisterScanner,
            ScannerUnregister { .. } => GattOpcode::ScannerUnregister,
            ScannerScan { .. } => GattOpcode::ScannerScan,
            AdvertiserRegisterAdvertiser { .. } => GattOpcode::AdvertiserRegisterAdvertiser,
            AdvertiserUnregister { .. } => GattOpcode::AdvertiserUnregister,
            AdvertiserStartAdvertising { .. } => GattOpcode::AdvertiserStartAdvertising,
        }
    }

    /// Build the command PDU. Fails locally, before anything is sent, when
    /// an argument cannot be represented on the wire.
    pub fn to_pdu(&self) -> Result<Pdu, CodecError> {
        let mut pdu = Pdu::new(SERVICE_ID, self.opcode().as_u8());
        self.pack(&mut pdu)?;
        Ok(pdu)
    }

    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        use GattCommand::*;
        match self {
            ClientRegisterClient { app_uuid }
            | ServerRegisterServer { app_uuid }
            | ScannerRegisterScanner { app_uuid }
            | AdvertiserRegisterAdvertiser { app_uuid } => pdu.put(app_uuid),

            ClientUnregisterClient { client_if } => pdu.put(client_if),
            ServerUnregisterServer { server_if } => pdu.put(server_if),

            ClientConnect {
                client_if: handle,
                addr,
                is_direct,
                transport,
            }
            | ServerConnect {
                server_if: handle,
                addr,
                is_direct,
                transport,
            } => {
                pdu.put(&(handle, addr, is_direct))?;
                pdu.put(transport)
            }

            ClientDisconnect {
                client_if: handle,
                addr,
                conn_id,
            }
            | ServerDisconnect {
                server_if: handle,
                addr,
                conn_id,
            } => pdu.put(&(handle, addr, conn_id)),

            ClientRefresh { client_if, addr } | ClientReadRemoteRssi { client_if, addr } => {
                pdu.put(&(client_if, addr))
            }

            ClientSearchService { conn_id, filter } => {
                let uuid = filter.unwrap_or_else(Uuid::nil);
                pdu.put(&(conn_id, &filter.is_some(), &ReversedUuid(uuid)))
            }

            ClientReadCharacteristic {
                conn_id,
                handle,
                auth_req,
            }
            | ClientReadDescriptor {
                conn_id,
                handle,
                auth_req,
            } => pdu.put(&(conn_id, handle, auth_req)),

            ClientWriteCharacteristic {
                conn_id,
                handle,
                write_type,
                auth_req,
                value,
            }
            | ClientWriteDescriptor {
                conn_id,
                handle,
                write_type,
                auth_req,
                value,
            } => {
                let length = i32::from(len_u16("write value", value.len())?);
                pdu.put(&(conn_id, handle, write_type))?;
                pdu.put(&(length, auth_req))?;
                pdu.append(value)
            }

            ClientExecuteWrite { conn_id, execute } => pdu.put(&(conn_id, &BoolI32(*execute))),

            ClientRegisterForNotification {
                client_if,
                addr,
                handle,
            }
            | ClientDeregisterForNotification {
                client_if,
                addr,
                handle,
            } => pdu.put(&(client_if, addr, handle)),

            ClientGetDeviceType { addr } => pdu.put(addr),

            ClientTestCommand {
                command,
                addr,
                params,
            } => {
                pdu.put(&(command, addr))?;
                params.iter().try_for_each(|p| pdu.put(p))
            }

            ClientGetGattDb { conn_id } => pdu.put(conn_id),

            ServerAddService { server_if, db } => pdu.put(&(server_if, &Array16(db.clone()))),

            ServerStopService {
                server_if,
                service_handle,
            }
            | ServerDeleteService {
                server_if,
                service_handle,
            } => pdu.put(&(server_if, service_handle)),

            ServerSendIndication {
                server_if,
                handle,
                conn_id,
                confirm,
                value,
            } => {
                let length = i32::from(len_u16("indication value", value.len())?);
                pdu.put(&(server_if, handle, conn_id))?;
                pdu.put(&(length, &BoolI32(*confirm)))?;
                pdu.append(value)
            }

            ServerSendResponse {
                conn_id,
                trans_id,
                status,
                response,
            } => {
                if response.value.len() > GattResponse::MAX_VALUE_LEN {
                    return Err(CodecError::ValueTooLong {
                        field: "response value",
                        len: response.value.len(),
                        max: GattResponse::MAX_VALUE_LEN,
                    });
                }
                pdu.put(&(conn_id, trans_id, &response.handle))?;
                pdu.put(&(&response.offset, &response.auth_req, status))?;
                pdu.put(&(response.value.len() as u16))?;
                pdu.append(&response.value)
            }

            ScannerUnregister { scanner_id } => pdu.put(scanner_id),
            ScannerScan { start } => pdu.put(start),
            AdvertiserUnregister { advertiser_id } => pdu.put(advertiser_id),

            AdvertiserStartAdvertising {
                advertiser_id,
                params,
                data,
                scan_response,
            } => {
                let adv = data.encode(params.tx_power)?;
                let scan_rsp = scan_response.encode(params.tx_power)?;
                let props = if scan_rsp.is_empty() {
                    ADV_PROPS_NO_SCAN_RESPONSE
                } else {
                    ADV_PROPS_WITH_SCAN_RESPONSE
                };
                pdu.put(&(advertiser_id, &props))?;
                pdu.put(&(&params.min_interval, &params.max_interval, &params.channel_map))?;
                pdu.put(&(&params.tx_power, &params.primary_phy, &params.secondary_phy))?;
                // Scan request notifications stay disabled
                pdu.put(&0u8)?;
                pdu.put(&(adv.len() as u16, scan_rsp.len() as u16))?;
                pdu.append(&adv)?;
                pdu.append(&scan_rsp)?;
                pdu.put(&params.timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::types::GattAttrType;

    fn payload(cmd: GattCommand) -> Vec<u8> {
        cmd.to_pdu().unwrap().payload().to_vec()
    }

    fn uuid() -> Uuid {
        Uuid::from_bytes([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15])
    }

    #[test]
    fn test_register_uuid_natural_order() {
        let pdu = GattCommand::ClientRegisterClient { app_uuid: uuid() }
            .to_pdu()
            .unwrap();
        assert_eq!(pdu.service(), 0x09);
        assert_eq!(pdu.opcode(), 0x01);
        assert_eq!(pdu.payload(), uuid().as_bytes());
    }

    #[test]
    fn test_search_service_uuid_reversed() {
        let bytes = payload(GattCommand::ClientSearchService {
            conn_id: 3,
            filter: Some(uuid()),
        });
        assert_eq!(&bytes[..5], &[3, 0, 0, 0, 1]);
        assert_eq!(bytes[5], 15);
        assert_eq!(bytes[20], 0);
        assert_eq!(bytes.len(), 21);
    }

    #[test]
    fn test_connect_layout() {
        let bytes = payload(GattCommand::ClientConnect {
            client_if: 7,
            addr: BdAddr([1, 2, 3, 4, 5, 6]),
            is_direct: true,
            transport: LinkTransport::Auto,
        });
        assert_eq!(bytes, vec![7, 0, 0, 0, 1, 2, 3, 4, 5, 6, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_read_characteristic_layout() {
        let bytes = payload(GattCommand::ClientReadCharacteristic {
            conn_id: 1,
            handle: AttHandle(0x0203),
            auth_req: GattAuthReq::Mitm,
        });
        assert_eq!(bytes, vec![1, 0, 0, 0, 0x03, 0x02, 2, 0, 0, 0]);
    }

    #[test]
    fn test_write_characteristic_layout() {
        let bytes = payload(GattCommand::ClientWriteCharacteristic {
            conn_id: 1,
            handle: AttHandle(5),
            write_type: GattWriteType::Normal,
            auth_req: GattAuthReq::None,
            value: vec![0xaa, 0xbb],
        });
        assert_eq!(
            bytes,
            vec![1, 0, 0, 0, 5, 0, 2, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0xaa, 0xbb]
        );
    }

    #[test]
    fn test_stop_service_packs_u16_handle() {
        let bytes = payload(GattCommand::ServerStopService {
            server_if: 2,
            service_handle: AttHandle(0x28),
        });
        assert_eq!(bytes, vec![2, 0, 0, 0, 0x28, 0]);
    }

    #[test]
    fn test_unregister_server_opcode() {
        let pdu = GattCommand::ServerUnregisterServer { server_if: 1 }
            .to_pdu()
            .unwrap();
        assert_eq!(pdu.opcode(), 0x22);
    }

    #[test]
    fn test_add_service_array() {
        let db = vec![GattDbElement::new(GattAttrType::PrimaryService, uuid())];
        let bytes = payload(GattCommand::ServerAddService { server_if: 1, db });
        assert_eq!(bytes.len(), 4 + 2 + GattDbElement::WIRE_SIZE);
        assert_eq!(&bytes[4..6], &[1, 0]);
    }

    #[test]
    fn test_send_indication_layout() {
        let bytes = payload(GattCommand::ServerSendIndication {
            server_if: 1,
            handle: AttHandle(0x10),
            conn_id: 4,
            confirm: true,
            value: vec![9],
        });
        assert_eq!(
            bytes,
            vec![1, 0, 0, 0, 0x10, 0, 4, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 9]
        );
    }

    #[test]
    fn test_send_response_layout() {
        let bytes = payload(GattCommand::ServerSendResponse {
            conn_id: 4,
            trans_id: 9,
            status: GattStatus::REQUEST_NOT_SUPPORTED,
            response: GattResponse {
                handle: AttHandle(0x11),
                offset: 2,
                auth_req: 0,
                value: vec![0x55],
            },
        });
        assert_eq!(
            bytes,
            vec![4, 0, 0, 0, 9, 0, 0, 0, 0x11, 0, 2, 0, 0, 6, 0, 0, 0, 1, 0, 0x55]
        );
    }

    #[test]
    fn test_send_response_value_limit() {
        let err = GattCommand::ServerSendResponse {
            conn_id: 1,
            trans_id: 1,
            status: GattStatus::SUCCESS,
            response: GattResponse {
                value: vec![0; 601],
                ..Default::default()
            },
        }
        .to_pdu()
        .unwrap_err();
        assert!(matches!(err, CodecError::ValueTooLong { max: 600, .. }));
    }

    #[test]
    fn test_start_advertising_layout() {
        let bytes = payload(GattCommand::AdvertiserStartAdvertising {
            advertiser_id: 3,
            params: AdvertisingParams::default(),
            data: AdvertiseData {
                include_tx_power: true,
                ..Default::default()
            },
            scan_response: AdvertiseData::default(),
        });
        let expected: Vec<u8> = vec![
            3, // advertiser id
            0x13, 0x00, // props: no scan response
            0x40, 0x06, 0, 0, // 1600
            0xa4, 0x06, 0, 0, // 1700
            0x07, // channel map
            0xf9, // tx power -7
            1, 1, // phys
            0, // scan request notify
            3, 0, // adv len
            0, 0, // scan response len
            2, 0x0a, 0xf9, // tx power AD structure
            0, 0, 0, 0, // timeout
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_start_advertising_props_with_scan_response() {
        let bytes = payload(GattCommand::AdvertiserStartAdvertising {
            advertiser_id: 1,
            params: AdvertisingParams::default(),
            data: AdvertiseData::default(),
            scan_response: AdvertiseData {
                appearance: Some(0x0340),
                ..Default::default()
            },
        });
        assert_eq!(&bytes[1..3], &[0x12, 0x00]);
    }

    #[test]
    fn test_test_command_layout() {
        let bytes = payload(GattCommand::ClientTestCommand {
            command: 1,
            addr: BdAddr::ANY,
            params: [1, 2, 3, 4, 5],
        });
        assert_eq!(bytes.len(), 4 + 6 + 10);
        assert_eq!(&bytes[10..12], &[1, 0]);
    }
}
