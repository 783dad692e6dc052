/// GATT command/response opcodes
///
/// Responses reuse the opcode of the command they answer; 0x00 carries a
/// daemon error status for whichever command is being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GattOpcode {
    Error = 0x00,
    ClientRegisterClient = 0x01,
    ClientUnregisterClient = 0x02,
    ClientConnect = 0x03,
    ClientDisconnect = 0x04,
    ClientRefresh = 0x05,
    ClientSearchService = 0x06,
    ClientReadCharacteristic = 0x08,
    ClientWriteCharacteristic = 0x0a,
    ClientReadDescriptor = 0x0b,
    ClientWriteDescriptor = 0x0c,
    ClientExecuteWrite = 0x0d,
    ClientRegisterForNotification = 0x0e,
    ClientDeregisterForNotification = 0x0f,
    ClientReadRemoteRssi = 0x10,
    ClientGetDeviceType = 0x11,
    ClientTestCommand = 0x16,
    ClientGetGattDb = 0x17,
    ServerRegisterServer = 0x21,
    ServerUnregisterServer = 0x22,
    ServerConnect = 0x23,
    ServerDisconnect = 0x24,
    ServerAddService = 0x25,
    ServerStopService = 0x26,
    ServerDeleteService = 0x27,
    ServerSendIndication = 0x28,
    ServerSendResponse = 0x29,
    ScannerRegisterScanner = 0x41,
    ScannerUnregister = 0x42,
    ScannerScan = 0x43,
    AdvertiserRegisterAdvertiser = 0x61,
    AdvertiserUnregister = 0x62,
    AdvertiserStartAdvertising = 0x67,
}

impl GattOpcode {
    /// Look up a response opcode. Unassigned values in the command range
    /// return `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        use GattOpcode::*;
        Some(match value {
            0x00 => Error,
            0x01 => ClientRegisterClient,
            0x02 => ClientUnregisterClient,
            0x03 => ClientConnect,
            0x04 => ClientDisconnect,
            0x05 => ClientRefresh,
            0x06 => ClientSearchService,
            0x08 => ClientReadCharacteristic,
            0x0a => ClientWriteCharacteristic,
            0x0b => ClientReadDescriptor,
            0x0c => ClientWriteDescriptor,
            0x0d => ClientExecuteWrite,
            0x0e => ClientRegisterForNotification,
            0x0f => ClientDeregisterForNotification,
            0x10 => ClientReadRemoteRssi,
            0x11 => ClientGetDeviceType,
            0x16 => ClientTestCommand,
            0x17 => ClientGetGattDb,
            0x21 => ServerRegisterServer,
            0x22 => ServerUnregisterServer,
            0x23 => ServerConnect,
            0x24 => ServerDisconnect,
            0x25 => ServerAddService,
            0x26 => ServerStopService,
            0x27 => ServerDeleteService,
            0x28 => ServerSendIndication,
            0x29 => ServerSendResponse,
            0x41 => ScannerRegisterScanner,
            0x42 => ScannerUnregister,
            0x43 => ScannerScan,
            0x61 => AdvertiserRegisterAdvertiser,
            0x62 => AdvertiserUnregister,
            0x67 => AdvertiserStartAdvertising,
            _ => return None,
        })
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}
