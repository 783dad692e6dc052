// LE scanning
//
// Each scan owns a short-lived scanner registration: register, start, and
// once the scan is stopped (or failed to start) unregister again.

use super::state::{respond, respond_opt, Reply, ScannerRecord};
use super::{take_key, Context, GattEvent, GattManager, GattManagerError, Op, RecordKey};
use crate::gatt::notification::{RegisterScannerEvent, ScanResultEvent};
use crate::gatt::GattReply;
use crate::types::{BdAddr, BluetoothStatus, DeviceType};
use tracing::{debug, info, warn};
use uuid::Uuid;

fn unregister(ctx: &Context, scanner: &ScannerRecord) {
    ctx.interface.unregister_scanner(
        scanner.scanner_id,
        ctx.completion(scanner.key, Op::UnregisterScanner),
    );
}

impl GattManager {
    pub(super) fn start_le_scan(&mut self, service_uuids: Vec<Uuid>, reply: Reply<Uuid>) {
        if !service_uuids.is_empty() {
            debug!(count = service_uuids.len(), "scan service filters are not applied by the daemon");
        }

        let scan_uuid = Uuid::new_v4();
        let mut scanner = ScannerRecord::new(take_key(&mut self.next_key), scan_uuid);
        scanner.start = Some(reply);
        self.ctx.interface.register_scanner(
            scan_uuid,
            self.ctx.completion(scanner.key, Op::RegisterScanner),
        );
        self.scanners.insert(scan_uuid, scanner);
    }

    pub(super) fn stop_le_scan(&mut self, scan_uuid: Uuid, reply: Reply<()>) {
        let scanner = match self.scanners.get_mut(&scan_uuid) {
            Some(scanner) if !scanner.unregistering => scanner,
            _ => return respond(reply, Err(GattManagerError::InvalidParameter)),
        };
        if scanner.stop.is_some() || scanner.start.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        scanner.stop = Some(reply);
        self.ctx
            .interface
            .scan(false, self.ctx.completion(scanner.key, Op::Scan { start: false }));
    }

    pub(super) fn on_register_scanner(&mut self, event: RegisterScannerEvent) {
        let ctx = &self.ctx;
        let Some(scanner) = self.scanners.get_mut(&event.app_uuid) else {
            return;
        };
        if scanner.scanner_id != 0 {
            return;
        }

        if !event.status.is_success() {
            warn!(scan_uuid = %event.app_uuid, status = %event.status, "scanner registration failed");
            respond_opt(scanner.start.take(), Err(GattManagerError::RegistrationFailed));
            self.scanners.remove(&event.app_uuid);
            return;
        }

        debug!(scan_uuid = %event.app_uuid, scanner_id = event.scanner_id, "scanner registered");
        scanner.scanner_id = event.scanner_id;
        ctx.emit(GattEvent::ScannerRegistered {
            scan_uuid: scanner.scan_uuid,
            scanner_id: scanner.scanner_id,
        });
        ctx.interface
            .scan(true, ctx.completion(scanner.key, Op::Scan { start: true }));
    }

    /// Resolve the device type before reporting a scan result
    pub(super) fn on_scan_result(&mut self, event: ScanResultEvent) {
        let ScanResultEvent {
            addr,
            rssi,
            adv_data,
        } = event;
        self.ctx.interface.get_device_type(
            addr,
            self.ctx.completion(
                0,
                Op::DeviceType {
                    addr,
                    rssi,
                    adv_data,
                },
            ),
        );
    }

    pub(super) fn device_type_completed(
        &mut self,
        addr: BdAddr,
        rssi: i32,
        adv_data: Vec<u8>,
        result: Result<GattReply, BluetoothStatus>,
    ) {
        let device_type = match result {
            Ok(GattReply::DeviceType(device_type)) => device_type,
            other => {
                debug!(%addr, ?other, "device type unavailable, assuming LE");
                DeviceType::Ble
            }
        };
        self.ctx.emit(GattEvent::LeDeviceFound {
            addr,
            rssi,
            adv_data,
            device_type,
        });
    }

    pub(super) fn scanner_completed(
        &mut self,
        key: RecordKey,
        op: Op,
        result: Result<GattReply, BluetoothStatus>,
    ) {
        let ctx = &self.ctx;
        let Some(scanner) = self.scanners.values_mut().find(|s| s.key == key) else {
            debug!(key, ?op, "completion for removed scanner");
            return;
        };
        let scan_uuid = scanner.scan_uuid;

        match (op, result) {
            (Op::RegisterScanner, Err(status)) => {
                warn!(%scan_uuid, %status, "register scanner command failed");
                respond_opt(scanner.start.take(), Err(GattManagerError::RegistrationFailed));
                self.scanners.remove(&scan_uuid);
            }
            (Op::Scan { start: true }, Ok(_)) => {
                info!(%scan_uuid, "LE scan started");
                respond_opt(scanner.start.take(), Ok(scan_uuid));
            }
            (Op::Scan { start: true }, Err(status)) => {
                warn!(%scan_uuid, %status, "failed to start LE scan");
                respond_opt(scanner.start.take(), Err(GattManagerError::Daemon(status)));
                if scanner.scanner_id != 0 {
                    scanner.unregistering = true;
                    unregister(ctx, scanner);
                } else {
                    self.scanners.remove(&scan_uuid);
                }
            }
            (Op::Scan { start: false }, Ok(_)) => {
                info!(%scan_uuid, "LE scan stopped");
                respond_opt(scanner.stop.take(), Ok(()));
                scanner.unregistering = true;
                unregister(ctx, scanner);
            }
            (Op::Scan { start: false }, Err(status)) => {
                respond_opt(scanner.stop.take(), Err(GattManagerError::Daemon(status)));
            }
            (Op::UnregisterScanner, result) => {
                if let Err(status) = result {
                    warn!(%scan_uuid, %status, "failed to unregister scanner");
                }
                self.scanners.remove(&scan_uuid);
            }
            (_, Ok(_)) => {}
            (op, Err(status)) => debug!(?op, %status, "unexpected scanner completion"),
        }
    }
}
