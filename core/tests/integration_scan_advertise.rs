// LE scanning and advertising end to end: bridge ↔ in-memory daemon

mod common;

use btbridge_core::gatt::AdvertiseData;
use btbridge_core::{BdAddr, DeviceType, GattEvent, GattManagerError};
use common::*;
use uuid::Uuid;

const SCANNER_ID: u8 = 3;
const ADVERTISER_ID: u8 = 1;

#[tokio::test]
async fn test_scan_reports_devices_and_cleans_up() {
    let (mut bridge, mut daemon) = start_bridge().await;
    let mut events = bridge.take_events().unwrap();

    let gatt = bridge.gatt().clone();
    let start = tokio::spawn(async move { gatt.start_le_scan(vec![]).await });

    let mut register = daemon.ack(GATT, 0x41).await;
    let scan_uuid = register.get::<Uuid>().unwrap();
    assert_eq!(scan_uuid.get_version_num(), 4);
    daemon
        .notify(GATT, 0xc1, |p| put_all(p, &[&0i32, &SCANNER_ID, &scan_uuid]))
        .await;

    let scan = daemon.ack(GATT, 0x43).await;
    assert_eq!(scan.payload(), &[1]);
    assert_eq!(start.await.unwrap(), Ok(scan_uuid));
    assert_eq!(
        next_event(&mut events).await,
        GattEvent::ScannerRegistered {
            scan_uuid,
            scanner_id: SCANNER_ID
        }
    );

    let peer = BdAddr([1, 2, 3, 4, 5, 6]);
    daemon
        .notify(GATT, 0xcd, |p| {
            put_all(p, &[&peer, &-58i32, &3u16]);
            p.append(&[2, 1, 6]).unwrap();
        })
        .await;
    let query = daemon.expect(GATT, 0x11).await;
    assert_eq!(query.payload(), peer.as_bytes());
    // Response carrying the device type
    daemon
        .notify(GATT, 0x11, |p| put_all(p, &[&(DeviceType::Ble as u8)]))
        .await;
    assert_eq!(
        next_event(&mut events).await,
        GattEvent::LeDeviceFound {
            addr: peer,
            rssi: -58,
            adv_data: vec![2, 1, 6],
            device_type: DeviceType::Ble
        }
    );

    let gatt = bridge.gatt().clone();
    let stop = tokio::spawn(async move { gatt.stop_le_scan(scan_uuid).await });
    let scan = daemon.ack(GATT, 0x43).await;
    assert_eq!(scan.payload(), &[0]);
    assert_eq!(stop.await.unwrap(), Ok(()));

    let unregister = daemon.ack(GATT, 0x42).await;
    assert_eq!(unregister.payload(), &[SCANNER_ID]);
}

#[tokio::test]
async fn test_scanner_registration_failure() {
    let (bridge, mut daemon) = start_bridge().await;

    let gatt = bridge.gatt().clone();
    let start = tokio::spawn(async move { gatt.start_le_scan(vec![]).await });
    let mut register = daemon.ack(GATT, 0x41).await;
    let scan_uuid = register.get::<Uuid>().unwrap();
    daemon
        .notify(GATT, 0xc1, |p| put_all(p, &[&0x85i32, &0u8, &scan_uuid]))
        .await;

    assert_eq!(
        start.await.unwrap(),
        Err(GattManagerError::RegistrationFailed)
    );
    assert_eq!(
        bridge.gatt().stop_le_scan(scan_uuid).await,
        Err(GattManagerError::InvalidParameter)
    );
}

#[tokio::test]
async fn test_advertising_lifecycle() {
    let (mut bridge, mut daemon) = start_bridge().await;
    let mut events = bridge.take_events().unwrap();
    let app = Uuid::from_u128(0xad);

    let data = AdvertiseData {
        local_name: Some("bridge".into()),
        ..Default::default()
    };
    let gatt = bridge.gatt().clone();
    let start = tokio::spawn(async move {
        gatt.start_advertising(app, data, AdvertiseData::default())
            .await
    });

    let register = daemon.ack(GATT, 0x61).await;
    assert_eq!(register.payload(), app.as_bytes());
    daemon
        .notify(GATT, 0xe1, |p| put_all(p, &[&0i32, &ADVERTISER_ID, &app]))
        .await;

    let mut command = daemon.ack(GATT, 0x67).await;
    assert_eq!(command.get::<u8>().unwrap(), ADVERTISER_ID);
    // Connectable, no scan response
    assert_eq!(command.get::<u16>().unwrap(), 0x0013);
    assert_eq!(start.await.unwrap(), Ok(()));
    assert_eq!(
        next_event(&mut events).await,
        GattEvent::AdvertiserRegistered {
            app_uuid: app,
            advertiser_id: ADVERTISER_ID
        }
    );

    assert_eq!(
        bridge
            .gatt()
            .start_advertising(app, AdvertiseData::default(), AdvertiseData::default())
            .await,
        Err(GattManagerError::Busy)
    );

    let gatt = bridge.gatt().clone();
    let stop = tokio::spawn(async move { gatt.stop_advertising(app).await });
    let unregister = daemon.ack(GATT, 0x62).await;
    assert_eq!(unregister.payload(), &[ADVERTISER_ID]);
    assert_eq!(stop.await.unwrap(), Ok(()));

    assert_eq!(
        bridge.gatt().stop_advertising(app).await,
        Err(GattManagerError::InvalidParameter)
    );
}

#[tokio::test]
async fn test_start_advertising_error_unregisters() {
    let (bridge, mut daemon) = start_bridge().await;
    let app = Uuid::from_u128(0xae);

    let gatt = bridge.gatt().clone();
    let start = tokio::spawn(async move {
        gatt.start_advertising(app, AdvertiseData::default(), AdvertiseData::default())
            .await
    });
    daemon.ack(GATT, 0x61).await;
    daemon
        .notify(GATT, 0xe1, |p| put_all(p, &[&0i32, &ADVERTISER_ID, &app]))
        .await;
    daemon.expect(GATT, 0x67).await;
    // Busy
    daemon.reply_error(GATT, 4).await;

    assert_eq!(
        start.await.unwrap(),
        Err(GattManagerError::Daemon(btbridge_core::BluetoothStatus::Busy))
    );
    let unregister = daemon.ack(GATT, 0x62).await;
    assert_eq!(unregister.payload(), &[ADVERTISER_ID]);
}
