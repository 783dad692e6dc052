// LE advertising
//
// An advertiser lives from start_advertising until stop_advertising. If the
// daemon refuses to start advertising the registration is torn down again
// straight away.

use super::state::{respond, respond_opt, AdvertiserRecord, Reply};
use super::{take_key, Context, GattEvent, GattManager, GattManagerError, Op, RecordKey};
use crate::gatt::notification::RegisterAdvertiserEvent;
use crate::gatt::types::AdvertiseData;
use crate::gatt::GattReply;
use crate::types::BluetoothStatus;
use tracing::{debug, info, warn};
use uuid::Uuid;

fn unregister(ctx: &Context, advertiser: &AdvertiserRecord) {
    ctx.interface.unregister_advertiser(
        advertiser.advertiser_id,
        ctx.completion(advertiser.key, Op::UnregisterAdvertiser),
    );
}

impl GattManager {
    pub(super) fn start_advertising(
        &mut self,
        app_uuid: Uuid,
        data: AdvertiseData,
        scan_response: AdvertiseData,
        reply: Reply<()>,
    ) {
        if self.advertisers.contains_key(&app_uuid) {
            return respond(reply, Err(GattManagerError::Busy));
        }

        let mut advertiser =
            AdvertiserRecord::new(take_key(&mut self.next_key), app_uuid, data, scan_response);
        advertiser.start = Some(reply);
        self.ctx.interface.register_advertiser(
            app_uuid,
            self.ctx.completion(advertiser.key, Op::RegisterAdvertiser),
        );
        self.advertisers.insert(app_uuid, advertiser);
    }

    pub(super) fn stop_advertising(&mut self, app_uuid: Uuid, reply: Reply<()>) {
        let Some(advertiser) = self.advertisers.get_mut(&app_uuid) else {
            return respond(reply, Err(GattManagerError::InvalidParameter));
        };
        if advertiser.stop.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }
        if advertiser.advertiser_id == 0 {
            // Still registering; there is nothing to unregister yet
            return respond(reply, Err(GattManagerError::NotReady));
        }

        advertiser.stop = Some(reply);
        unregister(&self.ctx, advertiser);
    }

    pub(super) fn on_register_advertiser(&mut self, event: RegisterAdvertiserEvent) {
        let ctx = &self.ctx;
        let Some(advertiser) = self.advertisers.get_mut(&event.app_uuid) else {
            return;
        };
        if advertiser.advertiser_id != 0 {
            return;
        }

        if !event.status.is_success() {
            warn!(app_uuid = %event.app_uuid, status = %event.status, "advertiser registration failed");
            respond_opt(
                advertiser.start.take(),
                Err(GattManagerError::RegistrationFailed),
            );
            self.advertisers.remove(&event.app_uuid);
            return;
        }

        debug!(app_uuid = %event.app_uuid, advertiser_id = event.advertiser_id, "advertiser registered");
        advertiser.advertiser_id = event.advertiser_id;
        ctx.emit(GattEvent::AdvertiserRegistered {
            app_uuid: advertiser.app_uuid,
            advertiser_id: advertiser.advertiser_id,
        });
        ctx.interface.start_advertising(
            advertiser.advertiser_id,
            ctx.params.clone(),
            advertiser.data.clone(),
            advertiser.scan_response.clone(),
            ctx.completion(advertiser.key, Op::StartAdvertising),
        );
    }

    pub(super) fn advertiser_completed(
        &mut self,
        key: RecordKey,
        op: Op,
        result: Result<GattReply, BluetoothStatus>,
    ) {
        let ctx = &self.ctx;
        let Some(advertiser) = self.advertisers.values_mut().find(|a| a.key == key) else {
            debug!(key, ?op, "completion for removed advertiser");
            return;
        };
        let app_uuid = advertiser.app_uuid;

        match (op, result) {
            (Op::RegisterAdvertiser, Err(status)) => {
                warn!(%app_uuid, %status, "register advertiser command failed");
                respond_opt(
                    advertiser.start.take(),
                    Err(GattManagerError::RegistrationFailed),
                );
                self.advertisers.remove(&app_uuid);
            }
            (Op::StartAdvertising, Ok(_)) => {
                info!(%app_uuid, advertiser_id = advertiser.advertiser_id, "advertising started");
                respond_opt(advertiser.start.take(), Ok(()));
            }
            (Op::StartAdvertising, Err(status)) => {
                warn!(%app_uuid, %status, "failed to start advertising");
                respond_opt(advertiser.start.take(), Err(GattManagerError::Daemon(status)));
                unregister(ctx, advertiser);
                self.advertisers.remove(&app_uuid);
            }
            (Op::UnregisterAdvertiser, Ok(_)) => {
                info!(%app_uuid, "advertising stopped");
                let reply = advertiser.stop.take();
                self.advertisers.remove(&app_uuid);
                respond_opt(reply, Ok(()));
            }
            (Op::UnregisterAdvertiser, Err(status)) => {
                respond_opt(advertiser.stop.take(), Err(GattManagerError::Daemon(status)));
            }
            (_, Ok(_)) => {}
            (op, Err(status)) => debug!(?op, %status, "unexpected advertiser completion"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::gatt::notification::GattNotification;
    use crate::gatt::types::GattStatus;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready_eq};

    fn app() -> Uuid {
        Uuid::from_u128(0xad)
    }

    fn registered(status: GattStatus) -> GattNotification {
        GattNotification::RegisterAdvertiser(RegisterAdvertiserEvent {
            status,
            advertiser_id: 5,
            app_uuid: app(),
        })
    }

    fn named(name: &str) -> AdvertiseData {
        AdvertiseData {
            local_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_start_and_stop_advertising() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move {
            handle
                .start_advertising(app(), named("bt"), AdvertiseData::default())
                .await
        });
        assert_pending!(fut.poll());
        h.pump();

        assert_eq!(h.ack().opcode(), 0x61);
        h.notify(registered(GattStatus::SUCCESS));
        let start = h.ack();
        assert_eq!(start.opcode(), 0x67);
        assert_eq!(start.payload()[0], 5);
        assert_ready_eq!(fut.poll(), Ok(()));
        assert_eq!(
            h.events(),
            vec![GattEvent::AdvertiserRegistered {
                app_uuid: app(),
                advertiser_id: 5
            }]
        );

        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.stop_advertising(app()).await });
        assert_pending!(fut.poll());
        h.pump();
        let stop = h.ack();
        assert_eq!(stop.opcode(), 0x62);
        assert_eq!(stop.payload(), &[5]);
        assert_ready_eq!(fut.poll(), Ok(()));
        assert!(h.manager.advertisers.is_empty());
    }

    #[test]
    fn test_duplicate_app_is_busy() {
        let mut h = Harness::new();
        let first = h.handle.clone();
        let second = h.handle.clone();
        let mut fut1 = task::spawn(async move {
            first
                .start_advertising(app(), AdvertiseData::default(), AdvertiseData::default())
                .await
        });
        let mut fut2 = task::spawn(async move {
            second
                .start_advertising(app(), AdvertiseData::default(), AdvertiseData::default())
                .await
        });
        assert_pending!(fut1.poll());
        assert_pending!(fut2.poll());
        h.pump();
        assert_ready_eq!(fut2.poll(), Err(GattManagerError::Busy));
        assert_eq!(h.sent(), vec![0x61]);
    }

    #[test]
    fn test_start_error_unregisters() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move {
            handle
                .start_advertising(app(), AdvertiseData::default(), AdvertiseData::default())
                .await
        });
        assert_pending!(fut.poll());
        h.pump();
        h.ack();
        h.notify(registered(GattStatus::SUCCESS));
        h.fail(BluetoothStatus::ParmInvalid);

        assert_ready_eq!(
            fut.poll(),
            Err(GattManagerError::Daemon(BluetoothStatus::ParmInvalid))
        );
        assert_eq!(h.sent(), vec![0x62]);
        assert!(h.manager.advertisers.is_empty());
        // The late unregister completion finds no record
        h.ack();
    }

    #[test]
    fn test_oversized_data_fails_locally() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move {
            handle
                .start_advertising(
                    app(),
                    named("a name far too long for a legacy advertising packet"),
                    AdvertiseData::default(),
                )
                .await
        });
        assert_pending!(fut.poll());
        h.pump();
        h.ack();
        h.notify(registered(GattStatus::SUCCESS));

        // Packing failed before anything was sent; only the unregister goes out
        assert_ready_eq!(
            fut.poll(),
            Err(GattManagerError::Daemon(BluetoothStatus::ParmInvalid))
        );
        assert_eq!(h.sent(), vec![0x62]);
    }

    #[test]
    fn test_registration_failure_removes_record() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move {
            handle
                .start_advertising(app(), AdvertiseData::default(), AdvertiseData::default())
                .await
        });
        assert_pending!(fut.poll());
        h.pump();
        h.ack();
        h.notify(registered(GattStatus::ERROR));
        assert_ready_eq!(fut.poll(), Err(GattManagerError::RegistrationFailed));
        assert!(h.manager.advertisers.is_empty());
    }

    #[test]
    fn test_stop_unknown_advertiser() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.stop_advertising(app()).await });
        assert_pending!(fut.poll());
        h.pump();
        assert_ready_eq!(fut.poll(), Err(GattManagerError::InvalidParameter));
    }
}
