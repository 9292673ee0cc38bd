use anyhow::{anyhow, bail, Context};
use bluest::Adapter;
use bluest::AdvertisingDevice;
use bluest::Characteristic;
use bluest::Device;
use bluest::Uuid;
use chrono::Local;
use futures_util::StreamExt;
use std::time::Instant;
use tokio::time::timeout;
use tokio::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::dispatch::{CommandId, Dispatcher};
use crate::packet;
use crate::policy::is_charging_allowed;
use crate::session::SessionState;
use crate::telemetry::{TelemetryBus, STATUS_TOPIC};

/// Client for one EVBee charger over Bluetooth Low Energy.
///
/// The charger exposes a UART-style GATT service with one write and one
/// notify characteristic; the binary packet protocol in [`crate::packet`]
/// runs on top of that. A `ChargerClient` owns exactly one connection and is
/// the only writer to the device. When the link drops, [`ChargerClient::run`]
/// returns and the caller decides whether to scan again.
pub struct ChargerClient {
    adapter: Adapter,
    device: Device,
    write: Characteristic,
    notify: Characteristic,
    dispatcher: Dispatcher,
    session: SessionState,
}

impl ChargerClient {
    const BLE_DEVICE_NAME: &'static str = "EVbee_6E0D";
    const UART_SERVICE_ID: &'static str = "55535343-fe7d-4ae5-8fa9-9fafd205e455";
    const UART_WRITE_CHARACTERISTIC_ID: &'static str = "48535343-1e4d-4bd9-ba61-23c647249616";
    const UART_NOTIFY_CHARACTERISTIC_ID: &'static str = "49535343-1e4d-4bd9-ba61-23c647249616";
    // A verbatim payload for the session-opening init command
    const INIT_PAYLOAD: [u8; 8] = *b"12345600";
    // How long to scan before concluding the charger is not around
    const DISCOVERY_TIMEOUT_S: u64 = 30;
    // How fast the connected loop services the outbound slot and the policy
    const TICK_MS: u64 = 10;

    /// How long the caller should wait before rescanning after the charger
    /// was not found. The retry is unbounded; the charger is an appliance
    /// and is expected to come back eventually.
    pub const SCAN_RETRY_S: u64 = 30;

    /// Disconnect from the charger
    pub async fn stop(self) -> anyhow::Result<()> {
        self.adapter.disconnect_device(&self.device).await?;
        Ok(())
    }

    pub async fn new_default_name() -> anyhow::Result<Self> {
        Self::new(Self::BLE_DEVICE_NAME).await
    }

    /// Create a new `ChargerClient`, which includes attempting to discover
    /// and connect to the device.
    pub async fn new(ble_device_name: &str) -> anyhow::Result<Self> {
        let adapter = bluest::Adapter::default()
            .await
            .ok_or(anyhow!("Default adapter not found"))?;
        adapter.wait_available().await?;

        let device = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            Self::discover_device(ble_device_name, &adapter),
        )
        .await
        .map_err(|_| anyhow!("Device not found"))??;

        adapter.connect_device(&device.device).await?;

        let uart_service = device
            .device
            .discover_services_with_uuid(Self::uart_service_id())
            .await?
            .first()
            .ok_or(anyhow!("The device does not expose the EVBee UART service."))?
            .clone();
        let write = uart_service
            .discover_characteristics_with_uuid(Self::uart_write_characteristic_id())
            .await?
            .first()
            .ok_or(anyhow!("The device does not expose the write characteristic."))?
            .clone();
        let notify = uart_service
            .discover_characteristics_with_uuid(Self::uart_notify_characteristic_id())
            .await?
            .first()
            .ok_or(anyhow!("The device does not expose the notify characteristic."))?
            .clone();

        Ok(Self {
            adapter: adapter.clone(),
            device: device.device,
            write,
            notify,
            dispatcher: Dispatcher::default(),
            session: SessionState::default(),
        })
    }

    /// Run the protocol session until the link is lost.
    ///
    /// Sends the init frame, then services two event sources in one loop:
    /// inbound notifications, which are decoded and fed to the dispatcher,
    /// and a short periodic tick, which flushes the single outbound slot and
    /// runs the time-of-use policy check. Keeping both on one task means the
    /// policy's read of the plug status can never race the notification
    /// handler's write of it.
    ///
    /// Returns `Err` on link loss or write failure; both mean the session is
    /// over and the caller should rescan.
    pub async fn run<B: TelemetryBus>(&mut self, bus: &B) -> anyhow::Result<()> {
        self.dispatcher.reset();
        self.session = SessionState::default();

        let mut notifications = self.notify.notify().await?;

        let init = packet::encode(CommandId::Init.id(), &Self::INIT_PAYLOAD);
        log::debug!("TX: {}", hex::encode(&init));
        self.write.write(&init).await.context("init write failed")?;

        let started = Instant::now();
        let mut tick = tokio::time::interval(Duration::from_millis(Self::TICK_MS));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                notification = notifications.next() => match notification {
                    Some(Ok(data)) => {
                        log::debug!("RX: {}", hex::encode(&data));
                        let now_unix = Local::now().timestamp() as u32;
                        process_buffer(&mut self.dispatcher, &mut self.session, bus, &data, now_unix);
                    }
                    Some(Err(err)) => return Err(err).context("notification stream failed"),
                    None => bail!("notification stream ended"),
                },
                _ = tick.tick() => {
                    if !self.device.is_connected().await {
                        bail!("link lost");
                    }
                    if let Some(frame) = self.session.take_outbound() {
                        log::debug!("TX: {}", hex::encode(&frame));
                        self.write.write(&frame).await.context("write failed")?;
                    }
                    let now = Local::now();
                    self.session.policy_tick(
                        self.dispatcher.plug_status(),
                        is_charging_allowed(&now),
                        started.elapsed().as_secs(),
                        now.timestamp() as u32,
                    );
                }
            }
        }
    }

    async fn discover_device(name: &str, adapter: &Adapter) -> anyhow::Result<AdvertisingDevice> {
        let required_services = [Self::uart_service_id()];
        let mut adapter_events = adapter.scan(&required_services).await?;
        while let Some(device) = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            adapter_events.next(),
        )
        .await
        .map_err(|_| anyhow!("Device not found"))?
        {
            let device_name = device.device.name_async().await?;
            if device_name == name {
                return Ok(device);
            }
        }

        Err(anyhow!("Device not found"))
    }

    fn uart_service_id() -> Uuid {
        Uuid::parse_str(Self::UART_SERVICE_ID).unwrap()
    }

    fn uart_write_characteristic_id() -> Uuid {
        Uuid::parse_str(Self::UART_WRITE_CHARACTERISTIC_ID).unwrap()
    }

    fn uart_notify_characteristic_id() -> Uuid {
        Uuid::parse_str(Self::UART_NOTIFY_CHARACTERISTIC_ID).unwrap()
    }
}

/// Walk a notification buffer frame by frame, feeding each decoded frame to
/// the dispatcher and acting on what comes back: replies go to the outbound
/// slot, telemetry goes to the bus. A buffer without the magic prefix is
/// dropped silently; a checksum mismatch is logged but the frame is still
/// processed, matching the device's own lenient consumer.
fn process_buffer<B: TelemetryBus>(
    dispatcher: &mut Dispatcher,
    session: &mut SessionState,
    bus: &B,
    data: &[u8],
    now_unix: u32,
) {
    let mut rest = data;
    while let Some(msg) = packet::decode(rest) {
        let consumed = msg.frame_len().min(rest.len());
        if let Err(err) = packet::verify_checksum(&rest[..consumed]) {
            log::warn!("frame {:#06x}: {err}", msg.command_id);
        }

        let outcome = dispatcher.handle(&msg, now_unix);
        if let Some(reply) = outcome.reply {
            session.stage_outbound(reply);
        }
        if let Some(telemetry) = outcome.telemetry {
            if !bus.is_connected() {
                log::debug!("telemetry bus disconnected, dropping status record");
            } else {
                match serde_json::to_string(&telemetry) {
                    Ok(json) => {
                        if let Err(err) = bus.publish(STATUS_TOPIC, &json) {
                            log::warn!("telemetry publish failed: {err:#}");
                        }
                    }
                    Err(err) => log::warn!("telemetry serialization failed: {err}"),
                }
            }
        }

        rest = &rest[consumed..];
    }
    if !rest.is_empty() {
        log::debug!("dropping unparseable bytes: {}", hex::encode(rest));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::PlugStatus;
    use std::cell::RefCell;

    const NOW: u32 = 1_700_000_000;

    struct RecordingBus {
        records: RefCell<Vec<(String, String)>>,
        connected: bool,
    }

    impl RecordingBus {
        fn new() -> Self {
            Self {
                records: RefCell::new(Vec::new()),
                connected: true,
            }
        }
    }

    impl TelemetryBus for RecordingBus {
        fn publish(&self, topic: &str, json_payload: &str) -> anyhow::Result<()> {
            self.records
                .borrow_mut()
                .push((topic.to_string(), json_payload.to_string()));
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn status_payload(plug: u8) -> [u8; 14] {
        let mut payload = [0u8; 14];
        payload[1] = plug;
        payload[4..6].copy_from_slice(&23000u16.to_le_bytes());
        payload[6..8].copy_from_slice(&1600u16.to_le_bytes());
        payload[8..12].copy_from_slice(&60u32.to_le_bytes());
        payload[12..14].copy_from_slice(&100u16.to_le_bytes());
        payload
    }

    #[test]
    fn handshake_frame_stages_a_reply() {
        let mut dispatcher = Dispatcher::default();
        let mut session = SessionState::default();
        let bus = RecordingBus::new();

        let frame = packet::encode(0x0001, &[]);
        process_buffer(&mut dispatcher, &mut session, &bus, &frame, NOW);

        let reply = packet::decode(&session.take_outbound().unwrap()).unwrap();
        assert_eq!(reply.command_id, 0x0004);
        assert!(bus.records.borrow().is_empty());
    }

    #[test]
    fn concatenated_status_frames_are_both_dispatched() {
        let mut dispatcher = Dispatcher::default();
        let mut session = SessionState::default();
        let bus = RecordingBus::new();

        let mut buffer = packet::encode(0x0105, &status_payload(2));
        buffer.extend_from_slice(&packet::encode(0x0105, &status_payload(1)));
        process_buffer(&mut dispatcher, &mut session, &bus, &buffer, NOW);

        // both frames published, plug status reflects arrival order
        assert_eq!(bus.records.borrow().len(), 2);
        assert_eq!(bus.records.borrow()[0].0, STATUS_TOPIC);
        assert_eq!(dispatcher.plug_status(), PlugStatus::Waiting);
    }

    #[test]
    fn corrupted_checksum_is_still_processed() {
        let mut dispatcher = Dispatcher::default();
        let mut session = SessionState::default();
        let bus = RecordingBus::new();

        let mut frame = packet::encode(0x0105, &status_payload(2));
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        process_buffer(&mut dispatcher, &mut session, &bus, &frame, NOW);

        assert_eq!(dispatcher.plug_status(), PlugStatus::Charging);
        assert_eq!(bus.records.borrow().len(), 1);
    }

    #[test]
    fn garbage_buffer_is_dropped() {
        let mut dispatcher = Dispatcher::default();
        let mut session = SessionState::default();
        let bus = RecordingBus::new();

        process_buffer(&mut dispatcher, &mut session, &bus, &[0x00, 0x01, 0x02], NOW);

        assert_eq!(session.take_outbound(), None);
        assert!(bus.records.borrow().is_empty());
    }

    #[test]
    fn telemetry_is_dropped_while_bus_disconnected() {
        let mut dispatcher = Dispatcher::default();
        let mut session = SessionState::default();
        let mut bus = RecordingBus::new();
        bus.connected = false;

        let frame = packet::encode(0x0105, &status_payload(2));
        process_buffer(&mut dispatcher, &mut session, &bus, &frame, NOW);

        // the protocol side still advances even though nothing was published
        assert_eq!(dispatcher.plug_status(), PlugStatus::Charging);
        assert!(bus.records.borrow().is_empty());
    }
}
