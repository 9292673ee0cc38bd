//! Boundary to the external telemetry bus.
//!
//! The real deployment publishes to an MQTT broker; that client, including
//! its reconnect policy, lives outside this crate. The orchestrator only
//! needs somewhere to hand a JSON status record, so the boundary is a trait.

/// Topic that charger status records are published on.
pub const STATUS_TOPIC: &str = "power/evse/status";

/// A client of the external message bus.
///
/// `publish` is fire-and-forget from the protocol's point of view: a failed
/// publication is logged by the caller and never interrupts the charger
/// session.
pub trait TelemetryBus {
    fn publish(&self, topic: &str, json_payload: &str) -> anyhow::Result<()>;
    fn is_connected(&self) -> bool;
}

/// Bus stand-in that writes records to the log instead of a broker.
/// Useful when running without an MQTT connection configured.
pub struct LogTelemetryBus;

impl TelemetryBus for LogTelemetryBus {
    fn publish(&self, topic: &str, json_payload: &str) -> anyhow::Result<()> {
        log::info!("{topic}: {json_payload}");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}
