use serde::{Serialize, Serializer};

/// Charger-reported state of the physical connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlugStatus {
    #[default]
    Unplugged,
    /// Cable plugged in, charger waiting for permission to charge.
    Waiting,
    Charging,
    /// A status byte we have not seen documented anywhere.
    Unknown(u8),
}

impl PlugStatus {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::Unplugged,
            1 => Self::Waiting,
            2 => Self::Charging,
            other => Self::Unknown(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unplugged => "unplugged",
            Self::Waiting => "waiting",
            Self::Charging => "charging",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// One status report from the charger, as published to the telemetry bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusTelemetry {
    #[serde(serialize_with = "plug_as_str")]
    pub plug: PlugStatus,
    pub voltage_volts: f64,
    pub current_amps: f64,
    pub charge_seconds: u32,
    pub energy_kwh: f64,
}

fn plug_as_str<S: Serializer>(plug: &PlugStatus, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(plug.as_str())
}

impl StatusTelemetry {
    /// Field offsets within a 0x0104/0x0105 status payload:
    ///
    /// Byte  | Meaning
    /// 1     | plug status
    /// 4-5   | voltage in V/100
    /// 6-7   | current in A/100
    /// 8-11  | elapsed charge time in seconds
    /// 12-13 | delivered energy in kWh/1000
    ///
    /// Returns `None` if the payload is shorter than the 14 bytes those
    /// fields occupy.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() < 14 {
            return None;
        }
        let voltage_cv = u16::from_le_bytes([payload[4], payload[5]]);
        let current_ca = u16::from_le_bytes([payload[6], payload[7]]);
        let charge_seconds =
            u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]);
        let energy_wh = u16::from_le_bytes([payload[12], payload[13]]);
        Some(Self {
            plug: PlugStatus::from_byte(payload[1]),
            voltage_volts: voltage_cv as f64 / 100.0,
            current_amps: current_ca as f64 / 100.0,
            charge_seconds,
            energy_kwh: energy_wh as f64 / 1000.0,
        })
    }
}

#[test]
fn test_plug_status_from_byte() {
    assert_eq!(PlugStatus::from_byte(0), PlugStatus::Unplugged);
    assert_eq!(PlugStatus::from_byte(1), PlugStatus::Waiting);
    assert_eq!(PlugStatus::from_byte(2), PlugStatus::Charging);
    assert_eq!(PlugStatus::from_byte(7), PlugStatus::Unknown(7));
}

#[test]
fn test_telemetry_from_payload() {
    let mut payload = [0u8; 14];
    payload[1] = 2;
    payload[4..6].copy_from_slice(&1200u16.to_le_bytes());
    payload[6..8].copy_from_slice(&1600u16.to_le_bytes());
    payload[8..12].copy_from_slice(&3600u32.to_le_bytes());
    payload[12..14].copy_from_slice(&5000u16.to_le_bytes());

    let t = StatusTelemetry::from_payload(&payload).unwrap();
    assert_eq!(t.plug, PlugStatus::Charging);
    assert_eq!(t.voltage_volts, 12.0);
    assert_eq!(t.current_amps, 16.0);
    assert_eq!(t.charge_seconds, 3600);
    assert_eq!(t.energy_kwh, 5.0);
}

#[test]
fn test_telemetry_short_payload() {
    assert_eq!(StatusTelemetry::from_payload(&[0u8; 13]), None);
}

#[test]
fn test_telemetry_serializes_plug_as_string() {
    let t = StatusTelemetry {
        plug: PlugStatus::Waiting,
        voltage_volts: 230.0,
        current_amps: 0.0,
        charge_seconds: 0,
        energy_kwh: 0.0,
    };
    let json = serde_json::to_string(&t).unwrap();
    assert!(json.contains("\"plug\":\"waiting\""));
}
