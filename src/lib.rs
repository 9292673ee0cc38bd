//! Control an EVBee EV charger over Bluetooth Low Energy.
//!
//! The charger has a BLE interface exposing a UART-style GATT service. On top
//! of that runs a proprietary framed binary protocol which I have attempted
//! to partially reverse engineer: enough to complete the charger's
//! initialization handshake, read its status notifications, and tell it to
//! start or stop charging.
//!
//! The crate drives the charger from a fixed time-of-use schedule (weekends
//! and off-peak weekday hours) and republishes decoded status telemetry as
//! JSON for dashboards and automation.
//!
//! # Example
//!
//! ```no_run
//! # use evbee::{ChargerClient, LogTelemetryBus};
//! # #[tokio::main]
//! # pub async fn main() {
//!     let mut client = ChargerClient::new_default_name().await.unwrap();
//!     let bus = LogTelemetryBus;
//!     // runs until the link drops
//!     let err = client.run(&bus).await.unwrap_err();
//!     eprintln!("session over: {err}");
//! # }
//! ```

mod charger_client;
mod dispatch;
mod error;
mod packet;
mod policy;
mod session;
mod status;
mod telemetry;

pub use charger_client::ChargerClient;
pub use dispatch::{CommandId, Dispatcher, Outcome};
pub use error::CodecError;
pub use packet::{decode, encode, verify_checksum, DecodedMessage};
pub use policy::is_charging_allowed;
pub use session::SessionState;
pub use status::{PlugStatus, StatusTelemetry};
pub use telemetry::{LogTelemetryBus, TelemetryBus, STATUS_TOPIC};
