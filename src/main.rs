use evbee::{ChargerClient, LogTelemetryBus};
use tokio::time::Duration;

/// Scan, connect, run the session until the link drops, repeat forever.
/// Nothing here is fatal: a charger that is out of range or powered off is
/// expected to reappear eventually, so device-not-found just means "scan
/// again in a while". A dropped session rescans immediately, since the
/// device is usually still in range after a hiccup.
#[tokio::main]
async fn main() {
    env_logger::init();

    let bus = LogTelemetryBus;

    loop {
        match ChargerClient::new_default_name().await {
            Ok(mut client) => {
                log::info!("connected to charger");
                if let Err(err) = client.run(&bus).await {
                    log::warn!("session ended: {err:#}");
                }
                if let Err(err) = client.stop().await {
                    log::debug!("disconnect failed: {err:#}");
                }
            }
            Err(err) => {
                log::warn!(
                    "charger not reachable, retrying in {}s: {err:#}",
                    ChargerClient::SCAN_RETRY_S
                );
                tokio::time::sleep(Duration::from_secs(ChargerClient::SCAN_RETRY_S)).await;
            }
        }
    }
}
