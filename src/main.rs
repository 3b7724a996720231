use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use log::{info, warn};

use blehrm::prelude::*;
use blehrm::protocol::HEART_RATE_MEASUREMENT_UUID;

const SCAN_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output, e.g.:
    //   RUST_LOG=blehrm=debug cargo run
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mock_mode = std::env::args().any(|a| a == "--mock");
    if mock_mode {
        run_mock().await
    } else {
        run_ble().await
    }
}

fn print_sample(sample: IbiSample) {
    let ibi = sample.interbeat_interval_ms.max(1);
    println!(
        "{:.3}  ibi={ibi:4} ms  hr={:.1} bpm",
        sample.timestamp,
        60_000.0 / f64::from(ibi)
    );
}

/// Scan, print the supported-device table, connect to the first supported
/// device, and stream interbeat intervals until Ctrl-C.
async fn run_ble() -> Result<()> {
    let registry = Registry::with_defaults();
    info!("Registered families: {}", registry.family_ids().join(", "));

    let devices = blehrm::ble::scan(Duration::from_secs(SCAN_SECS)).await?;
    let descriptors: Vec<DeviceDescriptor> =
        devices.iter().map(|d| d.descriptor.clone()).collect();
    let matched = registry.match_all(&descriptors);
    println!("{}\n", registry.format_device_table(&matched));

    let Some((descriptor, family_id)) = matched.first() else {
        info!("No supported devices in range — try `blehrm --mock`.");
        return Ok(());
    };
    info!("Connecting to {descriptor} as {family_id} …");

    let discovered = devices
        .iter()
        .find(|d| d.descriptor.address == descriptor.address)
        .context("matched device vanished from the scan results")?;
    let mut reader = registry.create_reader(descriptor, Box::new(discovered.transport()))?;
    reader.connect().await?;

    match reader.device_info().await {
        Ok(device_info) => println!("{device_info}"),
        Err(e) => warn!("Could not read device info: {e}"),
    }

    reader.start_ibi_stream(print_sample).await?;
    info!("Streaming interbeat intervals. Press Ctrl-C to stop.");

    let mut notifications = reader.notification_stream().await?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            notification = notifications.next() => match notification {
                Some((uuid, data)) => {
                    if let Err(e) = reader.handle_notification(uuid, &data) {
                        warn!("Dispatch error: {e}");
                    }
                }
                None => {
                    info!("Notification stream ended — device disconnected.");
                    return Ok(());
                }
            },
        }
    }

    reader.stop_ibi_stream().await.ok();
    reader.disconnect().await?;
    info!("Stream stopped.");
    Ok(())
}

/// Stream from the simulated family — no adapter or hardware required.
async fn run_mock() -> Result<()> {
    let registry = Registry::with_defaults();
    let descriptor = DeviceDescriptor::new("MockSensor-1", "mock:01");
    let (transport, _handle) = MockTransport::new();

    let mut reader = registry.create_reader(&descriptor, Box::new(transport))?;
    reader.connect().await?;
    println!("{}", reader.device_info().await?);

    reader.start_ibi_stream(print_sample).await?;
    info!("Streaming simulated interbeat intervals. Press Ctrl-C to stop.");

    let mut generator = MockGenerator::from_entropy();
    loop {
        let (delay, payload) = generator.next_ibi();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(delay) => {
                reader.handle_notification(HEART_RATE_MEASUREMENT_UUID, &payload)?;
            }
        }
    }

    reader.stop_ibi_stream().await.ok();
    reader.disconnect().await?;
    info!("Stream stopped.");
    Ok(())
}
