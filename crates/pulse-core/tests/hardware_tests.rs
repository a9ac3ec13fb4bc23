//! Hardware integration tests for pulse-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```
//! cargo test --package pulse-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the device via the `PULSE_DEVICE` environment variable (name
//! substring, address or platform id). Without it the first advertising
//! wearable is used.
//!
//! Example:
//! ```
//! PULSE_DEVICE="HRM-Pro" cargo test --package pulse-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::time::Duration;

use pulse_core::scan::{ScanOptions, scan_with_options};
use pulse_core::{BtleCentral, DeviceSelector, DeviceSession, SessionEvent, SessionState};
use tokio::time::timeout;

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

fn selector() -> DeviceSelector {
    match env::var("PULSE_DEVICE").ok().filter(|s| !s.is_empty()) {
        Some(identifier) => DeviceSelector::wearables().with_identifier(identifier),
        None => DeviceSelector::wearables(),
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_finds_wearables() {
    let options = ScanOptions::default().duration_secs(5).selector(selector());
    let devices = timeout(BLE_TIMEOUT, scan_with_options(options))
        .await
        .expect("scan timed out")
        .expect("scan failed");

    println!("Found {} device(s)", devices.len());
    for device in &devices {
        println!(
            "  {} {:?} rssi={:?} services={}",
            device.identifier,
            device.name,
            device.rssi,
            device.services.len()
        );
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_discover_and_disconnect() {
    let central = BtleCentral::new().await.expect("no adapter");
    let session = DeviceSession::new(central);

    let device = session
        .connect(Some(&selector()))
        .await
        .expect("connect failed");
    println!("Connected to {device}");
    assert_eq!(session.current_state(), SessionState::Ready);

    for service in session.services().await {
        println!("  service {} ({} characteristics)", service.uuid, service.characteristics.len());
    }
    println!("Device info: {:?}", session.device_info().await);
    println!("Battery: {:?}", session.battery_level().await);

    session.disconnect().await;
    assert_eq!(session.current_state(), SessionState::Disconnected);
    assert!(session.services().await.is_empty());
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_heart_rate_notifications_arrive() {
    let central = BtleCentral::new().await.expect("no adapter");
    let session = DeviceSession::new(central);
    let mut rx = session.bus().receiver();

    session
        .connect(Some(&selector()))
        .await
        .expect("connect failed");

    let sample = timeout(BLE_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::Sample { sample, .. }) => break Some(sample),
                Ok(_) => continue,
                Err(_) => break None,
            }
        }
    })
    .await
    .expect("no sample within timeout");
    println!("Sample: {sample:?}");

    session.disconnect().await;
}
