//! Basic example: scan for nearby BLE devices until the scan times out
//!
//! Run with: cargo run --example scan_devices

use gattlink::{DeviceManager, Result};
use std::sync::Arc;
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gattlink=debug".parse().unwrap()),
        )
        .init();

    let manager = DeviceManager::new().await?;
    println!(
        "Scanning for {:?}. Press Ctrl+C to stop early.\n",
        manager.scanner().timeout()
    );

    let _discovered = manager.on_device_discovered(|device| {
        println!(
            "Discovered {} [{}] at {} dBm (~{:.1} m)",
            device.display_name(),
            device.address,
            device.rssi,
            device.estimated_distance_m()
        );
    });

    let _updated = manager.on_device_updated(|device| {
        println!("  {} now at {} dBm", device.address, device.rssi);
    });

    let done = Arc::new(Notify::new());
    let notifier = done.clone();
    let _complete = manager.on_scan_complete(move || notifier.notify_one());

    manager.start_scanning()?;

    tokio::select! {
        _ = done.notified() => println!("\nScan complete"),
        _ = tokio::signal::ctrl_c() => {
            println!("\nStopping scan");
            manager.stop_scanning();
        }
    }

    println!("\n=== Devices by signal strength ===");
    for device in manager.get_devices_by_signal() {
        println!(
            "{:>5} dBm  {:<24} {}  seen {} times, first at {}",
            device.rssi,
            device.display_name(),
            device.address,
            device.sightings,
            device.first_seen.format("%H:%M:%S")
        );
    }
    println!("\n{} device(s) found", manager.device_count());

    manager.shutdown()?;
    Ok(())
}
