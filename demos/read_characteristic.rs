//! Connect to a device, print its profile and read one characteristic
//!
//! Run with:
//!   cargo run --example read_characteristic -- <address> [service] [characteristic]
//!
//! Service and characteristic default to the Battery Service and Battery
//! Level. UUIDs may be given in 16-bit (`180f`), 32-bit or full form.

use gattlink::ble::uuids::{parse_uuid, BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID};
use gattlink::{bytes_to_hex, AttributeRegistry, DeviceManager, Error, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,gattlink=debug")
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(address) = args.first().cloned() else {
        eprintln!("usage: read_characteristic <address> [service] [characteristic]");
        return Err(Error::InvalidParameter {
            name: "address".to_string(),
            value: String::new(),
        });
    };
    let service = args
        .get(1)
        .map(|s| parse_uuid(s))
        .transpose()?
        .unwrap_or(BATTERY_SERVICE_UUID);
    let characteristic = args
        .get(2)
        .map(|s| parse_uuid(s))
        .transpose()?
        .unwrap_or(BATTERY_LEVEL_UUID);

    let manager = DeviceManager::new().await?;
    let registry = AttributeRegistry::standard();

    // The platform only knows peripherals it has seen advertise.
    println!("Looking for {}...", address);
    manager.start_scanning()?;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while manager.get_device(&address).is_none() {
        if tokio::time::Instant::now() > deadline {
            println!("Device not found");
            manager.shutdown()?;
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    println!("Connecting...");
    let services = manager.connect(&address, Duration::from_secs(15)).await?;

    println!("\n=== Profile ===");
    for service in &services {
        println!("{}", registry.describe(&service.uuid));
        for chr in &service.characteristics {
            println!("  {} {}", registry.describe(&chr.uuid), chr.properties);
        }
    }

    println!(
        "\nReading {} / {}",
        registry.describe(&service),
        registry.describe(&characteristic)
    );
    match manager
        .client()
        .read_value(service, characteristic, Duration::from_secs(5))
        .await
    {
        Ok(value) => println!("Value: {} ({} bytes)", bytes_to_hex(&value), value.len()),
        Err(e) => println!("Read failed: {}", e),
    }

    manager.shutdown()?;
    Ok(())
}
