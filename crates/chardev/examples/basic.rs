//! Basic example demonstrating the chardev lifecycle.
//!
//! This example shows:
//! - Bringing a driver up through the five registration stages
//! - Writing through one session and reading through another
//! - Taking a one-shot snapshot through the mirror entry
//! - Tearing everything down in reverse order
//!
//! Run with: `cargo run --example basic -p chardev`

use std::sync::Arc;

use chardev::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    // The registry stands in for the kernel's registration tables.
    let registry = Arc::new(DeviceRegistry::new());

    // Acquire identity, device, class, node, and mirror in order.
    let driver = chardev::initialize(registry.clone(), DriverConfig::default())?;
    tracing::info!(id = %driver.id(), "device is up");

    // A writer session fills the shared buffer.
    let device = registry.device("chrdev0")?;
    let mut writer = device.open()?;
    let n = writer.write(&b"hello from user space"[..])?;
    tracing::info!(bytes = n, "wrote through the primary access point");

    // A second session has its own cursor and sees the bytes from the
    // start.
    let mut reader = device.open()?;
    let mut buf = [0u8; 64];
    let n = reader.read(&mut buf[..])?;
    tracing::info!(payload = ?&buf[..n], "read back through a fresh session");

    // The mirror entry yields one snapshot, then end-of-data.
    let mut mirror = registry.mirror("chrdev")?.open();
    let first = mirror.read(&mut buf[..])?;
    let second = mirror.read(&mut buf[..])?;
    tracing::info!(first, second, "mirror snapshot is one-shot");

    drop(writer);
    drop(reader);

    // Release mirror, node, class, device, identity, in that order.
    driver.teardown();
    assert!(registry.is_empty());

    Ok(())
}
