//! Show command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use super::device_client;
use crate::config::Config;
use crate::gateway::{address_group, DeviceGateway};
use crate::validation::parse_ipv4;

/// Run the show command
pub async fn run(list: bool, config_path: &Path) -> Result<()> {
    let mut config = Config::from_file(config_path)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    crate::validation::validate_url("device.url (ER_URL)", &config.device.url)?;
    if config.device.group.is_empty() {
        anyhow::bail!("device.group (ER_GROUP) must be set");
    }

    let gateway = device_client(&config)?;
    gateway.login().await.context("Failed to log in to the device")?;
    let document = gateway
        .get()
        .await
        .context("Failed to fetch device configuration")?;
    let members = address_group(&document, &config.device.group)?;

    let (ipv4, other): (Vec<&String>, Vec<&String>) =
        members.iter().partition(|m| parse_ipv4(m).is_some());

    println!();
    println!("Address group: {}", config.device.group);
    println!("  IPv4 addresses: {}", ipv4.len());
    if !other.is_empty() {
        println!("  Other entries (not managed): {}", other.len());
    }

    if list {
        println!();
        for member in &members {
            println!("  {}", member);
        }
    }

    Ok(())
}
