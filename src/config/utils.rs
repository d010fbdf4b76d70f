// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::debug;

use super::Config;

/// Largest table a Modbus device can address
const MAX_TABLE_SIZE: usize = 65536;

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./modbus_simulator --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;
    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against rules the JSON schema cannot express.
///
/// # Validation Rules
///
/// - **Port Range**: the base port is at least 1 and the last device port
///   (`base_port + device_count - 1`) does not exceed 65535
/// - **Fleet Size**: at least one device is configured
/// - **Table Size**: coils and registers per device do not exceed 65536
/// - **Intervals**: every actor interval is greater than zero
/// - **Address Format**: the bind address is an IP address or "localhost"
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");
    let fleet = &config.fleet;

    if fleet.base_port == 0 {
        anyhow::bail!("Invalid base port: 0");
    }
    if fleet.device_count == 0 {
        anyhow::bail!("At least one device must be configured");
    }
    if fleet.ports().is_none() {
        anyhow::bail!(
            "{} devices starting at port {} would exceed port 65535",
            fleet.device_count,
            fleet.base_port
        );
    }

    if fleet.coils_per_device > MAX_TABLE_SIZE {
        anyhow::bail!(
            "Too many coils per device: {} (maximum {})",
            fleet.coils_per_device,
            MAX_TABLE_SIZE
        );
    }
    if fleet.registers_per_device > MAX_TABLE_SIZE {
        anyhow::bail!(
            "Too many registers per device: {} (maximum {})",
            fleet.registers_per_device,
            MAX_TABLE_SIZE
        );
    }

    for (name, value) in [
        ("randomizer.interval_ms", config.randomizer.interval_ms),
        ("poller.interval_ms", config.poller.interval_ms),
        ("scheduler.condition_poll_ms", config.scheduler.condition_poll_ms),
        ("scheduler.replay_tick_ms", config.scheduler.replay_tick_ms),
    ] {
        if value == 0 {
            anyhow::bail!("{} must be greater than zero", name);
        }
    }

    if !is_valid_ip_address(&fleet.address) {
        anyhow::bail!("Invalid bind address: {}", fleet.address);
    }

    Ok(())
}
