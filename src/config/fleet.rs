// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use serde::{Deserialize, Serialize};

/// Configuration of the simulated device fleet.
///
/// Devices are started on consecutive TCP ports beginning at `base_port`,
/// each one exposing `coils_per_device` coils and `registers_per_device`
/// holding registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// The network address every device endpoint binds to.
    ///
    /// Can be an IPv4/IPv6 address or "localhost". Default is "127.0.0.1".
    /// Use "0.0.0.0" to expose the devices on all IPv4 interfaces.
    pub address: String,

    /// Port of the first device. Default is 502, the standard Modbus TCP port.
    pub base_port: u16,

    /// Number of devices to start. Default is 1.
    pub device_count: u16,

    /// Number of coils of each device. Default is 10.
    pub coils_per_device: usize,

    /// Number of holding registers of each device. Default is 10.
    pub registers_per_device: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            base_port: 502,
            device_count: 1,
            coils_per_device: 10,
            registers_per_device: 10,
        }
    }
}

impl FleetConfig {
    /// Ports the fleet occupies, or `None` if they do not fit below 65536
    pub fn ports(&self) -> Option<std::ops::RangeInclusive<u16>> {
        let last = self
            .base_port
            .checked_add(self.device_count.checked_sub(1)?)?;
        Some(self.base_port..=last)
    }
}
