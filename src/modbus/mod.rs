// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus device model
//!
//! This module provides the per-device register model of the simulator and the
//! Modbus TCP endpoint that exposes it to external clients.
//!
//! ## Key Components
//!
//! - `DataBank`: the authoritative coil/holding register store of one device,
//!   shared between the endpoint and the register table.
//! - `ModbusDeviceService`: the `tokio-modbus` service answering requests
//!   against a data bank.
//! - `DeviceEndpoint`: one TCP listener bound to one port, serving one data bank.
//! - `RegisterTable`: the operator-facing view of a device. Every mutation goes
//!   through it so that the cached view and the data bank stay consistent.
//!
//! ## Register Map
//!
//! Every simulated device exposes two address spaces, both starting at 0:
//!
//! - Coils (read/write bits), function codes 0x01, 0x05, 0x0F
//! - Holding registers (read/write 16-bit words), function codes 0x03, 0x06, 0x10, 0x17
//!
//! Their sizes are fixed when the device is started.

pub mod data_bank;
pub mod endpoint;
pub mod modbus_server;
pub mod register_table;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use data_bank::{DataBank, SharedDataBank};
pub use endpoint::DeviceEndpoint;
pub use modbus_server::ModbusDeviceService;
pub use register_table::{RegisterTable, TableSnapshot, WriteOutcome};

/// The two addressable point families of a simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointKind {
    /// Single-bit read/write flag
    Coil,
    /// 16-bit unsigned read/write value
    Register,
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointKind::Coil => write!(f, "Coil"),
            PointKind::Register => write!(f, "Register"),
        }
    }
}

impl FromStr for PointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coil" => Ok(PointKind::Coil),
            "register" => Ok(PointKind::Register),
            other => Err(format!("unknown point type '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_kind_parsing() {
        assert_eq!("Coil".parse::<PointKind>(), Ok(PointKind::Coil));
        assert_eq!(" register ".parse::<PointKind>(), Ok(PointKind::Register));
        assert!("input".parse::<PointKind>().is_err());
        assert_eq!(PointKind::Register.to_string(), "Register");
    }
}
