// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error types shared by the simulation engine
//!
//! Per-item failures (one device failing to bind, one malformed import row)
//! are reported through these variants and never abort the surrounding batch.

use thiserror::Error;

use crate::modbus::PointKind;

/// Errors raised by the register tables, the fleet and the simulation actors
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Unable to bind device on port {port}: {reason}")]
    BindFailure { port: u16, reason: String },

    #[error("{kind} address {address} is out of range for device {port} (size {len})")]
    OutOfRangeAddress {
        port: u16,
        kind: PointKind,
        address: usize,
        len: usize,
    },

    #[error("Value {value} is out of range for a {kind}")]
    ValueOutOfRange { kind: PointKind, value: i64 },

    #[error("No device is running on port {port}")]
    UnknownDevice { port: u16 },

    #[error("Malformed import row at line {line}: {reason}")]
    MalformedImport { line: u64, reason: String },

    #[error("{what} is already running")]
    AlreadyRunning { what: &'static str },

    #[error("Invalid condition: {reason}")]
    InvalidCondition { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type SimulatorResult<T> = Result<T, SimulatorError>;
