// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust Modbus simulator library
//!
//! This library hosts several independent simulated Modbus TCP devices, each
//! one a table of coils and holding registers served on its own port. The
//! operator can edit and observe the tables, randomize them, and replay scripted
//! sequences of writes, optionally gated on a condition over live values.
//!
//! - [`modbus`]: register tables and their Modbus TCP endpoints
//! - [`fleet`]: lifecycle of the devices and of the actors driving them
//! - [`simulation`]: poller, randomizer and event scheduler
//! - [`persistence`]: device table and scenario files
//! - [`config`]: YAML configuration

pub mod config;
pub mod error;
pub mod fleet;
pub mod modbus;
pub mod persistence;
pub mod simulation;

pub use error::{SimulatorError, SimulatorResult};
