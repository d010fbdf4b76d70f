// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register table of one simulated device
//!
//! A `RegisterTable` owns a cached view of the device's coils and holding
//! registers and shares the authoritative `DataBank` with the device endpoint.
//! The operator, the randomizer and the event scheduler all mutate a device
//! through this type, so every write is mirrored into the data bank the same way.
//!
//! ### Thread Safety
//!
//! Each public operation runs under the table's cache lock, taken before the
//! data bank lock. The Modbus service only ever takes the data bank lock, so
//! the lock order is acyclic and every operation is atomic with respect to the
//! other actors. No lock is held across an `.await`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use rand::Rng;
use serde::Serialize;

use super::data_bank::{lock_bank, DataBank, SharedDataBank};
use super::PointKind;
use crate::error::{SimulatorError, SimulatorResult};

/// Point-in-time copy of a device's contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    pub port: u16,
    pub coils: Vec<bool>,
    pub registers: Vec<u16>,
}

impl TableSnapshot {
    /// Value at `address` as a number (coils read as 0 or 1)
    pub fn value(&self, kind: PointKind, address: usize) -> Option<u16> {
        match kind {
            PointKind::Coil => self.coils.get(address).map(|&c| u16::from(c)),
            PointKind::Register => self.registers.get(address).copied(),
        }
    }
}

/// Result of a runtime write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value was stored and mirrored to the endpoint
    Applied,
    /// The address was outside the table, nothing changed
    Ignored,
}

/// Coils and holding registers of one device, sized once at construction
#[derive(Debug)]
pub struct RegisterTable {
    port: u16,
    num_coils: usize,
    num_registers: usize,
    cache: Mutex<TableSnapshot>,
    data_bank: SharedDataBank,
}

impl RegisterTable {
    /// Create a zeroed table for the device on `port`
    pub fn new(port: u16, num_coils: usize, num_registers: usize) -> Self {
        Self::with_contents(port, vec![false; num_coils], vec![0; num_registers])
    }

    /// Create a table preloaded with the given contents
    pub fn with_contents(port: u16, coils: Vec<bool>, registers: Vec<u16>) -> Self {
        let data_bank = DataBank::with_contents(coils.clone(), registers.clone()).into_shared();
        Self {
            port,
            num_coils: coils.len(),
            num_registers: registers.len(),
            cache: Mutex::new(TableSnapshot {
                port,
                coils,
                registers,
            }),
            data_bank,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn num_coils(&self) -> usize {
        self.num_coils
    }

    pub fn num_registers(&self) -> usize {
        self.num_registers
    }

    /// Number of addressable points of the given kind
    pub fn len(&self, kind: PointKind) -> usize {
        match kind {
            PointKind::Coil => self.num_coils,
            PointKind::Register => self.num_registers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_coils == 0 && self.num_registers == 0
    }

    /// The data bank to hand over to the device endpoint
    pub fn data_bank(&self) -> SharedDataBank {
        SharedDataBank::clone(&self.data_bank)
    }

    /// Validate an address when authoring events or conditions
    pub fn check_address(&self, kind: PointKind, address: usize) -> SimulatorResult<()> {
        let len = self.len(kind);
        if address < len {
            Ok(())
        } else {
            Err(SimulatorError::OutOfRangeAddress {
                port: self.port,
                kind,
                address,
                len,
            })
        }
    }

    /// Write one point and mirror it to the endpoint's data bank
    ///
    /// Coils accept any integer (non-zero means set). Registers accept
    /// 0..=65535 and reject anything else with `ValueOutOfRange`. An address
    /// beyond the table is silently ignored.
    pub fn write(&self, kind: PointKind, address: usize, value: i64) -> SimulatorResult<WriteOutcome> {
        if address >= self.len(kind) {
            debug!(
                "Device {}: ignoring write to {} {} (out of range)",
                self.port, kind, address
            );
            return Ok(WriteOutcome::Ignored);
        }

        let mut cache = self.lock_cache();
        let mut bank = lock_bank(&self.data_bank);
        match kind {
            PointKind::Coil => store_coil(&mut cache, &mut bank, address, value != 0),
            PointKind::Register => {
                let value = register_value(value)?;
                store_register(&mut cache, &mut bank, address, value);
            }
        }
        Ok(WriteOutcome::Applied)
    }

    /// Pull the endpoint's data bank into the cache and return the result
    ///
    /// A short or missing read keeps the previous cached values for that
    /// address space.
    pub fn read_all(&self) -> TableSnapshot {
        let mut cache = self.lock_cache();
        let bank = lock_bank(&self.data_bank);

        match bank.get_coils(0, self.num_coils) {
            Some(coils) if coils.len() == self.num_coils => cache.coils = coils,
            _ => debug!("Device {}: discarding incomplete coil read", self.port),
        }
        match bank.get_holding_registers(0, self.num_registers) {
            Some(registers) if registers.len() == self.num_registers => {
                cache.registers = registers
            }
            _ => debug!("Device {}: discarding incomplete register read", self.port),
        }

        cache.clone()
    }

    /// Cached view without reconciling against the endpoint
    pub fn snapshot(&self) -> TableSnapshot {
        self.lock_cache().clone()
    }

    /// Current value of one point, reconciled against the endpoint first
    pub fn live_value(&self, kind: PointKind, address: usize) -> Option<u16> {
        self.read_all().value(kind, address)
    }

    /// Set every coil and register to zero
    pub fn reset_all(&self) {
        let mut cache = self.lock_cache();
        let mut bank = lock_bank(&self.data_bank);
        cache.coils.fill(false);
        cache.registers.fill(0);
        bank.set_coils(0, &cache.coils);
        bank.set_holding_registers(0, &cache.registers);
    }

    /// Draw a uniform random value for every point
    ///
    /// Coils are drawn from {0, 1} and registers from 0..=65535, then stored
    /// one by one through the same path as `write`.
    pub fn randomize_all<R: Rng + ?Sized>(&self, rng: &mut R) {
        let mut cache = self.lock_cache();
        let mut bank = lock_bank(&self.data_bank);
        for address in 0..self.num_coils {
            let value: i64 = rng.random_range(0..=1);
            store_coil(&mut cache, &mut bank, address, value != 0);
        }
        for address in 0..self.num_registers {
            let value = rng.random_range(0..=u16::MAX);
            store_register(&mut cache, &mut bank, address, value);
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, TableSnapshot> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Validate a register value against the 16-bit range
pub fn register_value(value: i64) -> SimulatorResult<u16> {
    u16::try_from(value).map_err(|_| SimulatorError::ValueOutOfRange {
        kind: PointKind::Register,
        value,
    })
}

fn store_coil(cache: &mut TableSnapshot, bank: &mut DataBank, address: usize, value: bool) {
    cache.coils[address] = value;
    bank.set_coils(address, std::slice::from_ref(&value));
}

fn store_register(cache: &mut TableSnapshot, bank: &mut DataBank, address: usize, value: u16) {
    cache.registers[address] = value;
    bank.set_holding_registers(address, std::slice::from_ref(&value));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_write_then_read_all() {
        let table = RegisterTable::new(502, 4, 4);
        assert_eq!(table.write(PointKind::Coil, 1, 7).unwrap(), WriteOutcome::Applied);
        assert_eq!(table.write(PointKind::Register, 3, 65535).unwrap(), WriteOutcome::Applied);
        assert_eq!(table.write(PointKind::Register, 0, 0).unwrap(), WriteOutcome::Applied);

        let snapshot = table.read_all();
        assert_eq!(snapshot.coils, vec![false, true, false, false]);
        assert_eq!(snapshot.registers, vec![0, 0, 0, 65535]);
    }

    #[test]
    fn test_write_is_mirrored_to_data_bank() {
        let table = RegisterTable::new(502, 2, 2);
        table.write(PointKind::Register, 1, 42).unwrap();
        let bank = table.data_bank();
        assert_eq!(lock_bank(&bank).get_holding_registers(0, 2), Some(vec![0, 42]));
    }

    #[test]
    fn test_out_of_range_write_is_ignored() {
        let table = RegisterTable::new(502, 2, 2);
        table.write(PointKind::Coil, 0, 1).unwrap();
        assert_eq!(table.write(PointKind::Coil, 2, 1).unwrap(), WriteOutcome::Ignored);
        assert_eq!(table.write(PointKind::Register, 99, 5).unwrap(), WriteOutcome::Ignored);

        let snapshot = table.read_all();
        assert_eq!(snapshot.coils, vec![true, false]);
        assert_eq!(snapshot.registers.len(), 2);
    }

    #[test]
    fn test_register_value_out_of_range_is_rejected() {
        let table = RegisterTable::new(502, 1, 1);
        assert!(matches!(
            table.write(PointKind::Register, 0, 65536),
            Err(SimulatorError::ValueOutOfRange { value: 65536, .. })
        ));
        assert!(table.write(PointKind::Register, 0, -1).is_err());
        assert_eq!(table.snapshot().registers, vec![0]);
    }

    #[test]
    fn test_protocol_side_writes_show_up_after_read_all() {
        let table = RegisterTable::new(502, 2, 2);
        lock_bank(&table.data_bank()).set_holding_registers(0, &[11]);
        assert_eq!(table.snapshot().registers, vec![0, 0]);
        assert_eq!(table.read_all().registers, vec![11, 0]);
        assert_eq!(table.live_value(PointKind::Register, 0), Some(11));
    }

    #[test]
    fn test_reset_all() {
        let table = RegisterTable::with_contents(502, vec![true, true], vec![9, 9, 9]);
        table.reset_all();
        let snapshot = table.read_all();
        assert!(snapshot.coils.iter().all(|c| !c));
        assert!(snapshot.registers.iter().all(|&r| r == 0));
    }

    #[test]
    fn test_randomize_all_reaches_boundaries() {
        let table = RegisterTable::new(502, 64, 4096);
        let mut rng = StdRng::seed_from_u64(7);
        let (mut coil_seen, mut register_min, mut register_max) = ([false; 2], false, false);

        for _ in 0..512 {
            table.randomize_all(&mut rng);
            let snapshot = table.read_all();
            for &c in &snapshot.coils {
                coil_seen[usize::from(c)] = true;
            }
            register_min |= snapshot.registers.contains(&0);
            register_max |= snapshot.registers.contains(&u16::MAX);
        }

        assert_eq!(coil_seen, [true, true]);
        assert!(register_min && register_max);
    }

    #[test]
    fn test_check_address() {
        let table = RegisterTable::new(502, 3, 1);
        assert!(table.check_address(PointKind::Coil, 2).is_ok());
        assert!(matches!(
            table.check_address(PointKind::Register, 1),
            Err(SimulatorError::OutOfRangeAddress { len: 1, .. })
        ));
    }
}
