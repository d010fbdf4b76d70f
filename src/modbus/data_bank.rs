// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Authoritative coil and holding register storage of one simulated device

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Data bank shared between a `DeviceEndpoint` and its `RegisterTable`
pub type SharedDataBank = Arc<Mutex<DataBank>>;

/// Fixed-size coil and holding register storage
///
/// Both vectors are sized at construction and never resized. Accesses that
/// fall outside the configured size are refused as a whole: reads return
/// `None` and writes leave the bank untouched.
#[derive(Debug, Clone, Default)]
pub struct DataBank {
    coils: Vec<bool>,
    holding_registers: Vec<u16>,
}

impl DataBank {
    /// Create a zeroed data bank
    pub fn new(num_coils: usize, num_registers: usize) -> Self {
        Self {
            coils: vec![false; num_coils],
            holding_registers: vec![0; num_registers],
        }
    }

    /// Create a data bank preloaded with the given contents
    pub fn with_contents(coils: Vec<bool>, holding_registers: Vec<u16>) -> Self {
        Self {
            coils,
            holding_registers,
        }
    }

    /// Wrap the bank so it can be shared with an endpoint
    pub fn into_shared(self) -> SharedDataBank {
        Arc::new(Mutex::new(self))
    }

    pub fn num_coils(&self) -> usize {
        self.coils.len()
    }

    pub fn num_registers(&self) -> usize {
        self.holding_registers.len()
    }

    /// Read `count` coils starting at `offset`
    pub fn get_coils(&self, offset: usize, count: usize) -> Option<Vec<bool>> {
        span(offset, count, self.coils.len()).map(|range| self.coils[range].to_vec())
    }

    /// Read `count` holding registers starting at `offset`
    pub fn get_holding_registers(&self, offset: usize, count: usize) -> Option<Vec<u16>> {
        span(offset, count, self.holding_registers.len())
            .map(|range| self.holding_registers[range].to_vec())
    }

    /// Whether `count` holding registers from `offset` fit in the bank
    pub fn holding_registers_fit(&self, offset: usize, count: usize) -> bool {
        span(offset, count, self.holding_registers.len()).is_some()
    }

    /// Write coils starting at `offset`, returns `false` when out of range
    pub fn set_coils(&mut self, offset: usize, values: &[bool]) -> bool {
        match span(offset, values.len(), self.coils.len()) {
            Some(range) => {
                self.coils[range].copy_from_slice(values);
                true
            }
            None => false,
        }
    }

    /// Write holding registers starting at `offset`, returns `false` when out of range
    pub fn set_holding_registers(&mut self, offset: usize, values: &[u16]) -> bool {
        match span(offset, values.len(), self.holding_registers.len()) {
            Some(range) => {
                self.holding_registers[range].copy_from_slice(values);
                true
            }
            None => false,
        }
    }
}

/// Lock a shared data bank
///
/// Every critical section on a bank leaves it consistent, so a poisoned lock
/// is recovered instead of propagated.
pub(crate) fn lock_bank(bank: &SharedDataBank) -> MutexGuard<'_, DataBank> {
    bank.lock().unwrap_or_else(PoisonError::into_inner)
}

fn span(offset: usize, count: usize, len: usize) -> Option<Range<usize>> {
    let end = offset.checked_add(count)?;
    (end <= len).then_some(offset..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_inside_bounds() {
        let mut bank = DataBank::new(4, 3);
        assert!(bank.set_holding_registers(1, &[7, 8]));
        assert_eq!(bank.get_holding_registers(0, 3), Some(vec![0, 7, 8]));
        assert_eq!(bank.get_coils(0, 4), Some(vec![false; 4]));
        assert_eq!(bank.get_coils(4, 0), Some(vec![]));
    }

    #[test]
    fn test_out_of_range_access_is_refused_whole() {
        let mut bank = DataBank::new(2, 2);
        assert!(!bank.set_coils(1, &[true, true]));
        assert_eq!(bank.get_coils(0, 2), Some(vec![false, false]));
        assert_eq!(bank.get_holding_registers(1, 2), None);
        assert_eq!(bank.get_holding_registers(usize::MAX, 2), None);
        assert!(bank.holding_registers_fit(0, 2));
        assert!(!bank.holding_registers_fit(1, 2));
    }
}
