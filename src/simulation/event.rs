// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scripted write events and the sequences they form

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{SimulatorError, SimulatorResult};
use crate::fleet::TableSet;
use crate::modbus::register_table::register_value;
use crate::modbus::{PointKind, WriteOutcome};

/// One scheduled write, keyed by its offset from the start of the replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimEvent {
    pub port: u16,
    pub kind: PointKind,
    pub address: usize,
    pub value: i64,
    pub offset_ms: u64,
}

/// What happened when an event was due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Fired,
    Skipped,
}

impl SimEvent {
    pub fn new(port: u16, kind: PointKind, address: usize, value: i64, offset_ms: u64) -> Self {
        Self {
            port,
            kind,
            address,
            value,
            offset_ms,
        }
    }

    /// Check the event against the running fleet
    ///
    /// The target device must exist, the address must be inside its table and
    /// a register value must fit in 16 bits.
    pub fn validate(&self, tables: &TableSet) -> SimulatorResult<()> {
        let table = tables
            .find_by_port(self.port)
            .ok_or(SimulatorError::UnknownDevice { port: self.port })?;
        table.check_address(self.kind, self.address)?;
        if self.kind == PointKind::Register {
            register_value(self.value)?;
        }
        Ok(())
    }

    /// Apply the event to its device, skipping it when the device is gone
    pub(crate) fn fire(&self, tables: &TableSet) -> FireOutcome {
        let Some(table) = tables.find_by_port(self.port) else {
            warn!("Skipping event for missing device {}", self.port);
            return FireOutcome::Skipped;
        };
        match table.write(self.kind, self.address, self.value) {
            Ok(WriteOutcome::Applied) => {
                debug!(
                    "t+{}ms: device {} {}[{}] <- {}",
                    self.offset_ms, self.port, self.kind, self.address, self.value
                );
                FireOutcome::Fired
            }
            Ok(WriteOutcome::Ignored) => FireOutcome::Skipped,
            Err(e) => {
                warn!("Skipping event at t+{}ms: {}", self.offset_ms, e);
                FireOutcome::Skipped
            }
        }
    }
}

/// Ordered list of events as authored by the operator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptedSequence {
    events: Vec<SimEvent>,
}

impl ScriptedSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event after validating it against the running fleet
    pub fn add(&mut self, event: SimEvent, tables: &TableSet) -> SimulatorResult<()> {
        event.validate(tables)?;
        self.events.push(event);
        Ok(())
    }

    /// Remove the event at `index` in authoring order
    pub fn remove(&mut self, index: usize) -> Option<SimEvent> {
        (index < self.events.len()).then(|| self.events.remove(index))
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Events in authoring order
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events sorted by offset; equal offsets keep their authoring order
    pub fn time_ordered(&self) -> Vec<SimEvent> {
        let mut ordered = self.events.clone();
        ordered.sort_by_key(|event| event.offset_ms);
        ordered
    }
}

impl Extend<SimEvent> for ScriptedSequence {
    fn extend<T: IntoIterator<Item = SimEvent>>(&mut self, iter: T) {
        self.events.extend(iter);
    }
}

impl FromIterator<SimEvent> for ScriptedSequence {
    fn from_iter<T: IntoIterator<Item = SimEvent>>(iter: T) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::RegisterTable;
    use std::sync::Arc;

    fn fleet() -> TableSet {
        TableSet::new(vec![Arc::new(RegisterTable::new(502, 2, 4))])
    }

    #[test]
    fn test_add_validates_against_fleet() {
        let tables = fleet();
        let mut sequence = ScriptedSequence::new();
        assert!(sequence
            .add(SimEvent::new(502, PointKind::Register, 3, 1, 0), &tables)
            .is_ok());
        assert!(matches!(
            sequence.add(SimEvent::new(502, PointKind::Coil, 2, 1, 0), &tables),
            Err(SimulatorError::OutOfRangeAddress { .. })
        ));
        assert!(matches!(
            sequence.add(SimEvent::new(503, PointKind::Coil, 0, 1, 0), &tables),
            Err(SimulatorError::UnknownDevice { port: 503 })
        ));
        assert!(matches!(
            sequence.add(SimEvent::new(502, PointKind::Register, 0, 70000, 0), &tables),
            Err(SimulatorError::ValueOutOfRange { .. })
        ));
        assert_eq!(sequence.len(), 1);
    }

    #[test]
    fn test_time_ordering_is_stable() {
        let sequence: ScriptedSequence = vec![
            SimEvent::new(502, PointKind::Register, 0, 1, 100),
            SimEvent::new(502, PointKind::Register, 1, 7, 50),
            SimEvent::new(502, PointKind::Register, 2, 8, 50),
        ]
        .into_iter()
        .collect();

        let values: Vec<i64> = sequence.time_ordered().iter().map(|e| e.value).collect();
        assert_eq!(values, vec![7, 8, 1]);
        assert_eq!(sequence.events()[0].value, 1);
    }

    #[test]
    fn test_remove_out_of_bounds() {
        let mut sequence: ScriptedSequence =
            std::iter::once(SimEvent::new(502, PointKind::Coil, 0, 1, 0)).collect();
        assert!(sequence.remove(3).is_none());
        assert!(sequence.remove(0).is_some());
        assert!(sequence.is_empty());
    }
}
