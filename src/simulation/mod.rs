// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Background actors driving the fleet
//!
//! - [`poller`]: reconciles tables with their endpoints at a fixed interval
//! - [`randomizer`]: overwrites every point with random values while active
//! - [`scheduler`]: replays a scripted sequence, optionally gated by a condition
//!
//! [`Scenario`] holds what the operator authors for the scheduler: the ordered
//! event list and the optional gating condition.

pub mod condition;
pub mod event;
pub mod poller;
pub mod randomizer;
pub mod scheduler;

pub use condition::{Comparison, Condition};
pub use event::{ScriptedSequence, SimEvent};
pub use poller::{FleetSnapshot, Poller};
pub use randomizer::{Randomizer, RandomizerState};
pub use scheduler::{EventScheduler, RunReport, SchedulerState, SchedulerTiming};

use std::time::Duration;

use crate::error::SimulatorResult;
use crate::fleet::TableSet;

/// Shortest period the background actors run at; shorter ones are raised to it
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Events and gating condition authored for the next replay
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    sequence: ScriptedSequence,
    condition: Option<Condition>,
}

impl Scenario {
    pub fn sequence(&self) -> &ScriptedSequence {
        &self.sequence
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn add_event(&mut self, event: SimEvent, tables: &TableSet) -> SimulatorResult<()> {
        self.sequence.add(event, tables)
    }

    pub fn remove_event(&mut self, index: usize) -> Option<SimEvent> {
        self.sequence.remove(index)
    }

    /// Append events that were already validated against the fleet
    pub(crate) fn extend_events(&mut self, events: Vec<SimEvent>) {
        self.sequence.extend(events);
    }

    /// Set the gating condition after checking it against the fleet
    pub fn set_condition(&mut self, condition: Condition, tables: &TableSet) -> SimulatorResult<()> {
        condition.validate(tables)?;
        self.condition = Some(condition);
        Ok(())
    }

    pub fn clear_condition(&mut self) {
        self.condition = None;
    }

    /// Human readable form of the gating condition
    pub fn describe_condition(&self) -> String {
        match &self.condition {
            Some(condition) => condition.to_string(),
            None => "immediate start".to_string(),
        }
    }

    pub fn clear(&mut self) {
        self.sequence.clear();
        self.condition = None;
    }
}

/// Parse an operator-entered integer, treating anything non-numeric as 0
pub fn parse_lenient(input: &str) -> i64 {
    input.trim().parse().unwrap_or(0)
}
