// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Timing settings of the background actors

use serde::{Deserialize, Serialize};

/// Settings of the fleet-wide randomizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomizerConfig {
    /// Time between two randomization passes, in milliseconds. Default is 1000.
    pub interval_ms: u64,

    /// Start randomizing as soon as the fleet is up. Default is `false`.
    pub autostart: bool,
}

impl Default for RandomizerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            autostart: false,
        }
    }
}

/// Settings of the poller reconciling tables with their endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Polling period in milliseconds. Default is 500.
    pub interval_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

/// Settings of the scripted sequence scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period at which a gating condition is re-evaluated. Default is 100.
    pub condition_poll_ms: u64,

    /// Longest sleep between two checks of the replay clock. Default is 20,
    /// which bounds how late an event may fire.
    pub replay_tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            condition_poll_ms: 100,
            replay_tick_ms: 20,
        }
    }
}
