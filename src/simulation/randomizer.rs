// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Periodic randomization of every coil and register in the fleet

use std::time::Duration;

use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::MIN_INTERVAL;
use crate::error::{SimulatorError, SimulatorResult};
use crate::fleet::TableSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomizerState {
    Idle,
    Active,
}

struct ActiveLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
    tables: TableSet,
    _guard: DropGuard,
}

/// Randomizer actor
///
/// While active, every table is randomized once per interval, starting
/// immediately. Stopping waits for the loop to exit and then zeroes every
/// table, so no randomized value survives the stop.
pub struct Randomizer {
    interval: Duration,
    active: Option<ActiveLoop>,
}

impl Randomizer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            active: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes effect at the next start; raised to one millisecond at least
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval.max(MIN_INTERVAL);
    }

    pub fn state(&self) -> RandomizerState {
        if self.active.is_some() {
            RandomizerState::Active
        } else {
            RandomizerState::Idle
        }
    }

    /// Start randomizing the given tables
    pub fn start(&mut self, tables: &TableSet) -> SimulatorResult<()> {
        if self.active.is_some() {
            return Err(SimulatorError::AlreadyRunning { what: "randomizer" });
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(randomize_loop(tables.clone(), self.interval, token.clone()));
        self.active = Some(ActiveLoop {
            _guard: token.clone().drop_guard(),
            token,
            handle,
            tables: tables.clone(),
        });
        info!(
            "Randomizer started on {} device(s), {} ms interval",
            tables.len(),
            self.interval.as_millis()
        );
        Ok(())
    }

    /// Stop the loop and reset every table it was driving; no-op when idle
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.token.cancel();
        if let Err(e) = active.handle.await {
            error!("Randomizer task failed: {}", e);
        }
        for table in active.tables.iter() {
            table.reset_all();
        }
        info!("Randomizer stopped, {} device(s) reset", active.tables.len());
    }

    /// Switch between idle and active, returning the new state
    pub async fn toggle(&mut self, tables: &TableSet) -> RandomizerState {
        match self.state() {
            RandomizerState::Active => self.stop().await,
            RandomizerState::Idle if tables.is_empty() => {
                warn!("Randomizer not started: no running device");
            }
            RandomizerState::Idle => {
                if let Err(e) = self.start(tables) {
                    warn!("{}", e);
                }
            }
        }
        self.state()
    }
}

async fn randomize_loop(tables: TableSet, interval: Duration, token: CancellationToken) {
    let mut rng = StdRng::from_os_rng();
    while !token.is_cancelled() {
        for table in tables.iter() {
            table.randomize_all(&mut rng);
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::RegisterTable;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stop_resets_tables() {
        let table = Arc::new(RegisterTable::new(502, 8, 64));
        let tables = TableSet::new(vec![Arc::clone(&table)]);
        let mut randomizer = Randomizer::new(Duration::from_millis(5));

        assert_eq!(randomizer.toggle(&tables).await, RandomizerState::Active);
        assert!(matches!(
            randomizer.start(&tables),
            Err(SimulatorError::AlreadyRunning { .. })
        ));
        time::sleep(Duration::from_millis(30)).await;
        assert!(table.read_all().registers.iter().any(|&r| r != 0));

        assert_eq!(randomizer.toggle(&tables).await, RandomizerState::Idle);
        let snapshot = table.read_all();
        assert!(snapshot.coils.iter().all(|c| !c));
        assert!(snapshot.registers.iter().all(|&r| r == 0));

        // Nothing runs after the stop
        time::sleep(Duration::from_millis(20)).await;
        assert!(table.read_all().registers.iter().all(|&r| r == 0));
    }

    #[test]
    fn test_zero_interval_is_raised() {
        let mut randomizer = Randomizer::new(Duration::ZERO);
        assert_eq!(randomizer.interval(), MIN_INTERVAL);
        randomizer.set_interval(Duration::from_millis(250));
        assert_eq!(randomizer.interval(), Duration::from_millis(250));
        randomizer.set_interval(Duration::ZERO);
        assert_eq!(randomizer.interval(), MIN_INTERVAL);
    }

    #[tokio::test]
    async fn test_toggle_without_devices_stays_idle() {
        let mut randomizer = Randomizer::new(Duration::from_millis(5));
        assert_eq!(
            randomizer.toggle(&TableSet::default()).await,
            RandomizerState::Idle
        );
    }
}
