// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Timed replay of a scripted sequence
//!
//! A run goes through three states:
//!
//! - `Waiting`: the optional gating condition is evaluated against live values
//!   every `condition_poll` until it holds
//! - `Running`: events fire in offset order, each one no earlier than its
//!   offset from the replay start
//! - `Idle`: the run finished or was cancelled
//!
//! Cancellation is observed between condition polls and between events, never
//! in the middle of a write. The state is published on a watch channel; a
//! cancelled run is `Idle` as soon as `cancel` returns, and its task publishes
//! nothing afterwards, so a new run can start right away.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::condition::Condition;
use super::MIN_INTERVAL;
use super::event::{FireOutcome, ScriptedSequence, SimEvent};
use crate::config::SchedulerConfig;
use crate::error::{SimulatorError, SimulatorResult};
use crate::fleet::TableSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Waiting,
    Running,
}

/// Outcome of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fired: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Timing knobs of the replay loop
#[derive(Debug, Clone, Copy)]
pub struct SchedulerTiming {
    pub condition_poll: Duration,
    pub replay_tick: Duration,
}

impl SchedulerTiming {
    /// Raise both periods to one millisecond at least
    fn clamped(self) -> Self {
        Self {
            condition_poll: self.condition_poll.max(MIN_INTERVAL),
            replay_tick: self.replay_tick.max(MIN_INTERVAL),
        }
    }
}

impl From<&SchedulerConfig> for SchedulerTiming {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            condition_poll: Duration::from_millis(config.condition_poll_ms),
            replay_tick: Duration::from_millis(config.replay_tick_ms),
        }
    }
}

struct ActiveRun {
    token: CancellationToken,
    handle: JoinHandle<RunReport>,
    _guard: DropGuard,
}

pub struct EventScheduler {
    timing: SchedulerTiming,
    state: Arc<watch::Sender<SchedulerState>>,
    run: Option<ActiveRun>,
}

impl EventScheduler {
    pub fn new(timing: SchedulerTiming) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            timing: timing.clamped(),
            state: Arc::new(state),
            run: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Replay `sequence` against `tables`, optionally gated by `condition`
    ///
    /// The sequence is copied: edits made while the run is in progress do
    /// not affect it.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` when a previous run has not reached `Idle` yet.
    pub fn execute(
        &mut self,
        sequence: &ScriptedSequence,
        condition: Option<Condition>,
        tables: TableSet,
    ) -> SimulatorResult<()> {
        if self.state() != SchedulerState::Idle {
            return Err(SimulatorError::AlreadyRunning {
                what: "scripted sequence",
            });
        }

        let events = sequence.time_ordered();
        let initial = if condition.is_some() {
            SchedulerState::Waiting
        } else {
            SchedulerState::Running
        };
        self.state.send_replace(initial);

        let token = CancellationToken::new();
        let run = ReplayRun {
            events,
            condition,
            tables,
            timing: self.timing,
            token: token.clone(),
            state: Arc::clone(&self.state),
        };
        self.run = Some(ActiveRun {
            _guard: token.clone().drop_guard(),
            token,
            handle: tokio::spawn(run.drive()),
        });
        Ok(())
    }

    /// Cancel the current run and return to `Idle`; no-op when idle
    ///
    /// The run's task may still be finishing its current write when this
    /// returns. It stops before the next event and publishes no state.
    pub fn cancel(&self) {
        let Some(run) = &self.run else {
            return;
        };
        if !run.token.is_cancelled() && self.state() != SchedulerState::Idle {
            info!("Cancelling scripted sequence");
        }
        run.token.cancel();
        self.state.send_if_modified(|state| {
            std::mem::replace(state, SchedulerState::Idle) != SchedulerState::Idle
        });
    }

    /// Wait for the current run to end and return its report
    pub async fn wait(&mut self) -> Option<RunReport> {
        let run = self.run.take()?;
        match run.handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Scheduler task failed: {}", e);
                self.state.send_replace(SchedulerState::Idle);
                None
            }
        }
    }

    /// Cancel the current run and wait for it to exit
    pub async fn stop(&mut self) -> Option<RunReport> {
        self.cancel();
        self.wait().await
    }
}

struct ReplayRun {
    events: Vec<SimEvent>,
    condition: Option<Condition>,
    tables: TableSet,
    timing: SchedulerTiming,
    token: CancellationToken,
    state: Arc<watch::Sender<SchedulerState>>,
}

impl ReplayRun {
    async fn drive(self) -> RunReport {
        let mut report = RunReport::default();

        if let Some(condition) = &self.condition {
            info!("Waiting for condition {}", condition);
            if !self.wait_for(condition).await {
                report.cancelled = true;
                info!("Scripted sequence cancelled before its condition held");
                return report;
            }
            info!("Condition {} met, starting replay", condition);
            self.publish(SchedulerState::Running);
        }

        let start = Instant::now();
        let mut cursor = 0;
        while cursor < self.events.len() {
            if self.token.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let event = &self.events[cursor];
            let due = Duration::from_millis(event.offset_ms);
            let elapsed = start.elapsed();
            if elapsed >= due {
                match event.fire(&self.tables) {
                    FireOutcome::Fired => report.fired += 1,
                    FireOutcome::Skipped => report.skipped += 1,
                }
                cursor += 1;
            } else {
                let pause = (due - elapsed).min(self.timing.replay_tick);
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = time::sleep(pause) => {}
                }
            }
        }

        if report.cancelled {
            info!(
                "Scripted sequence cancelled after {} of {} event(s)",
                cursor,
                self.events.len()
            );
        } else {
            info!(
                "Scripted sequence finished: {} fired, {} skipped",
                report.fired, report.skipped
            );
        }
        self.publish(SchedulerState::Idle);
        report
    }

    /// Publish a state change unless this run was cancelled
    ///
    /// The check runs under the channel lock, and `cancel` publishes `Idle`
    /// after cancelling the token, so a cancelled run never overwrites the
    /// state of the run started after it.
    fn publish(&self, next: SchedulerState) {
        self.state.send_if_modified(|state| {
            if self.token.is_cancelled() || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Poll the condition until it holds; false when cancelled first
    async fn wait_for(&self, condition: &Condition) -> bool {
        loop {
            if self.token.is_cancelled() {
                return false;
            }
            if condition.is_satisfied(&self.tables) {
                return true;
            }
            debug!("Condition {} not met yet", condition);
            tokio::select! {
                _ = self.token.cancelled() => return false,
                _ = time::sleep(self.timing.condition_poll) => {}
            }
        }
    }
}
