// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Periodic reconciliation of every device table with its endpoint
//!
//! The poller calls `read_all` on each table at a fixed interval so that values
//! written by Modbus clients show up in the operator view, and publishes the
//! result as a `FleetSnapshot` on a watch channel.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::MIN_INTERVAL;
use crate::fleet::TableSet;
use crate::modbus::TableSnapshot;

/// Contents of the whole fleet at one poll
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetSnapshot {
    pub captured_at: Option<DateTime<Utc>>,
    pub devices: Vec<TableSnapshot>,
}

impl FleetSnapshot {
    pub fn device(&self, port: u16) -> Option<&TableSnapshot> {
        self.devices.iter().find(|device| device.port == port)
    }
}

/// Background task polling the fleet
///
/// Dropping the poller cancels the loop without waiting for it.
pub struct Poller {
    token: CancellationToken,
    handle: JoinHandle<()>,
    snapshots: watch::Receiver<FleetSnapshot>,
    _guard: DropGuard,
}

impl Poller {
    /// Spawn the polling loop; the first poll happens immediately
    ///
    /// An interval below one millisecond is raised to one millisecond.
    pub fn spawn(tables: TableSet, interval: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let token = CancellationToken::new();
        let (tx, rx) = watch::channel(FleetSnapshot::default());

        let handle = tokio::spawn(poll_loop(tables, interval, token.clone(), tx));
        info!("Poller started ({} ms interval)", interval.as_millis());

        Self {
            _guard: token.clone().drop_guard(),
            token,
            handle,
            snapshots: rx,
        }
    }

    /// Receiver notified after every poll
    pub fn subscribe(&self) -> watch::Receiver<FleetSnapshot> {
        self.snapshots.clone()
    }

    /// Last published snapshot
    pub fn latest(&self) -> FleetSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Cancel the loop and wait for it to exit
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!("Poller task failed: {}", e);
        }
        info!("Poller stopped");
    }
}

async fn poll_loop(
    tables: TableSet,
    interval: Duration,
    token: CancellationToken,
    tx: watch::Sender<FleetSnapshot>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let devices: Vec<TableSnapshot> = tables.iter().map(|table| table.read_all()).collect();
                debug!("Polled {} device(s)", devices.len());
                tx.send_replace(FleetSnapshot {
                    captured_at: Some(Utc::now()),
                    devices,
                });
            }
        }
    }
}
