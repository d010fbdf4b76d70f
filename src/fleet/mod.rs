// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Fleet Management Module
//!
//! The [`FleetManager`] owns every running device, that is a register table
//! paired with the Modbus TCP endpoint serving it, together with the
//! background actors driving those devices:
//!
//! - the poller, started with the fleet
//! - the randomizer, toggled by the operator or started with the fleet
//! - the event scheduler, replaying the operator's scenario
//!
//! ## Lifecycle
//!
//! Starting the fleet binds one endpoint per device on consecutive ports. A
//! port that cannot be bound is reported and skipped, the other devices still
//! start. Stopping the fleet stops the scheduler, the randomizer and the poller
//! before any table is released, then closes every endpoint.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_modbus_simulator::{config::Config, fleet::FleetManager, modbus::PointKind};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let mut fleet = FleetManager::new(config);
//!
//!     let report = fleet.start_fleet(1502, 3, 10, 10).await?;
//!     for failure in &report.failures {
//!         eprintln!("{}", failure);
//!     }
//!
//!     fleet.write(1502, PointKind::Register, 0, 1234)?;
//!     fleet.stop_fleet().await;
//!     Ok(())
//! }
//! ```

mod table_set;

pub use table_set::TableSet;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::watch;

use crate::config::Config;
use crate::error::{SimulatorError, SimulatorResult};
use crate::modbus::{DeviceEndpoint, PointKind, RegisterTable, TableSnapshot, WriteOutcome};
use crate::persistence::{self, ImportReport};
use crate::simulation::{
    Condition, EventScheduler, FleetSnapshot, Poller, Randomizer, RandomizerState, RunReport,
    Scenario, SchedulerState, SchedulerTiming, SimEvent,
};

/// Devices started by one start request
#[derive(Debug, Default)]
pub struct StartReport {
    /// Tables of the devices now serving, in start order
    pub tables: Vec<Arc<RegisterTable>>,
    /// One `BindFailure` per device that could not be started
    pub failures: Vec<SimulatorError>,
}

struct Device {
    table: Arc<RegisterTable>,
    endpoint: DeviceEndpoint,
}

/// Owner of the running devices and of the actors driving them
pub struct FleetManager {
    config: Config,
    devices: Vec<Device>,
    tables: TableSet,
    running: bool,
    poller: Option<Poller>,
    randomizer: Randomizer,
    scheduler: EventScheduler,
    scenario: Scenario,
}

impl FleetManager {
    /// Create an idle fleet using the timing and bind address of `config`
    pub fn new(config: Config) -> Self {
        let randomizer = Randomizer::new(Duration::from_millis(config.randomizer.interval_ms));
        let scheduler = EventScheduler::new(SchedulerTiming::from(&config.scheduler));
        Self {
            config,
            devices: Vec::new(),
            tables: TableSet::default(),
            running: false,
            poller: None,
            randomizer,
            scheduler,
            scenario: Scenario::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// True while at least one device is serving
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start the fleet described by the `fleet` section of the configuration
    pub async fn start_from_config(&mut self) -> SimulatorResult<StartReport> {
        let fleet = self.config.fleet.clone();
        self.start_fleet(
            fleet.base_port,
            fleet.device_count,
            fleet.coils_per_device,
            fleet.registers_per_device,
        )
        .await
    }

    /// Start `count` zeroed devices on consecutive ports from `base_port`
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if the fleet is already up. Per-device bind failures
    /// are not errors, they are listed in the returned report.
    pub async fn start_fleet(
        &mut self,
        base_port: u16,
        count: u16,
        num_coils: usize,
        num_registers: usize,
    ) -> SimulatorResult<StartReport> {
        if self.running {
            return Err(SimulatorError::AlreadyRunning { what: "fleet" });
        }

        let mut tables = Vec::with_capacity(usize::from(count));
        for offset in 0..count {
            let Some(port) = base_port.checked_add(offset) else {
                warn!(
                    "Only {} of {} device(s) fit below port 65535",
                    offset, count
                );
                break;
            };
            tables.push(RegisterTable::new(port, num_coils, num_registers));
        }

        self.start_devices(tables).await
    }

    /// Bind and serve the given tables, keeping their contents
    async fn start_devices(&mut self, tables: Vec<RegisterTable>) -> SimulatorResult<StartReport> {
        if self.running {
            return Err(SimulatorError::AlreadyRunning { what: "fleet" });
        }

        let mut report = StartReport::default();
        for table in tables {
            let port = table.port();
            let table = Arc::new(table);
            let started = match DeviceEndpoint::bind(&self.config.fleet.address, port, table.data_bank()).await {
                Ok(mut endpoint) => endpoint.start().map(|()| endpoint),
                Err(e) => Err(e),
            };
            match started {
                Ok(endpoint) => {
                    report.tables.push(Arc::clone(&table));
                    self.devices.push(Device { table, endpoint });
                }
                Err(e) => {
                    error!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        self.tables = TableSet::new(self.devices.iter().map(|d| Arc::clone(&d.table)).collect());
        if self.devices.is_empty() {
            warn!("No device could be started");
            return Ok(report);
        }

        self.running = true;
        self.poller = Some(Poller::spawn(
            self.tables.clone(),
            Duration::from_millis(self.config.poller.interval_ms),
        ));
        if self.config.randomizer.autostart {
            if let Err(e) = self.randomizer.start(&self.tables) {
                warn!("{}", e);
            }
        }

        info!(
            "Fleet started: {} device(s) serving, {} failure(s)",
            report.tables.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Stop every actor, close every endpoint and forget the devices
    ///
    /// The scenario is cleared as its events reference the stopped devices.
    pub async fn stop_fleet(&mut self) {
        if !self.running && self.devices.is_empty() {
            return;
        }

        self.scheduler.stop().await;
        self.randomizer.stop().await;
        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }
        for device in &mut self.devices {
            device.endpoint.stop().await;
        }

        let stopped = self.devices.len();
        self.devices.clear();
        self.tables = TableSet::default();
        self.scenario.clear();
        self.running = false;
        info!("Fleet stopped ({} device(s))", stopped);
    }

    /// Running tables in display order
    pub fn tables(&self) -> TableSet {
        self.tables.clone()
    }

    pub fn find_by_port(&self, port: u16) -> Option<Arc<RegisterTable>> {
        self.tables.find_by_port(port).cloned()
    }

    /// Operator write to a single point of one device
    pub fn write(&self, port: u16, kind: PointKind, address: usize, value: i64) -> SimulatorResult<WriteOutcome> {
        self.tables
            .find_by_port(port)
            .ok_or(SimulatorError::UnknownDevice { port })?
            .write(kind, address, value)
    }

    /// Reconcile every table with its endpoint and return the contents
    pub fn snapshot(&self) -> Vec<TableSnapshot> {
        self.tables.iter().map(|table| table.read_all()).collect()
    }

    /// Receiver of the poller's snapshots, while the fleet is running
    pub fn subscribe_snapshots(&self) -> Option<watch::Receiver<FleetSnapshot>> {
        self.poller.as_ref().map(Poller::subscribe)
    }

    /// Start or stop the randomizer; stopping zeroes every table
    pub async fn toggle_randomizer(&mut self) -> RandomizerState {
        self.randomizer.toggle(&self.tables).await
    }

    /// Change the randomizer period, applied at its next start
    pub fn set_random_interval(&mut self, interval: Duration) {
        self.randomizer.set_interval(interval);
    }

    pub fn randomizer_state(&self) -> RandomizerState {
        self.randomizer.state()
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Append an event after checking it against the running devices
    pub fn add_event(&mut self, event: SimEvent) -> SimulatorResult<()> {
        self.scenario.add_event(event, &self.tables)
    }

    pub fn remove_event(&mut self, index: usize) -> Option<SimEvent> {
        self.scenario.remove_event(index)
    }

    /// Gate the next replay on `condition`, replacing any previous one
    pub fn set_condition(&mut self, condition: Condition) -> SimulatorResult<()> {
        self.scenario.set_condition(condition, &self.tables)?;
        info!("Condition set: {}", self.scenario.describe_condition());
        Ok(())
    }

    pub fn clear_condition(&mut self) {
        self.scenario.clear_condition();
        info!("Condition removed, replay starts immediately");
    }

    /// Replay the scenario in the background
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while a previous replay is waiting or running.
    pub fn execute_scenario(&mut self) -> SimulatorResult<()> {
        self.scheduler.execute(
            self.scenario.sequence(),
            self.scenario.condition().cloned(),
            self.tables.clone(),
        )?;
        info!(
            "Executing {} event(s), {}",
            self.scenario.sequence().len(),
            self.scenario.describe_condition()
        );
        Ok(())
    }

    /// Cancel the current replay; no-op when idle
    pub fn cancel_scenario(&self) {
        self.scheduler.cancel();
    }

    /// Wait for the current replay to end
    pub async fn wait_scenario(&mut self) -> Option<RunReport> {
        self.scheduler.wait().await
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn subscribe_scheduler(&self) -> watch::Receiver<SchedulerState> {
        self.scheduler.subscribe()
    }

    /// Replace the fleet with the devices described in a device table file
    ///
    /// The file is read before anything is stopped, so an unreadable file
    /// leaves the running fleet untouched.
    pub async fn import_devices(&mut self, path: &Path) -> SimulatorResult<(ImportReport, StartReport)> {
        let (tables, import) = persistence::import_device_table(path)?;
        self.stop_fleet().await;
        let started = self.start_devices(tables).await?;
        Ok((import, started))
    }

    /// Write every device's current contents to `path`
    pub fn export_devices(&self, path: &Path) -> SimulatorResult<usize> {
        persistence::export_device_table(path, &self.snapshot())
    }

    /// Append the valid events of a scenario file to the scenario
    pub fn import_scenario(&mut self, path: &Path) -> SimulatorResult<ImportReport> {
        let (events, report) = persistence::import_scenario(path, &self.tables)?;
        self.scenario.extend_events(events);
        Ok(report)
    }

    pub fn export_scenario(&self, path: &Path) -> SimulatorResult<usize> {
        persistence::export_scenario(path, self.scenario.sequence().events())
    }
}
