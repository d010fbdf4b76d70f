// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the Modbus device simulator

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use tokio::signal;

use rust_modbus_simulator::config::{self, Config};
use rust_modbus_simulator::fleet::FleetManager;
use rust_modbus_simulator::simulation::Condition;

/// Multi-instance Modbus TCP device simulator
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Address every device binds to
    #[arg(long)]
    address: Option<String>,

    /// Port of the first device
    #[arg(long)]
    base_port: Option<u16>,

    /// Number of devices
    #[arg(long)]
    devices: Option<u16>,

    /// Coils per device
    #[arg(long)]
    coils: Option<usize>,

    /// Holding registers per device
    #[arg(long)]
    registers: Option<usize>,

    /// Start the devices described in a device table file instead
    #[arg(long, value_name = "CSV")]
    import_devices: Option<PathBuf>,

    /// Write every device's contents to this file on shutdown
    #[arg(long, value_name = "CSV")]
    export_devices: Option<PathBuf>,

    /// Scripted sequence to replay once the fleet is up
    #[arg(long, value_name = "CSV")]
    scenario: Option<PathBuf>,

    /// Gate the scenario on a condition, e.g. 502:Register:0:>:10
    #[arg(long, value_name = "PORT:KIND:ADDR:OP:VALUE")]
    condition: Option<Condition>,

    /// Randomize every coil and register while running
    #[arg(long)]
    randomize: bool,

    /// Randomizer interval in milliseconds
    #[arg(long)]
    random_interval_ms: Option<u64>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.address.clone(),
        args.base_port,
        args.devices,
        args.coils,
        args.registers,
        args.random_interval_ms,
        args.randomize,
    );
    config::utils::validate_specific_rules(&config)?;

    let mut fleet = FleetManager::new(config);

    let report = match &args.import_devices {
        Some(path) => {
            let (import, started) = fleet
                .import_devices(path)
                .await
                .with_context(|| format!("Failed to import devices from {}", path.display()))?;
            if !import.is_clean() {
                warn!("{} row(s) of {} were skipped", import.skipped.len(), path.display());
            }
            started
        }
        None => fleet.start_from_config().await?,
    };
    for failure in &report.failures {
        error!("{}", failure);
    }
    if !fleet.is_running() {
        anyhow::bail!("No device could be started");
    }
    for table in &report.tables {
        info!(
            "Device on port {}: {} coil(s), {} register(s)",
            table.port(),
            table.num_coils(),
            table.num_registers()
        );
    }

    if let Some(condition) = args.condition {
        fleet
            .set_condition(condition)
            .context("Invalid scenario condition")?;
    }
    if let Some(path) = &args.scenario {
        fleet
            .import_scenario(path)
            .with_context(|| format!("Failed to load scenario from {}", path.display()))?;
        fleet.execute_scenario()?;
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, stopping the fleet"),
        Err(err) => error!("Error waiting for shutdown signal: {}", err),
    }

    fleet.cancel_scenario();
    if let Some(path) = &args.export_devices {
        fleet
            .export_devices(path)
            .with_context(|| format!("Failed to export devices to {}", path.display()))?;
    }
    fleet.stop_fleet().await;

    Ok(())
}
