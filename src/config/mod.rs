// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the Modbus simulator
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings for the simulator. The configuration is backed by a
//! YAML file and validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! The configuration is organized as a nested structure with sections:
//! - `fleet`: address, ports and table sizes of the simulated devices
//! - `randomizer`: interval and autostart of the fleet-wide randomizer
//! - `poller`: reconciliation period between tables and endpoints
//! - `scheduler`: timing of condition checks and event replay
//!
//! ## Usage
//!
//! ```no_run
//! use rust_modbus_simulator::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("0.0.0.0".to_string()), // Bind address
//!     Some(1502),                  // Base port
//!     Some(4),                     // Device count
//!     None,                        // Coils per device
//!     Some(100),                   // Registers per device
//!     None,                        // Randomizer interval
//!     false,                       // Randomizer autostart
//! );
//!
//! println!("First device port: {}", config.fleet.base_port);
//! ```

pub mod fleet;
pub mod simulation;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use fleet::FleetConfig;
pub use simulation::{PollerConfig, RandomizerConfig, SchedulerConfig};
pub use utils::{is_valid_ip_address, output_config_schema};

/// Root configuration structure for the simulator.
///
/// Every section falls back to its default values when it is missing from the
/// file, so an empty document is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Devices to start: bind address, first port, count and table sizes.
    #[serde(default)]
    pub fleet: FleetConfig,

    #[serde(default)]
    pub randomizer: RandomizerConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample_path = path.as_ref().with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with default values. A file failing schema
    /// validation, deserialization or the additional rules leaves a
    /// `*.sample.yaml` next to it and returns an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // An empty document is a null value for serde_yml
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;
        let json_value = match serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })? {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            value => value,
        };

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        let config: Config = match serde_json::from_value(json_value) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only the values that are provided override the loaded configuration.
    /// `randomize` can only switch the randomizer autostart on.
    ///
    /// # Parameters
    ///
    /// * `address` - Network address every device binds to
    /// * `base_port` - Port of the first device
    /// * `device_count` - Number of devices
    /// * `coils` - Coils per device
    /// * `registers` - Holding registers per device
    /// * `random_interval_ms` - Randomizer interval in milliseconds
    /// * `randomize` - Start the randomizer with the fleet
    pub fn apply_args(
        &mut self,
        address: Option<String>,
        base_port: Option<u16>,
        device_count: Option<u16>,
        coils: Option<usize>,
        registers: Option<usize>,
        random_interval_ms: Option<u64>,
        randomize: bool,
    ) {
        if let Some(address) = address {
            debug!("Overriding fleet address from command line: {}", address);
            self.fleet.address = address;
        }
        if let Some(port) = base_port {
            debug!("Overriding base port from command line: {}", port);
            self.fleet.base_port = port;
        }
        if let Some(count) = device_count {
            debug!("Overriding device count from command line: {}", count);
            self.fleet.device_count = count;
        }
        if let Some(coils) = coils {
            debug!("Overriding coils per device from command line: {}", coils);
            self.fleet.coils_per_device = coils;
        }
        if let Some(registers) = registers {
            debug!(
                "Overriding registers per device from command line: {}",
                registers
            );
            self.fleet.registers_per_device = registers;
        }
        if let Some(interval) = random_interval_ms {
            debug!("Overriding randomizer interval from command line: {}", interval);
            self.randomizer.interval_ms = interval;
        }
        if randomize {
            self.randomizer.autostart = true;
        }
    }
}
