// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scripted sequence files (`Port;Type;Address;Value;Time_ms`)

use std::io;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::{create_file, csv_writer, open_file, read_rows, ImportReport};
use crate::error::SimulatorResult;
use crate::fleet::TableSet;
use crate::simulation::SimEvent;

#[derive(Debug, Serialize, Deserialize)]
struct EventRow {
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Type")]
    kind: crate::modbus::PointKind,
    #[serde(rename = "Address")]
    address: usize,
    #[serde(rename = "Value")]
    value: i64,
    #[serde(rename = "Time_ms")]
    offset_ms: u64,
}

impl From<&SimEvent> for EventRow {
    fn from(event: &SimEvent) -> Self {
        Self {
            port: event.port,
            kind: event.kind,
            address: event.address,
            value: event.value,
            offset_ms: event.offset_ms,
        }
    }
}

impl From<EventRow> for SimEvent {
    fn from(row: EventRow) -> Self {
        SimEvent::new(row.port, row.kind, row.address, row.value, row.offset_ms)
    }
}

/// Write one row per event, in the given order
pub fn write_scenario<W: io::Write>(writer: W, events: &[SimEvent]) -> SimulatorResult<usize> {
    let mut writer = csv_writer(writer);
    for event in events {
        writer.serialize(EventRow::from(event))?;
    }
    writer.flush()?;
    Ok(events.len())
}

/// Read events, keeping only those valid against the running fleet
///
/// Rows targeting an absent device or an address beyond the device's table
/// are dropped and listed in the report.
pub fn read_scenario<R: io::Read>(reader: R, tables: &TableSet) -> SimulatorResult<(Vec<SimEvent>, ImportReport)> {
    let mut events = Vec::new();
    let report = read_rows(reader, |row: EventRow| {
        let event = SimEvent::from(row);
        event.validate(tables)?;
        events.push(event);
        Ok(())
    })?;
    Ok((events, report))
}

pub fn export_scenario(path: &Path, events: &[SimEvent]) -> SimulatorResult<usize> {
    let rows = write_scenario(create_file(path)?, events)?;
    info!("Exported {} event(s) to {}", rows, path.display());
    Ok(rows)
}

pub fn import_scenario(path: &Path, tables: &TableSet) -> SimulatorResult<(Vec<SimEvent>, ImportReport)> {
    let (events, report) = read_scenario(open_file(path)?, tables)?;
    info!(
        "Imported {} event(s) from {} ({} skipped)",
        events.len(),
        path.display(),
        report.skipped.len()
    );
    Ok((events, report))
}
