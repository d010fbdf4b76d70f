// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device table dump and restore (`Port;Type;Address;Value`)

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::{create_file, csv_writer, open_file, read_rows, ImportReport};
use crate::error::{SimulatorError, SimulatorResult};
use crate::modbus::register_table::register_value;
use crate::modbus::{PointKind, RegisterTable, TableSnapshot};

/// Modbus addresses are 16 bits wide
const MAX_ADDRESS: usize = u16::MAX as usize;

#[derive(Debug, Serialize, Deserialize)]
struct DeviceRow {
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Type")]
    kind: PointKind,
    #[serde(rename = "Address")]
    address: usize,
    #[serde(rename = "Value")]
    value: i64,
}

/// Contents of one device being rebuilt from rows
#[derive(Default)]
struct PendingDevice {
    coils: BTreeMap<usize, bool>,
    registers: BTreeMap<usize, u16>,
}

impl PendingDevice {
    fn build(self, port: u16) -> RegisterTable {
        let mut coils = vec![false; inferred_len(&self.coils)];
        for (address, value) in self.coils {
            coils[address] = value;
        }
        let mut registers = vec![0; inferred_len(&self.registers)];
        for (address, value) in self.registers {
            registers[address] = value;
        }
        RegisterTable::with_contents(port, coils, registers)
    }
}

/// Highest referenced address + 1, or 0 when nothing was referenced
fn inferred_len<V>(points: &BTreeMap<usize, V>) -> usize {
    points.last_key_value().map_or(0, |(&address, _)| address + 1)
}

/// Write one row per coil and per register of every device
///
/// Returns the number of rows written.
pub fn write_device_table<W: io::Write>(writer: W, devices: &[TableSnapshot]) -> SimulatorResult<usize> {
    let mut writer = csv_writer(writer);
    let mut rows = 0;

    for device in devices {
        let coils = device
            .coils
            .iter()
            .enumerate()
            .map(|(address, &c)| (PointKind::Coil, address, i64::from(c)));
        let registers = device
            .registers
            .iter()
            .enumerate()
            .map(|(address, &r)| (PointKind::Register, address, i64::from(r)));

        for (kind, address, value) in coils.chain(registers) {
            writer.serialize(DeviceRow {
                port: device.port,
                kind,
                address,
                value,
            })?;
            rows += 1;
        }
    }

    writer.flush()?;
    Ok(rows)
}

/// Rebuild device tables from rows
///
/// Each device is sized to its highest referenced address + 1 per kind and
/// devices come back in the order their port first appears. Coil values are
/// coerced (non-zero means set); register values outside 0..=65535 reject
/// the row.
pub fn read_device_table<R: io::Read>(reader: R) -> SimulatorResult<(Vec<RegisterTable>, ImportReport)> {
    let mut order: Vec<u16> = Vec::new();
    let mut pending: BTreeMap<u16, PendingDevice> = BTreeMap::new();

    let report = read_rows(reader, |row: DeviceRow| {
        if row.address > MAX_ADDRESS {
            return Err(SimulatorError::OutOfRangeAddress {
                port: row.port,
                kind: row.kind,
                address: row.address,
                len: MAX_ADDRESS + 1,
            });
        }
        let register = match row.kind {
            PointKind::Register => Some(register_value(row.value)?),
            PointKind::Coil => None,
        };

        let device = pending.entry(row.port).or_insert_with(|| {
            order.push(row.port);
            PendingDevice::default()
        });
        match register {
            Some(value) => {
                device.registers.insert(row.address, value);
            }
            None => {
                device.coils.insert(row.address, row.value != 0);
            }
        }
        Ok(())
    })?;

    let tables = order
        .into_iter()
        .filter_map(|port| pending.remove(&port).map(|device| device.build(port)))
        .collect();
    Ok((tables, report))
}

/// Export device tables to `path`
pub fn export_device_table(path: &Path, devices: &[TableSnapshot]) -> SimulatorResult<usize> {
    let rows = write_device_table(create_file(path)?, devices)?;
    info!("Exported {} row(s) for {} device(s) to {}", rows, devices.len(), path.display());
    Ok(rows)
}

/// Import device tables from `path`
pub fn import_device_table(path: &Path) -> SimulatorResult<(Vec<RegisterTable>, ImportReport)> {
    let (tables, report) = read_device_table(open_file(path)?)?;
    info!(
        "Imported {} device(s) from {} ({} row(s), {} skipped)",
        tables.len(),
        path.display(),
        report.imported,
        report.skipped.len()
    );
    Ok((tables, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_are_inferred_from_max_address() {
        let input = "Port;Type;Address;Value\n502;Coil;0;1\n502;Register;3;42\n";
        let (tables, report) = read_device_table(input.as_bytes()).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.imported, 2);
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.port(), 502);
        assert_eq!(table.num_coils(), 1);
        assert_eq!(table.num_registers(), 4);
        let snapshot = table.snapshot();
        assert_eq!(snapshot.coils, vec![true]);
        assert_eq!(snapshot.registers, vec![0, 0, 0, 42]);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let input = "Port;Type;Address;Value\n\
                     503;Coil;0;1\n\
                     oops;Coil;0;1\n\
                     503;Input;0;1\n\
                     503;Register;1;70000\n\
                     502;Register;0;7\n";
        let (tables, report) = read_device_table(input.as_bytes()).unwrap();

        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped.len(), 3);
        assert!(matches!(
            report.skipped[0],
            SimulatorError::MalformedImport { line: 3, .. }
        ));
        assert!(matches!(report.skipped[2], SimulatorError::ValueOutOfRange { .. }));

        let ports: Vec<u16> = tables.iter().map(|t| t.port()).collect();
        assert_eq!(ports, vec![503, 502]);
        assert_eq!(tables[0].num_registers(), 0);
    }

    #[test]
    fn test_export_then_import_restores_contents() {
        let devices = vec![
            TableSnapshot {
                port: 502,
                coils: vec![false, true],
                registers: vec![1, 65535, 0],
            },
            TableSnapshot {
                port: 503,
                coils: vec![],
                registers: vec![9],
            },
        ];
        let mut buffer = Vec::new();
        assert_eq!(write_device_table(&mut buffer, &devices).unwrap(), 6);

        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("Port;Type;Address;Value\n502;Coil;0;0\n502;Coil;1;1\n"));

        let (tables, report) = read_device_table(buffer.as_slice()).unwrap();
        assert!(report.is_clean());
        let restored: Vec<TableSnapshot> = tables.iter().map(|t| t.snapshot()).collect();
        assert_eq!(restored, devices);
    }
}
