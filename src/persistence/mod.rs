// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Flat `;`-delimited import and export
//!
//! Two formats are supported:
//!
//! - device tables, `Port;Type;Address;Value`, one row per coil or register
//! - scripted sequences, `Port;Type;Address;Value;Time_ms`, one row per event
//!
//! Imports are row tolerant: a malformed row is recorded in the
//! [`ImportReport`] and the rest of the file is still read.

pub mod device_table;
pub mod scenario_file;

use std::fs::File;
use std::io;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use log::warn;
use serde::de::DeserializeOwned;

use crate::error::{SimulatorError, SimulatorResult};

pub use device_table::{export_device_table, import_device_table, read_device_table, write_device_table};
pub use scenario_file::{export_scenario, import_scenario, read_scenario, write_scenario};

const DELIMITER: u8 = b';';

/// Rows accepted and rejected by an import
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<SimulatorError>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    fn skip(&mut self, error: SimulatorError) {
        warn!("Skipping import row: {}", error);
        self.skipped.push(error);
    }
}

fn csv_reader<R: io::Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn csv_writer<W: io::Write>(writer: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .from_writer(writer)
}

/// Deserialize every row, handing valid ones to `accept`
///
/// Rows that fail to parse are recorded as `MalformedImport` with their line
/// number. `accept` may reject a parsed row by returning an error, which is
/// recorded the same way.
fn read_rows<R, T, F>(reader: R, mut accept: F) -> SimulatorResult<ImportReport>
where
    R: io::Read,
    T: DeserializeOwned,
    F: FnMut(T) -> SimulatorResult<()>,
{
    let mut reader = csv_reader(reader);
    let headers = reader.headers()?.clone();
    let mut report = ImportReport::default();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                report.skip(SimulatorError::MalformedImport {
                    line: e.position().map(|p| p.line()).unwrap_or_default(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let outcome = record
            .deserialize::<T>(Some(&headers))
            .map_err(|e| SimulatorError::MalformedImport {
                line,
                reason: e.to_string(),
            })
            .and_then(&mut accept);
        match outcome {
            Ok(()) => report.imported += 1,
            Err(e) => report.skip(e),
        }
    }
    Ok(report)
}

fn create_file(path: &Path) -> SimulatorResult<File> {
    Ok(File::create(path)?)
}

fn open_file(path: &Path) -> SimulatorResult<File> {
    Ok(File::open(path)?)
}
