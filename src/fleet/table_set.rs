// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::Arc;

use crate::modbus::RegisterTable;

/// Immutable, cheaply cloned view of the running tables in display order
///
/// The fleet hands a `TableSet` to each background actor when it starts, so
/// actors never observe a fleet that is being rebuilt.
#[derive(Debug, Clone, Default)]
pub struct TableSet(Arc<Vec<Arc<RegisterTable>>>);

impl TableSet {
    pub fn new(tables: Vec<Arc<RegisterTable>>) -> Self {
        Self(Arc::new(tables))
    }

    /// Table of the device on `port`; absence is a normal outcome
    pub fn find_by_port(&self, port: u16) -> Option<&Arc<RegisterTable>> {
        self.0.iter().find(|table| table.port() == port)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisterTable>> {
        self.0.iter()
    }

    pub fn ports(&self) -> Vec<u16> {
        self.0.iter().map(|table| table.port()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
