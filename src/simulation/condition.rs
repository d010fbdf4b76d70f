// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Gating condition evaluated against live device values

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SimulatorError, SimulatorResult};
use crate::fleet::TableSet;
use crate::modbus::PointKind;

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Equal,
    Greater,
    Less,
}

impl Comparison {
    pub fn holds(self, live: i64, expected: i64) -> bool {
        match self {
            Comparison::Equal => live == expected,
            Comparison::Greater => live > expected,
            Comparison::Less => live < expected,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparison::Equal => "=",
            Comparison::Greater => ">",
            Comparison::Less => "<",
        };
        f.write_str(symbol)
    }
}

impl FromStr for Comparison {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Comparison::Equal),
            ">" => Ok(Comparison::Greater),
            "<" => Ok(Comparison::Less),
            other => Err(SimulatorError::InvalidCondition {
                reason: format!("unknown operator '{other}'"),
            }),
        }
    }
}

/// Comparison that must hold on one device point before a replay starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub port: u16,
    pub kind: PointKind,
    pub address: usize,
    pub operator: Comparison,
    pub value: i64,
}

impl Condition {
    pub fn new(port: u16, kind: PointKind, address: usize, operator: Comparison, value: i64) -> Self {
        Self {
            port,
            kind,
            address,
            operator,
            value,
        }
    }

    /// Check that the referenced device and address exist
    pub fn validate(&self, tables: &TableSet) -> SimulatorResult<()> {
        let table = tables
            .find_by_port(self.port)
            .ok_or(SimulatorError::UnknownDevice { port: self.port })?;
        table.check_address(self.kind, self.address)
    }

    /// Evaluate against the live value of the referenced point
    ///
    /// The table is reconciled with its endpoint first so values written by
    /// Modbus clients are taken into account. A missing device never satisfies
    /// the condition.
    pub fn is_satisfied(&self, tables: &TableSet) -> bool {
        tables
            .find_by_port(self.port)
            .and_then(|table| table.live_value(self.kind, self.address))
            .is_some_and(|live| self.operator.holds(i64::from(live), self.value))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "port={} {}[{}] {} {}",
            self.port, self.kind, self.address, self.operator, self.value
        )
    }
}

/// Parse `PORT:KIND:ADDRESS:OPERATOR:VALUE`, for example `502:Register:0:>:10`
impl FromStr for Condition {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| SimulatorError::InvalidCondition { reason };
        let fields: Vec<&str> = s.split(':').map(str::trim).collect();
        let [port, kind, address, operator, value] = fields.as_slice() else {
            return Err(invalid(format!(
                "expected PORT:KIND:ADDRESS:OPERATOR:VALUE, got '{s}'"
            )));
        };

        Ok(Self {
            port: port
                .parse()
                .map_err(|_| invalid(format!("invalid port '{port}'")))?,
            kind: kind.parse().map_err(invalid)?,
            address: address
                .parse()
                .map_err(|_| invalid(format!("invalid address '{address}'")))?,
            operator: operator.parse()?,
            value: value
                .parse()
                .map_err(|_| invalid(format!("invalid value '{value}'")))?,
        })
    }
}
