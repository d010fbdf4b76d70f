// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus service implementation for a simulated device
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the simulated device that
//! provides data, while the client is the external program that requests data.
//!
//! ## Supported Function Codes
//!
//! | Code | Request | Address space |
//! |------|---------|---------------|
//! | 0x01 | Read Coils | coils |
//! | 0x03 | Read Holding Registers | holding registers |
//! | 0x05 | Write Single Coil | coils |
//! | 0x06 | Write Single Register | holding registers |
//! | 0x0F | Write Multiple Coils | coils |
//! | 0x10 | Write Multiple Registers | holding registers |
//! | 0x17 | Read/Write Multiple Registers | holding registers |
//!
//! Requests reaching beyond the configured table size answer
//! `IllegalDataAddress`, any other function code answers `IllegalFunction`.

use std::future;

use log::{debug, error};

use tokio_modbus::prelude::*;

use super::data_bank::{lock_bank, SharedDataBank};

/// A Modbus TCP service answering requests against one device's data bank.
///
/// One service instance is created per client connection; all of them share the
/// same `SharedDataBank`, so writes from one client are immediately visible to
/// other clients and to the operator side of the simulator.
///
/// ### Thread Safety
///
/// Each request is served under a single lock of the data bank, so a client
/// never observes a partially applied multi-point write.
pub struct ModbusDeviceService {
    /// Port of the device, used for log context only
    port: u16,

    /// Coil and holding register storage of the device
    data_bank: SharedDataBank,
}

impl tokio_modbus::server::Service for ModbusDeviceService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    /// Process a Modbus request and provide a response
    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Device {}: received Modbus request {:?}", self.port, req);

        let mut bank = lock_bank(&self.data_bank);
        let res = match req {
            Request::ReadCoils(addr, cnt) => bank
                .get_coils(addr.into(), cnt.into())
                .map(Response::ReadCoils)
                .ok_or(ExceptionCode::IllegalDataAddress),
            Request::ReadHoldingRegisters(addr, cnt) => bank
                .get_holding_registers(addr.into(), cnt.into())
                .map(Response::ReadHoldingRegisters)
                .ok_or(ExceptionCode::IllegalDataAddress),
            Request::WriteSingleCoil(addr, value) => {
                checked(bank.set_coils(addr.into(), std::slice::from_ref(&value)))
                    .map(|_| Response::WriteSingleCoil(addr, value))
            }
            Request::WriteMultipleCoils(addr, values) => {
                checked(bank.set_coils(addr.into(), &values))
                    .map(|_| Response::WriteMultipleCoils(addr, values.len() as u16))
            }
            Request::WriteSingleRegister(addr, value) => checked(
                bank.set_holding_registers(addr.into(), std::slice::from_ref(&value)),
            )
            .map(|_| Response::WriteSingleRegister(addr, value)),
            Request::WriteMultipleRegisters(addr, values) => {
                checked(bank.set_holding_registers(addr.into(), &values))
                    .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            Request::ReadWriteMultipleRegisters(read_addr, read_cnt, write_addr, values) => {
                // Both ranges are checked before anything is written, then the
                // write is performed before the read
                checked(bank.holding_registers_fit(read_addr.into(), read_cnt.into()))
                    .and_then(|_| checked(bank.set_holding_registers(write_addr.into(), &values)))
                    .and_then(|_| {
                        bank.get_holding_registers(read_addr.into(), read_cnt.into())
                            .map(Response::ReadWriteMultipleRegisters)
                            .ok_or(ExceptionCode::IllegalDataAddress)
                    })
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };
        drop(bank);

        if let Err(e) = &res {
            error!("Device {}: Modbus request error: {:?}", self.port, e);
        }

        future::ready(res)
    }
}

impl ModbusDeviceService {
    /// Create a service serving the given data bank
    pub fn new(port: u16, data_bank: SharedDataBank) -> Self {
        Self { port, data_bank }
    }
}

fn checked(in_range: bool) -> Result<(), ExceptionCode> {
    if in_range {
        Ok(())
    } else {
        error!("Exception::IllegalDataAddress - request outside of the data bank");
        Err(ExceptionCode::IllegalDataAddress)
    }
}
