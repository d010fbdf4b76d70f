// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use clap::Parser;
use std::error::Error;
use tokio::time::Duration;
use tokio_modbus::prelude::*;

/// Modbus client for probing a simulated device
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "502")]
    port: u16,

    /// Number of coils to read, starting at 0
    #[clap(long, default_value = "10")]
    coils: u16,

    /// Number of holding registers to read, starting at 0
    #[clap(long, default_value = "10")]
    registers: u16,

    /// Write a coil before reading, as ADDR=VALUE (non-zero sets the coil)
    #[clap(long, value_parser = parse_assignment)]
    write_coil: Vec<(u16, u16)>,

    /// Write a holding register before reading, as ADDR=VALUE
    #[clap(long, value_parser = parse_assignment)]
    write_register: Vec<(u16, u16)>,
}

fn parse_assignment(s: &str) -> Result<(u16, u16), String> {
    let (address, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ADDR=VALUE, got '{s}'"))?;
    let address = address
        .trim()
        .parse()
        .map_err(|_| format!("invalid address '{address}'"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid value '{value}'"))?;
    Ok((address, value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let socket_addr: std::net::SocketAddr = format!("{}:{}", args.address, args.port).parse()?;
    println!("Connecting to Modbus server at {}", socket_addr);

    let mut ctx = tcp::connect(socket_addr).await?;

    for (address, value) in &args.write_coil {
        ctx.write_single_coil(*address, *value != 0).await??;
        println!("Coil {} <- {}", address, u16::from(*value != 0));
    }
    for (address, value) in &args.write_register {
        ctx.write_single_register(*address, *value).await??;
        println!("Register {} <- {}", address, value);
    }

    if args.coils > 0 {
        let coils = tokio::time::timeout(Duration::from_secs(1), ctx.read_coils(0, args.coils))
            .await???;
        for (address, coil) in coils.iter().enumerate() {
            println!("Coil {}: {}", address, u8::from(*coil));
        }
    }

    if args.registers > 0 {
        let registers = tokio::time::timeout(
            Duration::from_secs(1),
            ctx.read_holding_registers(0, args.registers),
        )
        .await???;
        for (address, value) in registers.iter().enumerate() {
            println!("Register {}: {}", address, value);
        }
    }

    ctx.disconnect().await?;
    Ok(())
}
