// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the device fleet
//!
//! These tests start real device endpoints on free loopback ports and talk to
//! them with a `tokio-modbus` client, checking that operator writes, protocol
//! writes and the randomizer all act on the same tables.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_modbus::prelude::*;

use rust_modbus_simulator::fleet::FleetManager;
use rust_modbus_simulator::modbus::{PointKind, WriteOutcome};
use rust_modbus_simulator::simulation::{RandomizerState, SimEvent};
use rust_modbus_simulator::SimulatorError;

use common::{device_addr, fast_config, free_ports, setup};

#[tokio::test]
async fn test_operator_and_client_share_tables() -> Result<(), Box<dyn std::error::Error>> {
    setup();
    let base = free_ports(2);
    let mut fleet = FleetManager::new(fast_config());

    let report = fleet.start_fleet(base, 2, 4, 8).await?;
    assert!(report.failures.is_empty());
    assert_eq!(report.tables.len(), 2);
    assert!(fleet.is_running());

    // Operator side to client side
    assert_eq!(
        fleet.write(base + 1, PointKind::Register, 7, 4242)?,
        WriteOutcome::Applied
    );
    assert_eq!(fleet.write(base + 1, PointKind::Coil, 2, 5)?, WriteOutcome::Applied);
    let mut ctx = tcp::connect(device_addr(base + 1)).await?;
    assert_eq!(ctx.read_holding_registers(7, 1).await??, vec![4242]);
    assert_eq!(
        ctx.read_coils(0, 4).await??,
        vec![false, false, true, false]
    );

    // Client side to operator side
    ctx.write_multiple_registers(0, &[1, 2, 3]).await??;
    let table = fleet.find_by_port(base + 1).unwrap();
    assert_eq!(&table.read_all().registers[..3], &[1, 2, 3]);

    // Devices are independent
    let other = fleet.find_by_port(base).unwrap().read_all();
    assert!(other.registers.iter().all(|&r| r == 0));

    ctx.disconnect().await?;
    fleet.stop_fleet().await;
    assert!(!fleet.is_running());
    assert!(fleet.find_by_port(base).is_none());
    Ok(())
}

#[tokio::test]
async fn test_requests_beyond_table_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let base = free_ports(1);
    let mut fleet = FleetManager::new(fast_config());
    fleet.start_fleet(base, 1, 2, 2).await?;

    let mut ctx = tcp::connect(device_addr(base)).await?;
    assert_eq!(
        ctx.read_holding_registers(1, 2).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(
        ctx.read_input_registers(0, 1).await?,
        Err(ExceptionCode::IllegalFunction)
    );

    // Runtime writes out of bounds are ignored, not errors
    assert_eq!(fleet.write(base, PointKind::Coil, 2, 1)?, WriteOutcome::Ignored);
    assert!(matches!(
        fleet.write(base + 1, PointKind::Coil, 0, 1),
        Err(SimulatorError::UnknownDevice { .. })
    ));

    fleet.stop_fleet().await;
    Ok(())
}

#[tokio::test]
async fn test_bind_failure_does_not_abort_start() -> Result<(), Box<dyn std::error::Error>> {
    setup();
    let base = free_ports(3);
    let _taken = std::net::TcpListener::bind(("127.0.0.1", base + 1))?;
    let mut fleet = FleetManager::new(fast_config());

    let report = fleet.start_fleet(base, 3, 1, 1).await?;
    let ports: Vec<u16> = report.tables.iter().map(|t| t.port()).collect();
    assert_eq!(ports, vec![base, base + 2]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0],
        SimulatorError::BindFailure { port, .. } if port == base + 1
    ));
    assert!(fleet.find_by_port(base + 1).is_none());
    assert_eq!(fleet.tables().ports(), vec![base, base + 2]);

    fleet.stop_fleet().await;
    Ok(())
}

#[tokio::test]
async fn test_redundant_start_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let base = free_ports(1);
    let mut fleet = FleetManager::new(fast_config());
    fleet.start_fleet(base, 1, 1, 1).await?;

    assert!(matches!(
        fleet.start_fleet(base, 1, 1, 1).await,
        Err(SimulatorError::AlreadyRunning { .. })
    ));
    assert_eq!(fleet.tables().len(), 1);

    fleet.stop_fleet().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_releases_ports() -> Result<(), Box<dyn std::error::Error>> {
    let base = free_ports(2);
    let mut fleet = FleetManager::new(fast_config());

    fleet.start_fleet(base, 2, 1, 1).await?;
    fleet.stop_fleet().await;
    // Stopping twice is harmless
    fleet.stop_fleet().await;

    let report = fleet.start_fleet(base, 2, 1, 1).await?;
    assert!(report.failures.is_empty());
    fleet.stop_fleet().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_disconnects_connected_clients() -> Result<(), Box<dyn std::error::Error>> {
    let base = free_ports(1);
    let mut fleet = FleetManager::new(fast_config());
    fleet.start_fleet(base, 1, 1, 2).await?;
    let table = fleet.find_by_port(base).unwrap();

    let mut ctx = tcp::connect(device_addr(base)).await?;
    ctx.write_single_register(0, 5).await??;
    fleet.stop_fleet().await;

    let write = time::timeout(Duration::from_secs(2), ctx.write_single_register(1, 77)).await;
    assert!(!matches!(write, Ok(Ok(Ok(())))));
    let read = time::timeout(Duration::from_secs(2), ctx.read_holding_registers(0, 2)).await;
    assert!(!matches!(read, Ok(Ok(Ok(_)))));
    assert_eq!(table.read_all().registers, vec![5, 0]);

    // A restarted device on the same port starts from a fresh table
    fleet.start_fleet(base, 1, 1, 2).await?;
    let mut fresh = tcp::connect(device_addr(base)).await?;
    assert_eq!(fresh.read_holding_registers(0, 2).await??, vec![0, 0]);
    fresh.disconnect().await?;
    fleet.stop_fleet().await;
    Ok(())
}

#[tokio::test]
async fn test_randomizer_values_reach_clients_and_reset_on_stop() -> Result<(), Box<dyn std::error::Error>> {
    setup();
    let base = free_ports(1);
    let mut fleet = FleetManager::new(fast_config());
    fleet.start_fleet(base, 1, 16, 64).await?;
    let mut ctx = tcp::connect(device_addr(base)).await?;

    assert_eq!(fleet.toggle_randomizer().await, RandomizerState::Active);
    time::sleep(Duration::from_millis(50)).await;
    let randomized = ctx.read_holding_registers(0, 64).await??;
    assert!(randomized.iter().any(|&r| r != 0));

    assert_eq!(fleet.toggle_randomizer().await, RandomizerState::Idle);
    assert!(ctx.read_holding_registers(0, 64).await??.iter().all(|&r| r == 0));
    assert!(ctx.read_coils(0, 16).await??.iter().all(|&c| !c));

    // Stopping the fleet with the randomizer active also leaves zeroed tables
    assert_eq!(fleet.toggle_randomizer().await, RandomizerState::Active);
    let table = fleet.find_by_port(base).unwrap();
    time::sleep(Duration::from_millis(30)).await;
    ctx.disconnect().await?;
    fleet.stop_fleet().await;
    assert_eq!(fleet.randomizer_state(), RandomizerState::Idle);
    let snapshot = table.snapshot();
    assert!(snapshot.registers.iter().all(|&r| r == 0));
    assert_eq!(Arc::strong_count(&table), 1);
    Ok(())
}

#[tokio::test]
async fn test_poller_publishes_client_writes() -> Result<(), Box<dyn std::error::Error>> {
    let base = free_ports(1);
    let mut fleet = FleetManager::new(fast_config());
    fleet.start_fleet(base, 1, 1, 2).await?;
    let mut snapshots = fleet.subscribe_snapshots().unwrap();

    let mut ctx = tcp::connect(device_addr(base)).await?;
    ctx.write_single_register(1, 321).await??;

    let seen = time::timeout(Duration::from_secs(2), async {
        loop {
            snapshots.changed().await.unwrap();
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.device(base).is_some_and(|d| d.registers[1] == 321) {
                break snapshot;
            }
        }
    })
    .await?;
    assert!(seen.captured_at.is_some());

    ctx.disconnect().await?;
    fleet.stop_fleet().await;
    assert!(fleet.subscribe_snapshots().is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_keep_tables_consistent() -> Result<(), Box<dyn std::error::Error>> {
    setup();
    let base = free_ports(1);
    let mut fleet = FleetManager::new(fast_config());
    fleet.start_fleet(base, 1, 8, 16).await?;
    let table = fleet.find_by_port(base).unwrap();

    for step in 0..20u64 {
        fleet.add_event(SimEvent::new(
            base,
            PointKind::Register,
            (step % 16) as usize,
            step as i64 * 1000,
            step * 5,
        ))?;
    }
    assert_eq!(fleet.toggle_randomizer().await, RandomizerState::Active);
    fleet.execute_scenario()?;

    let client = tokio::spawn(async move {
        let mut ctx = tcp::connect(device_addr(base)).await.unwrap();
        for round in 0..100u16 {
            ctx.write_multiple_registers(0, &[round; 16]).await.unwrap().unwrap();
            ctx.write_multiple_coils(0, &[round % 2 == 0; 8]).await.unwrap().unwrap();
            let registers = ctx.read_holding_registers(0, 16).await.unwrap().unwrap();
            assert_eq!(registers.len(), 16);
        }
        ctx.disconnect().await.unwrap();
    });

    for round in 0..100usize {
        assert_eq!(
            fleet.write(base, PointKind::Register, round % 16, 65535)?,
            WriteOutcome::Applied
        );
        assert_eq!(fleet.write(base, PointKind::Coil, round % 8, 7)?, WriteOutcome::Applied);
        let snapshot = table.read_all();
        assert_eq!(snapshot.coils.len(), 8);
        assert_eq!(snapshot.registers.len(), 16);
        assert_eq!(table.num_coils(), 8);
        assert_eq!(table.num_registers(), 16);
        for address in 0..8 {
            assert!(matches!(snapshot.value(PointKind::Coil, address), Some(0 | 1)));
        }
        time::sleep(Duration::from_millis(1)).await;
    }

    client.await?;
    let report = time::timeout(Duration::from_secs(2), fleet.wait_scenario())
        .await?
        .unwrap();
    assert_eq!(report.fired, 20);
    assert_eq!(report.skipped, 0);

    // With the other writers done, the reset of the randomizer stop wins
    assert_eq!(fleet.toggle_randomizer().await, RandomizerState::Idle);
    let snapshot = table.read_all();
    assert!(snapshot.coils.iter().all(|&c| !c));
    assert!(snapshot.registers.iter().all(|&r| r == 0));
    time::sleep(Duration::from_millis(30)).await;
    let mut ctx = tcp::connect(device_addr(base)).await?;
    assert_eq!(ctx.read_holding_registers(0, 16).await??, vec![0; 16]);
    assert_eq!(ctx.read_coils(0, 8).await??, vec![false; 8]);
    ctx.disconnect().await?;

    fleet.stop_fleet().await;
    Ok(())
}

#[tokio::test]
async fn test_zero_intervals_do_not_stall_the_fleet() -> Result<(), Box<dyn std::error::Error>> {
    let base = free_ports(1);
    let mut config = fast_config();
    config.randomizer.interval_ms = 0;
    config.poller.interval_ms = 0;
    config.scheduler.condition_poll_ms = 0;
    config.scheduler.replay_tick_ms = 0;
    let mut fleet = FleetManager::new(config);
    fleet.start_fleet(base, 1, 1, 1).await?;

    let mut snapshots = fleet.subscribe_snapshots().unwrap();
    time::timeout(Duration::from_secs(1), snapshots.changed()).await??;

    fleet.set_random_interval(Duration::ZERO);
    assert_eq!(fleet.toggle_randomizer().await, RandomizerState::Active);
    time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fleet.toggle_randomizer().await, RandomizerState::Idle);

    time::timeout(Duration::from_secs(1), fleet.stop_fleet()).await?;
    Ok(())
}
