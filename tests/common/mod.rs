// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::sync::Once;

use rust_modbus_simulator::config::Config;

static INIT: Once = Once::new();

/// Setup logger for tests
pub fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Find `count` consecutive free ports on the loopback interface
pub fn free_ports(count: u16) -> u16 {
    for _ in 0..200 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = listener.local_addr().unwrap().port();
        drop(listener);

        let Some(last) = base.checked_add(count - 1) else {
            continue;
        };
        if (base..=last).all(|port| TcpListener::bind(("127.0.0.1", port)).is_ok()) {
            return base;
        }
    }
    panic!("no range of {} free ports found", count);
}

/// Configuration with short actor intervals
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.fleet.address = "127.0.0.1".to_string();
    config.randomizer.interval_ms = 10;
    config.poller.interval_ms = 20;
    config.scheduler.condition_poll_ms = 10;
    config.scheduler.replay_tick_ms = 5;
    config
}

pub fn device_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}
