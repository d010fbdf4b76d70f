// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP endpoint of one simulated device
//!
//! Binding and serving are split: `bind` claims the port and reports a
//! `BindFailure` synchronously, `start` spawns the accept loop. This lets the
//! fleet preload a device's contents before any client can connect.
//!
//! The Modbus server runs every client connection in its own task. Each
//! connection's transport watches the endpoint's cancellation token, so
//! stopping the endpoint also closes the connections already accepted.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{self, Poll};

use log::{debug, error, info};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use super::data_bank::{lock_bank, SharedDataBank};
use super::modbus_server::ModbusDeviceService;
use crate::error::{SimulatorError, SimulatorResult};

/// One Modbus TCP listener serving one data bank
#[derive(Debug)]
pub struct DeviceEndpoint {
    port: u16,
    local_addr: SocketAddr,
    data_bank: SharedDataBank,
    listener: Option<TcpListener>,
    server_handle: Option<JoinHandle<()>>,
    connections: CancellationToken,
}

impl DeviceEndpoint {
    /// Claim `address:port` for a device backed by `data_bank`
    ///
    /// # Errors
    ///
    /// Returns `SimulatorError::BindFailure` when the port cannot be claimed,
    /// for example because it is already in use.
    pub async fn bind(address: &str, port: u16, data_bank: SharedDataBank) -> SimulatorResult<Self> {
        let listener = TcpListener::bind((address, port))
            .await
            .map_err(|e| SimulatorError::BindFailure {
                port,
                reason: e.to_string(),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SimulatorError::BindFailure {
                port,
                reason: e.to_string(),
            })?;
        debug!("Device endpoint bound on {}", local_addr);

        Ok(Self {
            port,
            local_addr,
            data_bank,
            listener: Some(listener),
            server_handle: None,
            connections: CancellationToken::new(),
        })
    }

    /// Start accepting Modbus TCP connections
    pub fn start(&mut self) -> SimulatorResult<()> {
        let listener = self.listener.take().ok_or(SimulatorError::AlreadyRunning {
            what: "device endpoint",
        })?;

        let port = self.port;
        let data_bank = Arc::clone(&self.data_bank);
        let connections = self.connections.clone();
        let server = Server::new(listener);

        let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
            let data_bank = Arc::clone(&data_bank);
            let connections = connections.clone();
            async move {
                debug!("Device {}: client connected from {}", port, socket_addr);
                let accepted = accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                    Ok(Some(ModbusDeviceService::new(port, Arc::clone(&data_bank))))
                })?;
                Ok::<_, io::Error>(
                    accepted.map(|(service, stream)| (service, ClientStream::new(stream, connections))),
                )
            }
        };

        let on_process_error = move |err: std::io::Error| {
            error!("Modbus server error on port {}: {err}", port);
        };

        self.server_handle = Some(tokio::spawn(async move {
            if let Err(e) = server.serve(&on_connected, on_process_error).await {
                error!("Modbus server on port {} stopped: {}", port, e);
            }
        }));

        info!("Device endpoint serving on {}", self.local_addr);
        Ok(())
    }

    /// Stop accepting connections, close the open ones and release the port
    ///
    /// The port is free again when this returns. A client that was connected
    /// sees its connection closed and cannot reach the data bank anymore.
    pub async fn stop(&mut self) {
        self.connections.cancel();
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Modbus server on port {} failed: {}", self.port, e);
                }
            }
            info!("Device endpoint on port {} stopped", self.port);
        }
        self.listener = None;
    }

    pub fn is_serving(&self) -> bool {
        self.server_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn data_bank(&self) -> SharedDataBank {
        Arc::clone(&self.data_bank)
    }

    pub fn set_coils(&self, offset: usize, values: &[bool]) -> bool {
        lock_bank(&self.data_bank).set_coils(offset, values)
    }

    pub fn set_registers(&self, offset: usize, values: &[u16]) -> bool {
        lock_bank(&self.data_bank).set_holding_registers(offset, values)
    }

    /// Read coils; `None` means the values are temporarily unavailable
    pub fn get_coils(&self, offset: usize, count: usize) -> Option<Vec<bool>> {
        lock_bank(&self.data_bank).get_coils(offset, count)
    }

    /// Read holding registers; `None` means the values are temporarily unavailable
    pub fn get_registers(&self, offset: usize, count: usize) -> Option<Vec<u16>> {
        lock_bank(&self.data_bank).get_holding_registers(offset, count)
    }
}

impl Drop for DeviceEndpoint {
    fn drop(&mut self) {
        self.connections.cancel();
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

/// Transport of one client connection
///
/// Once the endpoint's token is cancelled, reads report the end of the stream
/// and writes fail. The connection task then ends and drops the socket.
struct ClientStream {
    inner: TcpStream,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    closed: bool,
}

impl ClientStream {
    fn new(inner: TcpStream, token: CancellationToken) -> Self {
        Self {
            inner,
            cancelled: Box::pin(token.cancelled_owned()),
            closed: false,
        }
    }

    /// Also registers the task to be woken on cancellation
    fn poll_closed(&mut self, cx: &mut task::Context<'_>) -> bool {
        if !self.closed && self.cancelled.as_mut().poll(cx).is_ready() {
            self.closed = true;
        }
        self.closed
    }
}

impl AsyncRead for ClientStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.poll_closed(cx) {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.poll_closed(cx) {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
