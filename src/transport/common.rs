// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Transport Adapter: a capability set shared by the raw-TCP and
//! WebSocket transports. Each transport owns its own byte-level framing
//! and hands fully decoded packets to a callback, so the Multiplexer and
//! Event Router never need to know which transport is underneath.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ProtocolError, Result},
    wire::Packet,
};

/// Invoked once per decoded packet. Implementations dispatch
/// synchronously and spawn their own tasks for anything that needs to
/// await (matching the original single-loop "schedule and return"
/// pattern), so this callback itself must not block.
pub type PacketCallback = Arc<dyn Fn(Packet) + Send + Sync>;

/// Invoked exactly once when the transport detects it has disconnected
/// (read EOF, write failure, or an explicit close). Pending requests have
/// already been cancelled by the time this fires.
pub type LostCallback = Arc<dyn Fn() + Send + Sync>;

/// Shared capability set for both transport implementations.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Write raw bytes (an already-framed header+body) to the socket.
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Begin closing the transport. Does not block; idempotent.
    fn close(&self);

    /// Whether `close()` has been called or the peer has gone away.
    fn is_closing(&self) -> bool;

    /// Resolves once the transport has fully closed (read loop exited).
    async fn wait_closed(&self);
}

/// Race an I/O future against a timeout and an external cancellation
/// token (used by both transports for connect/read/write deadlines).
pub(super) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(ProtocolError::Cancelled),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(ProtocolError::Timeout(io_timeout)),
            }
        }
    }
    .map_err(|e| match e {
        ProtocolError::Io(msg) => ProtocolError::Io(format!("{label}: {msg}")),
        other => other,
    })
}
