// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Packet Multiplexer: allocates request/response pids, tracks pending
//! slots by pid, and completes them exactly once from the transport's
//! decoded packets. Mirrors the shape of the teacher's per-ITT
//! `sending`/`reciver` maps, but keyed by a single rolling pid instead
//! of a pair of maps, since every request here has exactly one reply.
//!
//! One multiplexer instance lives for the lifetime of a `Client`, shared
//! across every reconnect; its pid counter keeps incrementing across
//! connections rather than resetting. `cancel_all` is invoked from a
//! transport's `on_lost` hook only when that transport is still the
//! client's *current* one (see `ClientInner::try_connect_node`), so a
//! superseded transport dying during its close grace period cannot
//! cancel requests already in flight on the connection that replaced it.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU16, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use rmpv::Value;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{error, warn};

use crate::{
    error::{ProtocolError, Result},
    transport::Transport,
    wire::{Packet, Proto, msgpack},
};

struct PendingSlot {
    tx: oneshot::Sender<Result<Value>>,
    timer: Option<JoinHandle<()>>,
}

/// Tracks in-flight requests by pid and completes them from incoming
/// response packets. Shared for the lifetime of the owning `Client`
/// across reconnects; pids keep rolling forward rather than resetting
/// per connection.
pub struct Multiplexer {
    pending: DashMap<u16, PendingSlot>,
    next_pid: AtomicU16,
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_pid: AtomicU16::new(0),
        }
    }

    /// Serializes `value` as the body of a `tp`-typed packet, writes it
    /// through `transport`, and returns the decoded reply. `timeout`
    /// bounds how long to wait for a response; `None` waits forever.
    pub async fn send(
        self: &Arc<Self>,
        transport: &dyn Transport,
        tp: Proto,
        value: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let payload = msgpack::pack(value)?;
        let (pid, rx) = self.allocate(timeout)?;

        let framed = Packet::encode(pid, tp.as_u8(), &payload);
        if let Err(e) = transport.write(&framed).await {
            self.drop_pending(pid);
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Cancelled),
        }
    }

    /// Allocates the next pid (mod 2^16, incremented before use) and
    /// registers a pending slot for it. A pid that collides with one
    /// still pending means more than 65536 requests are outstanding at
    /// once, which is an internal invariant violation, not a recoverable
    /// condition.
    fn allocate(
        self: &Arc<Self>,
        timeout: Option<Duration>,
    ) -> Result<(u16, oneshot::Receiver<Result<Value>>)> {
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed).wrapping_add(1);

        if self.pending.contains_key(&pid) {
            error!("pid {pid} collided with a still-pending request");
            return Err(ProtocolError::Internal(format!(
                "pid {pid} collided with a still-pending request"
            )));
        }

        let (tx, rx) = oneshot::channel();
        let timer = timeout.map(|dur| {
            let mux = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(dur).await;
                mux.fail_pending(pid, ProtocolError::Timeout(dur));
            })
        });
        self.pending.insert(pid, PendingSlot { tx, timer });

        Ok((pid, rx))
    }

    fn drop_pending(&self, pid: u16) {
        if let Some((_, slot)) = self.pending.remove(&pid) {
            if let Some(t) = slot.timer {
                t.abort();
            }
        }
    }

    fn fail_pending(&self, pid: u16, err: ProtocolError) {
        if let Some((_, slot)) = self.pending.remove(&pid) {
            let _ = slot.tx.send(Err(err));
        }
    }

    /// Completes the pending slot addressed by a decoded response
    /// packet. Only called for `ResPing`/`ResOk`/`ResData`/`ResError`;
    /// event packets never reach here.
    pub fn handle_response(&self, packet: Packet) {
        let Some((_, slot)) = self.pending.remove(&packet.pid) else {
            warn!("received response for unknown pid {}", packet.pid);
            return;
        };
        if let Some(t) = slot.timer {
            t.abort();
        }

        let proto = match Proto::try_from(packet.tp) {
            Ok(p) => p,
            Err(e) => {
                let _ = slot.tx.send(Err(e));
                return;
            },
        };

        let result = match proto {
            Proto::ResPing | Proto::ResOk => Ok(Value::Nil),
            Proto::ResData => msgpack::unpack(&packet.payload),
            Proto::ResError => match msgpack::unpack(&packet.payload) {
                Ok(data) => Err(error_from_data(data)),
                Err(e) => Err(e),
            },
            other => Err(ProtocolError::Framing(format!(
                "packet type {other:?} is not a response"
            ))),
        };

        let _ = slot.tx.send(result);
    }

    /// Cancels every pending request, used when the owning transport is
    /// declared lost.
    pub fn cancel_all(&self) {
        let pids: Vec<u16> = self.pending.iter().map(|e| *e.key()).collect();
        if !pids.is_empty() {
            warn!("cancelling {} pending requests: connection lost", pids.len());
        }
        for pid in pids {
            self.fail_pending(pid, ProtocolError::NotConnected);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn error_from_data(data: Value) -> ProtocolError {
    let code = data
        .as_map()
        .and_then(|m| m.iter().find(|(k, _)| k.as_str() == Some("error_code")))
        .and_then(|(_, v)| v.as_i64())
        .unwrap_or(-1);
    let msg = data
        .as_map()
        .and_then(|m| m.iter().find(|(k, _)| k.as_str() == Some("error_msg")))
        .and_then(|(_, v)| v.as_str())
        .unwrap_or("unknown error")
        .to_string();
    ProtocolError::from_wire(code, msg, data)
}

/// Dispatches a decoded packet read from the wire: response packets go
/// to the multiplexer, everything else is the caller's job (event
/// routing).
pub fn route_packet(mux: &Multiplexer, packet: Packet) -> Option<Packet> {
    if matches!(packet.tp, t if t == Proto::ResPing.as_u8()
        || t == Proto::ResOk.as_u8()
        || t == Proto::ResData.as_u8()
        || t == Proto::ResError.as_u8())
    {
        mux.handle_response(packet);
        None
    } else {
        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        written: std::sync::Mutex<Vec<Vec<u8>>>,
        calls: AtomicUsize,
    }

    impl std::fmt::Debug for RecordingTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RecordingTransport").finish()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn write(&self, bytes: &[u8]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.written.lock().expect("lock").push(bytes.to_vec());
            Ok(())
        }
        fn close(&self) {}
        fn is_closing(&self) -> bool {
            false
        }
        async fn wait_closed(&self) {}
    }

    #[tokio::test]
    async fn send_completes_on_matching_response() {
        let mux = Arc::new(Multiplexer::new());
        let transport = RecordingTransport::default();

        let mux_clone = Arc::clone(&mux);
        let send = tokio::spawn(async move {
            mux_clone
                .send(&transport, Proto::ReqPing, &Value::Nil, None)
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mux.pending_count(), 1);

        let pid = *mux.pending.iter().next().expect("one pending").key();
        let body = msgpack::pack(&Value::Nil).expect("pack");
        let reply = Packet::encode(pid, Proto::ResOk.as_u8(), &body);
        let mut reply_buf = bytes::BytesMut::from(&reply[..]);
        let packet = Packet::try_parse(&mut reply_buf).unwrap().unwrap();
        mux.handle_response(packet);

        let result = send.await.expect("join").expect("ok response");
        assert_eq!(result, Value::Nil);
    }

    #[tokio::test]
    async fn pending_requests_are_cancelled_on_disconnect() {
        let mux = Arc::new(Multiplexer::new());
        let transport = RecordingTransport::default();

        let mux_clone = Arc::clone(&mux);
        let send = tokio::spawn(async move {
            mux_clone
                .send(&transport, Proto::ReqPing, &Value::Nil, None)
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        mux.cancel_all();
        let result = send.await.expect("join");
        assert!(matches!(result, Err(ProtocolError::NotConnected)));
    }

    #[tokio::test]
    async fn timeout_fails_the_request() {
        let mux = Arc::new(Multiplexer::new());
        let transport = RecordingTransport::default();

        let result = mux
            .send(
                &transport,
                Proto::ReqPing,
                &Value::Nil,
                Some(Duration::from_millis(20)),
            )
            .await;
        assert!(matches!(result, Err(ProtocolError::Timeout(_))));
    }

    #[tokio::test]
    async fn error_response_maps_to_typed_error() {
        let mux = Arc::new(Multiplexer::new());
        let transport = RecordingTransport::default();

        let mux_clone = Arc::clone(&mux);
        let send = tokio::spawn(async move {
            mux_clone
                .send(&transport, Proto::ReqQuery, &Value::Nil, None)
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let pid = *mux.pending.iter().next().expect("one pending").key();
        let errdata = Value::Map(vec![
            (Value::from("error_code"), Value::from(-60)),
            (Value::from("error_msg"), Value::from("bad value")),
        ]);
        let body = msgpack::pack(&errdata).expect("pack");
        let reply = Packet::encode(pid, Proto::ResError.as_u8(), &body);
        let mut reply_buf = bytes::BytesMut::from(&reply[..]);
        let packet = Packet::try_parse(&mut reply_buf).unwrap().unwrap();
        mux.handle_response(packet);

        let result = send.await.expect("join");
        assert!(matches!(result, Err(ProtocolError::ValueError(_))));
    }
}
