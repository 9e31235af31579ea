// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Event Router: demultiplexes inbound push packets (node status, warn,
//! and per-room events) once the Packet Multiplexer has determined a
//! packet is not a response.

use std::sync::Arc;

use rmpv::Value;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::{client::ClientInner, wire::{Packet, Proto, msgpack}};

/// One inbound room push, queued for the client's ordered room-event
/// consumer so it is applied in the order it arrived on the wire.
pub(crate) struct RoomEvent {
    proto: Proto,
    data: Value,
}

/// Spawns the single task that drains `rx` and applies room events one
/// at a time, in arrival order. The rooms registry lock only gives
/// mutual exclusion, not ordering, so handling each event on its own
/// spawned task would let the scheduler apply them out of order (e.g. an
/// emit that arrived after a leave winning the lock first); routing them
/// through one channel and one consumer keeps wire order intact.
pub(crate) fn spawn_room_event_consumer(
    client: Arc<ClientInner>,
    mut rx: mpsc::UnboundedReceiver<RoomEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            dispatch_room_event(&client, event.proto, event.data).await;
        }
    });
}

/// Routes one non-response push packet. Spawned off the transport's read
/// loop so the router itself never blocks it.
pub(crate) fn dispatch(client: &Arc<ClientInner>, packet: Packet) {
    let Ok(proto) = Proto::try_from(packet.tp) else {
        warn!("push packet with unknown type {}", packet.tp);
        return;
    };

    let data = match msgpack::unpack(&packet.payload) {
        Ok(v) => v,
        Err(e) => {
            warn!("failed to decode push packet payload: {e}");
            return;
        },
    };

    match proto {
        Proto::OnNodeStatus => handle_node_status(client, data),
        Proto::OnWarn => handle_warn(data),
        Proto::OnRoomJoin
        | Proto::OnRoomLeave
        | Proto::OnRoomEmit
        | Proto::OnRoomDelete => {
            if client.send_room_event(RoomEvent { proto, data }).is_err() {
                warn!("room event consumer has shut down, dropping {proto:?} event");
            }
        },
        other => warn!("unexpected push packet type {other:?}"),
    }
}

fn handle_node_status(client: &Arc<ClientInner>, data: Value) {
    let status = data
        .as_map()
        .and_then(|m| m.iter().find(|(k, _)| k.as_str() == Some("status")))
        .and_then(|(_, v)| v.as_str())
        .unwrap_or_default()
        .to_string();

    if status == "SHUTTING_DOWN" {
        warn!("node reports SHUTTING_DOWN; scheduling reconnect");
        if client.auto_reconnect() {
            client.spawn_reconnect();
        }
    } else {
        tracing::info!("node status: {status}");
    }
}

fn handle_warn(data: Value) {
    let msg = data
        .as_map()
        .and_then(|m| m.iter().find(|(k, _)| k.as_str() == Some("warn_msg")))
        .and_then(|(_, v)| v.as_str())
        .unwrap_or("(no message)");
    warn!("server warning: {msg}");
}

async fn dispatch_room_event(client: &Arc<ClientInner>, proto: Proto, data: Value) {
    let Some(id) = data
        .as_map()
        .and_then(|m| m.iter().find(|(k, _)| k.as_str() == Some("id")))
        .and_then(|(_, v)| v.as_i64())
    else {
        error!("room push event missing `id`: {data:?}");
        return;
    };

    let _guard = client.rooms_lock().lock().await;
    let Some(room) = client.lookup_room(id) else {
        warn!("push event for unknown room id {id}, dropping");
        return;
    };

    if matches!(proto, Proto::OnRoomLeave | Proto::OnRoomDelete) {
        client.unregister_room(id);
    }
    room.handle_event(proto, data).await;
}
