// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use rmpv::Value;
use roomdb_client_rs::{
    client::Client,
    rooms::{RoomBuilder, RoomHandlers},
    wire::{Proto, msgpack},
};

use super::common::{MockServer, test_config};

struct RecordingHandlers {
    emitted: Arc<AtomicBool>,
}

impl RoomHandlers for RecordingHandlers {
    fn on_emit(&self, _event: &str, _args: &[Value]) {
        self.emitted.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn reconnecting_to_the_other_node_rejoins_the_active_room() {
    let server_a = MockServer::bind().await;
    let server_b = MockServer::bind().await;
    let port_a = server_a.port;
    let port_b = server_b.port;

    // Node A: handshake, JOIN, then the connection is dropped to force a
    // reconnect.
    let node_a = tokio::spawn(async move {
        let mut conn = server_a.accept().await;
        conn.handshake().await;

        let join = conn.read_packet().await;
        assert_eq!(join.tp, Proto::ReqJoin.as_u8());
        let payload = msgpack::unpack(&join.payload).expect("decode join payload");
        assert_eq!(
            payload,
            Value::Array(vec![Value::from("//c"), Value::from(77i64)])
        );
        conn.write_packet(join.pid, Proto::ResData, &Value::Array(vec![Value::from(77i64)]))
            .await;
        // Dropping `conn` here kills the active node's TCP connection.
    });

    // Node B: handshake, then the rejoin JOIN sent automatically by the
    // reconnect loop, then an emit to prove the room is still active.
    let node_b = tokio::spawn(async move {
        let mut conn = server_b.accept().await;
        conn.handshake().await;

        let rejoin = conn.read_packet().await;
        assert_eq!(rejoin.tp, Proto::ReqJoin.as_u8());
        let payload = msgpack::unpack(&rejoin.payload).expect("decode rejoin payload");
        assert_eq!(
            payload,
            Value::Array(vec![Value::from("//c"), Value::from(77i64)])
        );
        conn.write_packet(
            rejoin.pid,
            Proto::ResData,
            &Value::Array(vec![Value::from(77i64)]),
        )
        .await;

        let emit_body = Value::Map(vec![
            (Value::from("id"), Value::from(77i64)),
            (Value::from("event"), Value::from("ping")),
            (Value::from("args"), Value::Array(vec![])),
        ]);
        conn.write_packet(0, Proto::OnRoomEmit, &emit_body).await;
    });

    let client = Client::connect(test_config(&[port_a, port_b])).await.expect("connect");

    let emitted = Arc::new(AtomicBool::new(false));
    let room = RoomBuilder::new(77i64, Arc::new(RecordingHandlers { emitted: emitted.clone() }))
        .scope("//c")
        .build();
    let room = client.join_room(room, None).await.expect("join room 77");
    assert_eq!(room.id().await, Some(77));

    node_a.await.expect("node a task");
    node_b.await.expect("node b task");

    // Give the reconnect loop and the emit dispatch a moment to run.
    for _ in 0..50 {
        if emitted.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(emitted.load(Ordering::SeqCst), "room did not receive the emit after reconnect");
}
