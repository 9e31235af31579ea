// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rmpv::Value;
use roomdb_client_rs::{client::Client, wire::{Proto, msgpack}};

use super::common::{MockServer, test_config};

fn code_of(payload: &Value) -> String {
    payload
        .as_array()
        .and_then(|a| a.get(1))
        .and_then(|v| v.as_str())
        .expect("query payload carries [scope, code]")
        .to_string()
}

#[tokio::test]
async fn replies_in_a_different_order_still_complete_the_right_future() {
    let server = MockServer::bind().await;
    let port = server.port;

    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.handshake().await;

        let mut pending = Vec::new();
        for _ in 0..3 {
            let packet = conn.read_packet().await;
            assert_eq!(packet.tp, Proto::ReqQuery.as_u8());
            let payload = msgpack::unpack(&packet.payload).expect("decode query payload");
            pending.push((packet.pid, code_of(&payload)));
        }

        // Reply in the order 3, 1, 2 regardless of arrival order.
        for code in ["q3", "q1", "q2"] {
            let (pid, _) = pending.iter().find(|(_, c)| c == code).expect("query present");
            conn.write_packet(*pid, Proto::ResData, &Value::from(code)).await;
        }
    });

    let client = Client::connect(test_config(&[port])).await.expect("connect");

    let (r1, r2, r3) = tokio::join!(
        client.query("q1", Some("@t"), None, Value::Nil),
        client.query("q2", Some("@t"), None, Value::Nil),
        client.query("q3", Some("@t"), None, Value::Nil),
    );

    assert_eq!(r1.expect("q1"), Value::from("q1"));
    assert_eq!(r2.expect("q2"), Value::from("q2"));
    assert_eq!(r3.expect("q3"), Value::from("q3"));
}
