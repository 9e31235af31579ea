// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rmpv::Value;
use roomdb_client_rs::{client::Client, wire::Proto};

use super::common::{MockServer, test_config};

#[tokio::test]
async fn a_shutting_down_push_reconnects_while_the_old_connection_keeps_serving() {
    let server = MockServer::bind().await;
    let port = server.port;

    let driver = tokio::spawn(async move {
        let mut first = server.accept().await;
        first.handshake().await;

        let status = Value::Map(vec![
            (Value::from("status"), Value::from("SHUTTING_DOWN")),
            (Value::from("id"), Value::from(1i64)),
        ]);
        first.write_packet(0, Proto::OnNodeStatus, &status).await;

        // The old connection must still answer a request issued while the
        // reconnect loop is running in the background.
        let query = first.read_packet().await;
        assert_eq!(query.tp, Proto::ReqQuery.as_u8());
        first.write_packet(query.pid, Proto::ResData, &Value::from("still alive")).await;

        // The reconnect loop dials the (single-node) pool again.
        let mut second = server.accept().await;
        second.handshake().await;
        second
    });

    let client = Client::connect(test_config(&[port])).await.expect("connect");

    let result = client.query("ping_old_conn", Some("@t"), None, Value::Nil).await;
    assert_eq!(result.expect("query over the old connection"), Value::from("still alive"));

    let _second = driver.await.expect("driver task");
}
