// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rmpv::Value;
use roomdb_client_rs::{client::Client, wire::Proto};

use super::common::{MockServer, test_config};

#[tokio::test]
async fn single_query_round_trip_returns_the_servers_payload() {
    let server = MockServer::bind().await;
    let port = server.port;

    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.handshake().await;

        let query = conn.read_packet().await;
        assert_eq!(query.tp, Proto::ReqQuery.as_u8());
        conn.write_packet(query.pid, Proto::ResData, &Value::from("hello")).await;
    });

    let client = Client::connect(test_config(&[port])).await.expect("connect");
    let result = client.query("noop", Some("@t"), None, Value::Nil).await.expect("query");
    assert_eq!(result, Value::from("hello"));
}
