// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use rmpv::Value;
use roomdb_client_rs::{client::Client, error::ProtocolError, wire::Proto};

use super::common::{MockServer, test_config};

#[tokio::test]
async fn a_request_with_no_reply_fails_with_a_timeout_error() {
    let server = MockServer::bind().await;
    let port = server.port;

    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.handshake().await;

        // Never answers the query, then replies late to show the reply is
        // simply discarded rather than crashing anything.
        let query = conn.read_packet().await;
        assert_eq!(query.tp, Proto::ReqQuery.as_u8());
        tokio::time::sleep(Duration::from_millis(300)).await;
        conn.write_packet(query.pid, Proto::ResData, &Value::from("too late")).await;
    });

    let client = Client::connect(test_config(&[port])).await.expect("connect");
    let result = client
        .query("slow", Some("@t"), Some(Duration::from_millis(100)), Value::Nil)
        .await;

    assert!(matches!(result, Err(ProtocolError::Timeout(_))), "got {result:?}");
}
