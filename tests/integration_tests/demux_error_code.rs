// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rmpv::Value;
use roomdb_client_rs::{client::Client, error::ProtocolError, wire::Proto};

use super::common::{MockServer, test_config};

#[tokio::test]
async fn error_response_maps_forbidden_code_to_the_forbidden_variant() {
    let server = MockServer::bind().await;
    let port = server.port;

    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.handshake().await;

        let query = conn.read_packet().await;
        assert_eq!(query.tp, Proto::ReqQuery.as_u8());
        let errdata = Value::Map(vec![
            (Value::from("error_code"), Value::from(-55)),
            (Value::from("error_msg"), Value::from("nope")),
        ]);
        conn.write_packet(query.pid, Proto::ResError, &errdata).await;
    });

    let client = Client::connect(test_config(&[port])).await.expect("connect");
    let result = client.query("forbidden_thing", Some("@t"), None, Value::Nil).await;

    match result {
        Err(ProtocolError::Forbidden(msg)) => assert_eq!(msg, "nope"),
        other => panic!("expected Forbidden(\"nope\"), got {other:?}"),
    }
}
