// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rmpv::Value;
use roomdb_client_rs::{client::Client, wire::{Proto, msgpack}};

use super::common::{MockServer, test_config};

#[tokio::test]
async fn create_collection_sends_code_with_name_in_the_vars_map() {
    let server = MockServer::bind().await;
    let port = server.port;

    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.handshake().await;

        let query = conn.read_packet().await;
        assert_eq!(query.tp, Proto::ReqQuery.as_u8());
        let payload = msgpack::unpack(&query.payload).expect("decode query payload");
        let items = payload.as_array().expect("query body is an array");
        assert_eq!(items[0], Value::from("@t"));
        assert_eq!(items[1], Value::from("new_collection(name)"));
        let vars = items[2].as_map().expect("vars map present");
        assert_eq!(
            vars.iter().find(|(k, _)| k.as_str() == Some("name")).map(|(_, v)| v.clone()),
            Some(Value::from("my_collection"))
        );

        conn.write_packet(query.pid, Proto::ResOk, &Value::Nil).await;
    });

    let client = Client::connect(test_config(&[port])).await.expect("connect");
    client.create_collection("my_collection").await.expect("create_collection");
}

#[tokio::test]
async fn node_info_defaults_to_the_node_scope() {
    let server = MockServer::bind().await;
    let port = server.port;

    tokio::spawn(async move {
        let mut conn = server.accept().await;
        conn.handshake().await;

        let query = conn.read_packet().await;
        assert_eq!(query.tp, Proto::ReqQuery.as_u8());
        let payload = msgpack::unpack(&query.payload).expect("decode query payload");
        let items = payload.as_array().expect("query body is an array");
        assert_eq!(items[0], Value::from("@n"));
        assert_eq!(items[1], Value::from("node_info()"));
        assert_eq!(items.len(), 2, "empty vars map must be omitted from the body");

        conn.write_packet(query.pid, Proto::ResData, &Value::from("ok")).await;
    });

    let client = Client::connect(test_config(&[port])).await.expect("connect");
    let result = client.node_info(None).await.expect("node_info");
    assert_eq!(result, Value::from("ok"));
}
