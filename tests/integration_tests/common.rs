// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use bytes::BytesMut;
use roomdb_client_rs::{
    cfg::{
        config::{
            AuthConfig, BackoffConfig, Config, NodeConfig, PoolConfig, RuntimeConfig,
            TimeoutConfig,
        },
        enums::{TlsSetting, TransportKind, WritePolicy},
    },
    wire::{Packet, Proto, msgpack},
};
use rmpv::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// A loopback server the tests drive by hand, one frame at a time.
pub struct MockServer {
    listener: TcpListener,
    pub port: u16,
}

impl MockServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let port = listener.local_addr().expect("local_addr").port();
        Self { listener, port }
    }

    pub async fn accept(&self) -> Conn {
        let (stream, _) = self.listener.accept().await.expect("accept");
        Conn {
            stream,
            buf: BytesMut::with_capacity(4096),
        }
    }
}

/// One accepted connection, with the scratch buffer carried across reads
/// so bytes left over after parsing one frame aren't dropped before the
/// next `read_packet` call -- several requests issued back-to-back by the
/// client can legitimately land in the same `read()`.
pub struct Conn {
    stream: TcpStream,
    buf: BytesMut,
}

impl Conn {
    pub async fn read_packet(&mut self) -> Packet {
        loop {
            if let Some(packet) = Packet::try_parse(&mut self.buf).expect("well-formed frame") {
                return packet;
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.expect("read from client");
            assert!(n > 0, "client closed the connection unexpectedly");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn write_packet(&mut self, pid: u16, tp: Proto, value: &Value) {
        let payload = msgpack::pack(value).expect("pack test payload");
        let framed = Packet::encode(pid, tp.as_u8(), &payload);
        self.stream.write_all(&framed).await.expect("write to client");
    }

    /// Reads the client's PING and AUTH requests and answers both with an
    /// empty `ResOk`, the sequence every `try_connect_node` handshake
    /// starts with regardless of scenario.
    pub async fn handshake(&mut self) {
        let ping = self.read_packet().await;
        assert_eq!(ping.tp, Proto::ReqPing.as_u8());
        self.write_packet(ping.pid, Proto::ResOk, &Value::Nil).await;

        let auth = self.read_packet().await;
        assert_eq!(auth.tp, Proto::ReqAuth.as_u8());
        self.write_packet(auth.pid, Proto::ResOk, &Value::Nil).await;
    }
}

/// A node-pool config pointed at one or more loopback mock servers, with
/// backoff and timeouts tuned down so reconnect scenarios run in well
/// under a second instead of the production minute-scale schedule.
pub fn test_config(ports: &[u16]) -> Config {
    let nodes = ports
        .iter()
        .map(|&port| NodeConfig {
            host: "127.0.0.1".to_string(),
            port,
            transport: TransportKind::Tcp,
            tls: TlsSetting::None,
        })
        .collect();

    Config {
        pool: PoolConfig {
            nodes,
            random_start: false,
        },
        auth: AuthConfig {
            token: None,
            username: Some("admin".to_string()),
            password: Some("pass".to_string()),
            default_scope: Some("@t".to_string()),
        },
        timeouts: TimeoutConfig {
            connect: Duration::from_millis(500),
            io: Duration::from_secs(5),
            auth: Duration::from_millis(500),
            request: None,
        },
        backoff: BackoffConfig {
            initial_wait: Duration::from_millis(20),
            max_wait: Duration::from_millis(100),
            initial_timeout: Duration::from_millis(200),
            max_timeout: Duration::from_millis(500),
        },
        runtime: RuntimeConfig {
            auto_reconnect: true,
            write_policy: WritePolicy::Strict,
            payload_dump_dir: None,
        },
    }
}
