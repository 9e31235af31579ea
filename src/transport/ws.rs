// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! WebSocket transport. Each binary WS message carries exactly one
//! wire packet, so unlike the raw-TCP transport there is no running
//! byte buffer to resynchronize: a malformed message is logged and
//! dropped, and the connection otherwise stays up.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::{net::TcpStream, sync::Mutex, time::timeout};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{Message, protocol::WebSocketConfig},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    diagnostics::PayloadDumpSink,
    error::{ProtocolError, Result},
    transport::common::{LostCallback, PacketCallback, Transport},
    wire::{Packet, msgpack},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Matches the server's own inbound message cap, so a single oversized
/// push or response is rejected locally instead of buffered without
/// bound.
const WEBSOCKET_MAX_SIZE: usize = 1 << 24;

pub struct WsTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    cancel: CancellationToken,
    closed: CancellationToken,
    write_timeout: Duration,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").finish()
    }
}

impl WsTransport {
    /// Connect to a `ws://` or `wss://` endpoint. TLS (when the URL
    /// scheme is `wss`) is handled by `tokio-tungstenite`'s bundled
    /// rustls connector using native trust roots.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        write_timeout: Duration,
        on_packet: PacketCallback,
        on_lost: LostCallback,
        dump_sink: Option<Arc<dyn PayloadDumpSink>>,
    ) -> Result<Arc<Self>> {
        let ws_config = WebSocketConfig { max_message_size: Some(WEBSOCKET_MAX_SIZE), ..Default::default() };
        let (stream, _response) = timeout(
            connect_timeout,
            connect_async_with_config(url, Some(ws_config), false),
        )
        .await
        .map_err(|_| ProtocolError::Timeout(connect_timeout))?
        .map_err(|e| ProtocolError::Io(format!("websocket connect failed: {e}")))?;

        let (sink, mut source) = stream.split();
        let transport = Arc::new(Self {
            sink: Mutex::new(sink),
            cancel: CancellationToken::new(),
            closed: CancellationToken::new(),
            write_timeout,
        });

        let read_task = Arc::clone(&transport);
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = read_task.cancel.cancelled() => break,
                    msg = source.next() => msg,
                };
                match next {
                    Some(Ok(Message::Binary(bytes))) => {
                        read_task.handle_message(&bytes, &on_packet, &dump_sink);
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("websocket transport: peer closed connection");
                        break;
                    },
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("websocket transport: read failed: {e}");
                        break;
                    },
                }
            }
            on_lost();
            read_task.cancel.cancel();
            read_task.closed.cancel();
        });

        Ok(transport)
    }

    fn handle_message(
        &self,
        bytes: &[u8],
        on_packet: &PacketCallback,
        dump_sink: &Option<Arc<dyn PayloadDumpSink>>,
    ) {
        let mut buf = bytes::BytesMut::from(bytes);
        match Packet::try_parse(&mut buf) {
            Ok(Some(packet)) => match msgpack::unpack(&packet.payload) {
                Ok(_) => on_packet(packet),
                Err(e) => {
                    warn!("websocket transport: malformed payload, dropping: {e}");
                    if let Some(sink) = dump_sink {
                        sink.dump(&packet.payload);
                    }
                },
            },
            Ok(None) => {
                warn!("websocket transport: message shorter than one full packet");
            },
            Err(e) => {
                warn!("websocket transport: framing error, dropping message: {e}");
            },
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ProtocolError::Cancelled);
        }
        let mut sink = self.sink.lock().await;
        timeout(self.write_timeout, sink.send(Message::Binary(bytes.to_vec())))
            .await
            .map_err(|_| ProtocolError::Timeout(self.write_timeout))?
            .map_err(|e| ProtocolError::Io(format!("websocket write failed: {e}")))
    }

    fn close(&self) {
        self.cancel.cancel();
    }

    fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn wait_closed(&self) {
        self.closed.cancelled().await;
    }
}
