// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Raw-TCP transport, optionally wrapped in TLS. Parses zero or
//! more length-prefixed packets out of a running byte buffer and hands
//! each to a callback; on a framing or MessagePack decode failure it
//! resynchronizes by clearing the buffer and waiting for fresh bytes.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream,
    sync::Mutex,
    time::timeout,
};
use tokio_rustls::{TlsConnector, client::TlsStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    diagnostics::PayloadDumpSink,
    error::{ProtocolError, Result},
    transport::{
        common::{LostCallback, PacketCallback, Transport, io_with_timeout},
        tls::TlsMode,
    },
    wire::{Packet, msgpack},
};

/// Initial scratch-buffer capacity; grows as needed.
const SCRATCH_CAPACITY: usize = 4096;

pub struct TcpTransport<S> {
    writer: Mutex<WriteHalf<S>>,
    cancel: CancellationToken,
    closed: CancellationToken,
    read_timeout: Duration,
}

impl<S> std::fmt::Debug for TcpTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport").finish()
    }
}

impl TcpTransport<TcpStream> {
    /// Connect a plain (non-TLS) TCP transport.
    pub async fn connect(
        addr: (&str, u16),
        connect_timeout: Duration,
        io_timeout: Duration,
        on_packet: PacketCallback,
        on_lost: LostCallback,
        dump_sink: Option<Arc<dyn PayloadDumpSink>>,
    ) -> Result<Arc<Self>> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::Timeout(connect_timeout))??;
        stream.set_nodelay(true)?;
        Self::from_stream(stream, io_timeout, on_packet, on_lost, dump_sink)
    }
}

impl TcpTransport<TlsStream<TcpStream>> {
    /// Connect a TLS-wrapped TCP transport.
    pub async fn connect_tls(
        addr: (&str, u16),
        server_name: rustls_pki_types::ServerName<'static>,
        tls: TlsMode,
        connect_timeout: Duration,
        io_timeout: Duration,
        on_packet: PacketCallback,
        on_lost: LostCallback,
        dump_sink: Option<Arc<dyn PayloadDumpSink>>,
    ) -> Result<Arc<Self>> {
        let cfg = tls.resolve()?.ok_or_else(|| {
            ProtocolError::Internal("TLS requested with TlsMode::None".into())
        })?;
        let connector = TlsConnector::from(cfg);
        let tcp = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::Timeout(connect_timeout))??;
        tcp.set_nodelay(true)?;
        let stream = timeout(connect_timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| ProtocolError::Timeout(connect_timeout))?
            .map_err(std::io::Error::other)?;
        Self::from_stream(stream, io_timeout, on_packet, on_lost, dump_sink)
    }
}

impl<S> TcpTransport<S>
where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    fn from_stream(
        stream: S,
        io_timeout: Duration,
        on_packet: PacketCallback,
        on_lost: LostCallback,
        dump_sink: Option<Arc<dyn PayloadDumpSink>>,
    ) -> Result<Arc<Self>> {
        let (read_half, write_half) = tokio::io::split(stream);
        let transport = Arc::new(Self {
            writer: Mutex::new(write_half),
            cancel: CancellationToken::new(),
            closed: CancellationToken::new(),
            read_timeout: io_timeout,
        });

        let read_task = Arc::clone(&transport);
        tokio::spawn(async move {
            read_task
                .read_loop(read_half, on_packet, dump_sink)
                .await;
            on_lost();
            read_task.closed.cancel();
        });

        Ok(transport)
    }

    async fn read_loop(
        &self,
        mut read_half: ReadHalf<S>,
        on_packet: PacketCallback,
        dump_sink: Option<Arc<dyn PayloadDumpSink>>,
    ) {
        let mut scratch = BytesMut::with_capacity(SCRATCH_CAPACITY);
        let mut chunk = [0u8; 4096];

        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let n = match io_with_timeout(
                "tcp read",
                read_half.read(&mut chunk),
                self.read_timeout,
                &self.cancel,
            )
            .await
            {
                Ok(0) => {
                    debug!("tcp transport: peer closed connection");
                    return;
                },
                Ok(n) => n,
                Err(ProtocolError::Cancelled) => return,
                Err(e) => {
                    warn!("tcp transport: read failed: {e}");
                    return;
                },
            };
            scratch.extend_from_slice(&chunk[..n]);

            loop {
                match Packet::try_parse(&mut scratch) {
                    Ok(Some(packet)) => {
                        if let Err(e) = msgpack::unpack(&packet.payload) {
                            warn!("tcp transport: malformed payload, resyncing: {e}");
                            if let Some(sink) = &dump_sink {
                                sink.dump(&packet.payload);
                            }
                            scratch.clear();
                            break;
                        }
                        on_packet(packet);
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("tcp transport: framing error, resyncing: {e}");
                        scratch.clear();
                        break;
                    },
                }
            }
        }
    }
}

#[async_trait]
impl<S> Transport for TcpTransport<S>
where S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static
{
    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ProtocolError::Cancelled);
        }
        let mut w = self.writer.lock().await;
        io_with_timeout(
            "tcp write",
            w.write_all(bytes),
            self.read_timeout,
            &self.cancel,
        )
        .await
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
