// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Which byte-level transport to use for a node connection.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    #[serde(rename = "tcp", alias = "TCP")]
    Tcp,
    #[serde(rename = "websocket", alias = "ws", alias = "WebSocket")]
    WebSocket,
}
impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Tcp => "tcp",
            TransportKind::WebSocket => "websocket",
        })
    }
}

/// How TLS should be configured for a node connection, as read from
/// configuration. Resolved into a concrete [`crate::transport::TlsMode`]
/// at connect time.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsSetting {
    #[serde(rename = "none", alias = "None", alias = "NONE")]
    None,
    #[serde(rename = "default", alias = "Default", alias = "DEFAULT")]
    Default,
}
impl fmt::Display for TlsSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TlsSetting::None => "none",
            TlsSetting::Default => "default",
        })
    }
}

/// Behavior when a write-style request is issued while the client is not
/// in the `Ready` state.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Fail immediately with `NodeError`/`NotConnected`.
    #[default]
    #[serde(rename = "strict", alias = "Strict", alias = "STRICT")]
    Strict,
    /// Wait for a reconnect and retry once, if the failure looks
    /// transient (see [`crate::error::ProtocolError::is_retryable_write_failure`]).
    #[serde(rename = "ensure", alias = "Ensure", alias = "ENSURE")]
    Ensure,
}
