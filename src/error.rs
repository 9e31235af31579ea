// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed error taxonomy: maps the server's wire `error_code` values onto
//! Rust error variants, plus the connector-local failure modes that never
//! reach the wire (I/O, framing, timeouts, cancellation).

use rmpv::Value;
use thiserror::Error;

/// Errors surfaced to callers of the public client surface.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("cancelled")]
    Cancelled,
    #[error("operation error: {0}")]
    OperationError(String),
    #[error("wrong number of arguments: {0}")]
    NumArguments(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("value error: {0}")]
    ValueError(String),
    #[error("overflow: {0}")]
    Overflow(String),
    #[error("division by zero: {0}")]
    ZeroDivision(String),
    #[error("max quota reached: {0}")]
    MaxQuota(String),
    #[error("authentication failed: {0}")]
    AuthError(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("lookup error: {0}")]
    LookupError(String),
    #[error("bad data: {0}")]
    BadData(String),
    #[error("syntax error: {0}")]
    SyntaxError(String),
    #[error("node error: {0}")]
    NodeError(String),
    #[error("assertion error: {0}")]
    AssertionError(String),
    #[error("result too large: {0}")]
    ResultTooLarge(String),
    #[error("request timed out: {0}")]
    RequestTimeout(String),
    #[error("request cancelled by server: {0}")]
    RequestCancel(String),
    #[error("write error: {0}")]
    WriteUV(String),
    #[error("out of memory: {0}")]
    MemoryError(String),
    #[error("internal error: {0}")]
    InternalError(String),
    /// Unknown negative error code; the full server-provided map is kept.
    #[error("custom error (code {code}): {msg}")]
    CustomError {
        code: i64,
        msg: String,
        raw: Value,
    },

    /// Local failure modes that never originate from the wire.
    #[error("i/o error: {0}")]
    Io(String),
    #[error("framing error: {0}")]
    Framing(String),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("not connected")]
    NotConnected,
    #[error("internal connector error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// Maps a wire `error_code` + `error_msg` + the raw server error map to
    /// a typed error. Unknown negative codes fall back to `CustomError`,
    /// preserving the raw payload.
    pub fn from_wire(code: i64, msg: String, raw: Value) -> Self {
        match code {
            -64 => ProtocolError::Cancelled,
            -63 => ProtocolError::OperationError(msg),
            -62 => ProtocolError::NumArguments(msg),
            -61 => ProtocolError::TypeError(msg),
            -60 => ProtocolError::ValueError(msg),
            -59 => ProtocolError::Overflow(msg),
            -58 => ProtocolError::ZeroDivision(msg),
            -57 => ProtocolError::MaxQuota(msg),
            -56 => ProtocolError::AuthError(msg),
            -55 => ProtocolError::Forbidden(msg),
            -54 => ProtocolError::LookupError(msg),
            -53 => ProtocolError::BadData(msg),
            -52 => ProtocolError::SyntaxError(msg),
            -51 => ProtocolError::NodeError(msg),
            -50 => ProtocolError::AssertionError(msg),
            -6 => ProtocolError::ResultTooLarge(msg),
            -5 => ProtocolError::RequestTimeout(msg),
            -4 => ProtocolError::RequestCancel(msg),
            -3 => ProtocolError::WriteUV(msg),
            -2 => ProtocolError::MemoryError(msg),
            -1 => ProtocolError::InternalError(msg),
            other => ProtocolError::CustomError {
                code: other,
                msg,
                raw,
            },
        }
    }

    /// Whether this error should trigger an `ensure`-write-policy retry:
    /// connection-scoped failures, not request-scoped ones.
    pub fn is_retryable_write_failure(&self) -> bool {
        matches!(
            self,
            ProtocolError::NodeError(_)
                | ProtocolError::AuthError(_)
                | ProtocolError::Cancelled
                | ProtocolError::NotConnected
        )
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
