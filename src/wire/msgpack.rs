// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! MessagePack (un)packing helpers used by the Frame Codec.
//!
//! Byte payloads MUST be encoded with MessagePack's `bin` type, never
//! `str` (§4.A) -- `rmpv::Value::Binary` takes care of that distinction,
//! unlike a plain `String`/`&str` encode which would always produce `str`.

use rmpv::Value;

use crate::error::{ProtocolError, Result};

/// Pack a `Value` into MessagePack bytes. An empty payload is represented
/// on the wire as zero bytes, not as a packed `nil` (§4.A: "when `length
/// == 0`, payload is absent").
pub fn pack(value: &Value) -> Result<Vec<u8>> {
    if matches!(value, Value::Nil) {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    rmpv::encode::write_value(&mut out, value)
        .map_err(|e| ProtocolError::Framing(format!("msgpack encode failed: {e}")))?;
    Ok(out)
}

/// Unpack MessagePack bytes into a `Value`. An empty slice decodes as
/// `Value::Nil` ("no data").
pub fn unpack(bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Nil);
    }
    let mut cur = bytes;
    rmpv::decode::read_value(&mut cur)
        .map_err(|e| ProtocolError::Framing(format!("msgpack decode failed: {e}")))
}

/// Build a `Value::Binary` payload, so the `bin` type is used on the wire
/// rather than `str`.
pub fn binary(bytes: impl Into<Vec<u8>>) -> Value {
    Value::Binary(bytes.into())
}
