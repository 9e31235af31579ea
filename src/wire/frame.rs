// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Frame Codec (§4.A): the 8-byte little-endian header plus a MessagePack
//! body. This is the lowest layer of the wire protocol; it knows nothing
//! about pids being "pending" or packet types being "events" vs
//! "responses" -- that's the Multiplexer's and Event Router's job.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Length of the Basic Header: `u32 length | u16 pid | u8 type | u8 check`.
pub const HEADER_LEN: usize = 8;

/// A fully framed wire packet: header fields plus its raw MessagePack
/// payload bytes.
#[derive(Debug, Clone)]
pub struct Packet {
    pub pid: u16,
    pub tp: u8,
    pub payload: Bytes,
}

impl Packet {
    /// Encode `payload` (already-packed MessagePack bytes, or empty) into
    /// header + body bytes ready to write to the transport.
    pub fn encode(pid: u16, tp: u8, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u32_le(payload.len() as u32);
        buf.put_u16_le(pid);
        buf.put_u8(tp);
        buf.put_u8(tp ^ 0xFF);
        buf.extend_from_slice(payload);
        buf
    }

    /// Parse an 8-byte header. Returns `(length, pid, tp)`. Validates the
    /// check byte invariant (§3): `check == tp XOR 0xFF`.
    pub fn decode_header(hdr: &[u8]) -> Result<(u32, u16, u8)> {
        if hdr.len() < HEADER_LEN {
            return Err(ProtocolError::Framing(format!(
                "short header: {} bytes",
                hdr.len()
            )));
        }
        let mut cur = hdr;
        let length = cur.get_u32_le();
        let pid = cur.get_u16_le();
        let tp = cur.get_u8();
        let check = cur.get_u8();
        if check != (tp ^ 0xFF) {
            return Err(ProtocolError::Framing(format!(
                "bad check byte: type={tp:#04x} check={check:#04x}"
            )));
        }
        Ok((length, pid, tp))
    }

    /// Attempt to pull one full packet off the front of `buf`. Returns
    /// `None` if not enough bytes have accumulated yet (§4.C parsing
    /// rule). On a framing error the caller is expected to resynchronize
    /// (TCP) or drop the packet (WS).
    pub fn try_parse(buf: &mut BytesMut) -> Result<Option<Packet>> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let (length, pid, tp) = Self::decode_header(&buf[..HEADER_LEN])?;
        let total = HEADER_LEN + length as usize;
        if buf.len() < total {
            return Ok(None);
        }
        let mut frame = buf.split_to(total);
        let payload = frame.split_off(HEADER_LEN).freeze();
        Ok(Some(Packet { pid, tp, payload }))
    }
}
