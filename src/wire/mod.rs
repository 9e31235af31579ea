//! Frame Codec: wire header framing plus MessagePack (un)packing.

pub mod frame;
pub mod msgpack;
pub mod opcode;

pub use frame::{HEADER_LEN, Packet};
pub use opcode::Proto;
