//! Transport Adapter: byte-level connections to a node, abstracted
//! behind a single capability set shared by the raw-TCP and WebSocket
//! implementations.

pub mod common;
pub mod tcp;
pub mod tls;
pub mod ws;

pub use common::{LostCallback, PacketCallback, Transport};
pub use tcp::TcpTransport;
pub use tls::TlsMode;
pub use ws::WsTransport;
