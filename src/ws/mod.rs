//! Live message relay over WebSocket.
//!
//! Each connection authenticates at handshake time, registers itself in
//! the in-process connection registry, and may then submit send requests.
//! A persisted message is pushed to every live connection of both
//! participants; anything missed live is recovered through the history
//! API, never replayed over the socket.

mod handler;
mod registry;
mod types;

pub use handler::ws_handler;
pub use registry::{ConnectionRegistry, WsSender};
pub use types::{ClientCommand, SendFailureKind, ServerEvent};
