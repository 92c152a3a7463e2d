//! Session registry and WebSocket handling for the notification namespace.

mod registry;
mod websocket;

pub(crate) use registry::SessionRegistry;
pub use registry::SessionId;
pub(crate) use websocket::ws_handler;
