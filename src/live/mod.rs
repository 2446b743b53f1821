//! The live dialogue: wire protocol, transports and the session lifecycle.

pub mod link;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod websocket;
