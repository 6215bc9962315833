// quayside-api: push-channel wire layer (transport abstraction + WebSocket client)

pub mod error;
pub mod transport;
pub mod websocket;
pub mod wire;

pub use error::Error;
pub use transport::{Transport, TransportEvent};
pub use websocket::WsTransport;
pub use wire::KeepalivePing;
