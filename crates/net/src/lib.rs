//! Outpost Network Library
//!
//! Client side of a persistent session with a single game server.
//!
//! # Architecture
//!
//! - **Transport**: opaque message channel (WebSocket implementation included)
//! - **PacketProcessor**: packet registry and cross-thread pending queue
//! - **Connection**: reply handle bound to one transport generation
//! - **ClientSession**: connect / handshake / disconnect / reconnect lifecycle
//!
//! # Usage
//!
//! ```ignore
//! let processor = Arc::new(PacketProcessor::new());
//! processor.register::<ChatMessage, _>(|chat, _conn| {
//!     println!("{}: {}", chat.sender, chat.content);
//!     Ok(())
//! });
//!
//! let session = ClientSession::new(context, SessionOptions::default());
//! session.connect("127.0.0.1", 8000)?;
//!
//! // Consumer loop
//! loop {
//!     session.tick();
//!     dispatch_queue.run_pending();
//! }
//! ```

pub mod connection;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod processor;
pub mod protocol;
pub mod session;
pub mod transport;

pub use connection::Connection;
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use processor::PacketProcessor;
pub use protocol::{
    ChatMessage, HandshakeRequest, HandshakeResponse, Packet, Ping, Pong, StatusCode,
};
pub use session::{
    ClientSession, SessionContext, SessionOptions, SessionState, DISCONNECT_REASON,
};
pub use transport::{
    Transport, TransportFactory, TransportHandler, WsTransport, WsTransportFactory,
};

/// Default server port
pub const DEFAULT_PORT: u16 = 8000;
