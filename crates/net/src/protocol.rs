//! Network protocol packet types
//!
//! Every packet is JSON-serialized inside an envelope (see `envelope`) and
//! sent as one binary transport message.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version sent in the handshake
pub const PROTOCOL_VERSION: u32 = 1;

/// A message type the packet processor can route
pub trait Packet: Serialize + DeserializeOwned + Send + 'static {
    /// Registry key, written as the envelope `kind`
    const KIND: &'static str;
}

/// Close status codes
///
/// `ClientRequestedDisconnect` lives in the private-use range (4000-4999) so
/// it can never collide with a code produced by the server, the protocol
/// layer or the local transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StatusCode {
    Normal = 1000,
    GoingAway = 1001,
    ProtocolError = 1002,
    Abnormal = 1006,
    ServerError = 1011,
    ClientRequestedDisconnect = 4000,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Map a raw close code; unknown codes yield `None`
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::ProtocolError),
            1006 => Some(Self::Abnormal),
            1011 => Some(Self::ServerError),
            4000 => Some(Self::ClientRequestedDisconnect),
            _ => None,
        }
    }

    /// True only for the locally initiated, intentional close
    pub fn is_client_requested(code: u16) -> bool {
        code == Self::ClientRequestedDisconnect.code()
    }
}

/// First packet sent on every new connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub protocol_version: u32,
    pub client_id: Uuid,
    pub username: String,
}

impl Packet for HandshakeRequest {
    const KIND: &'static str = "handshake_request";
}

/// Server answer to the handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub accepted: bool,
    pub server_name: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Packet for HandshakeResponse {
    const KIND: &'static str = "handshake_response";
}

/// Keepalive request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub nonce: u64,
}

impl Packet for Ping {
    const KIND: &'static str = "ping";
}

/// Keepalive response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub nonce: u64,
}

impl Packet for Pong {
    const KIND: &'static str = "pong";
}

/// A chat line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl Packet for ChatMessage {
    const KIND: &'static str = "chat_message";
}
