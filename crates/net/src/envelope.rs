//! Packet envelope encoding/decoding
//!
//! Wire format: one JSON object per transport message,
//! `{"kind": "<packet kind>", "body": <packet>}`.
//! Maximum payload size: 1MB (sanity limit)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::Packet;

/// Maximum allowed payload size (1MB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

#[derive(Serialize)]
struct OutgoingEnvelope<'a, P> {
    kind: &'a str,
    body: &'a P,
}

/// A decoded envelope whose body has not been interpreted yet
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub kind: String,
    pub body: Value,
}

impl Envelope {
    /// Interpret the body as packet `P`
    pub fn into_packet<P: Packet>(self) -> Result<P> {
        if self.kind != P::KIND {
            return Err(Error::Protocol(format!(
                "Expected '{}' packet, got '{}'",
                P::KIND,
                self.kind
            )));
        }
        Ok(serde_json::from_value(self.body)?)
    }
}

/// Encode a packet into envelope bytes
pub fn encode_packet<P: Packet>(packet: &P) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(&OutgoingEnvelope {
        kind: P::KIND,
        body: packet,
    })?;

    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::Protocol(format!(
            "Packet too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    Ok(payload)
}

/// Decode raw transport bytes into an envelope
pub fn decode_envelope(payload: &[u8]) -> Result<Envelope> {
    // Sanity check
    if payload.is_empty() {
        return Err(Error::Protocol("Empty payload".into()));
    }
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    serde_json::from_slice(payload).map_err(|e| Error::Protocol(format!("Invalid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Ping, Pong};

    #[test]
    fn test_envelope_shape() {
        let bytes = encode_packet(&Ping { nonce: 7 }).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["kind"], "ping");
        assert_eq!(value["body"]["nonce"], 7);

        let envelope = decode_envelope(&bytes).unwrap();
        assert_eq!(envelope.kind, "ping");
        assert_eq!(envelope.into_packet::<Ping>().unwrap(), Ping { nonce: 7 });
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let bytes = encode_packet(&Ping { nonce: 1 }).unwrap();
        let envelope = decode_envelope(&bytes).unwrap();
        assert!(matches!(
            envelope.into_packet::<Pong>(),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(decode_envelope(&[]).is_err());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![b' '; MAX_PAYLOAD_SIZE + 1];
        assert!(decode_envelope(&payload).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            decode_envelope(b"not json"),
            Err(Error::Protocol(_))
        ));
        assert!(decode_envelope(br#"{"body": {}}"#).is_err());
    }
}
