//! Outbound connection handle
//!
//! A [`Connection`] is the "who to reply to" address passed to packet
//! handlers. It holds only weak references to its transport and to the
//! packet processor it feeds, so a handle that outlives either quietly
//! stops sending and never keeps them alive.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::processor::PacketProcessor;
use crate::protocol::Packet;
use crate::transport::Transport;

/// Handle to one transport generation
#[derive(Clone)]
pub struct Connection {
    id: Uuid,
    generation: u64,
    transport: Weak<dyn Transport>,
    processor: Weak<PacketProcessor>,
}

impl Connection {
    pub fn new(
        transport: &Arc<dyn Transport>,
        processor: &Arc<PacketProcessor>,
        generation: u64,
    ) -> Self {
        Self::from_weak(Arc::downgrade(transport), Arc::downgrade(processor), generation)
    }

    /// Build from already weak references
    pub fn from_weak(
        transport: Weak<dyn Transport>,
        processor: Weak<PacketProcessor>,
        generation: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            transport,
            processor,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while the transport this handle was minted from still exists
    pub fn is_alive(&self) -> bool {
        self.transport.strong_count() > 0
    }

    /// Serialize a packet through the processor and write it to the transport
    pub fn send_packet<P: Packet>(&self, packet: &P) -> Result<()> {
        let Some(processor) = self.processor.upgrade() else {
            debug!(kind = P::KIND, "Packet processor gone, packet dropped");
            return Ok(());
        };
        let payload = processor.write(packet)?;

        match self.transport.upgrade() {
            Some(transport) => {
                debug!(kind = P::KIND, bytes = payload.len(), "Sending packet");
                transport.send(payload);
            }
            None => {
                debug!(
                    kind = P::KIND,
                    generation = self.generation,
                    "Transport gone, packet dropped"
                );
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("alive", &self.is_alive())
            .finish()
    }
}
