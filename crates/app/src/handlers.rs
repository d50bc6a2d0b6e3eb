//! Packet handlers for the console client

use std::sync::Arc;

use outpost_core::SimulatedWorld;
use outpost_net::{ChatMessage, HandshakeResponse, PacketProcessor, Ping, Pong};
use tracing::{debug, info, warn};

/// Wire every server packet the client understands
pub fn register(processor: &PacketProcessor, world: Arc<SimulatedWorld>) {
    processor.register::<HandshakeResponse, _>(move |response, _| {
        if response.accepted {
            info!(server = %response.server_name, "Joined server");
            println!("Joined {}", response.server_name);
        } else {
            let reason = response.reason.unwrap_or_else(|| "no reason given".into());
            warn!(server = %response.server_name, reason = %reason, "Handshake rejected");
            println!("Rejected by {}: {}", response.server_name, reason);
        }
        world.set_session_active(response.accepted);
        Ok(())
    });

    processor.register::<ChatMessage, _>(|chat, _| {
        println!(
            "[{}] {}: {}",
            chat.sent_at.format("%H:%M:%S"),
            chat.sender,
            chat.content
        );
        Ok(())
    });

    processor.register::<Ping, _>(|ping, conn| conn.send_packet(&Pong { nonce: ping.nonce }));

    processor.register::<Pong, _>(|pong, _| {
        debug!(nonce = pong.nonce, "Pong");
        Ok(())
    });
}
