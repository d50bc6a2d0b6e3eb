//! World-state collaborator
//!
//! The session only needs a narrow view of the consumer's world: whether
//! a session is active, and hooks to initialize, clear and leave it.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Consumer-side world state as seen by the client session
pub trait World: Send + Sync {
    /// One-time setup before a connection attempt
    fn initialize(&self);

    /// True once the client has joined an active world
    fn is_active_session(&self) -> bool;

    /// Drop all simulated/derived state (before a reconnect)
    fn clear(&self);

    /// Whether the local player is the authority (host) of the world
    fn set_authoritative(&self, authoritative: bool);

    /// Leave the world permanently (the "quit" choice after a lost connection)
    fn leave_session(&self);
}

/// Thread-safe world state used by the console client
#[derive(Debug, Default)]
pub struct SimulatedWorld {
    initialized: AtomicBool,
    active: AtomicBool,
    authoritative: AtomicBool,
    left: AtomicBool,
    clear_count: AtomicU32,
}

impl SimulatedWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the world as joined (set by the handshake response handler)
    pub fn set_session_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative.load(Ordering::SeqCst)
    }

    /// True once [`World::leave_session`] was called
    pub fn has_left(&self) -> bool {
        self.left.load(Ordering::SeqCst)
    }

    /// How many times the world was cleared
    pub fn clear_count(&self) -> u32 {
        self.clear_count.load(Ordering::SeqCst)
    }
}

impl World for SimulatedWorld {
    fn initialize(&self) {
        self.initialized.store(true, Ordering::SeqCst);
        self.left.store(false, Ordering::SeqCst);
    }

    fn is_active_session(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.clear_count.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("World state cleared");
    }

    fn set_authoritative(&self, authoritative: bool) {
        self.authoritative.store(authoritative, Ordering::SeqCst);
    }

    fn leave_session(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.left.store(true, Ordering::SeqCst);
        tracing::info!("Left the world");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_deactivates_and_counts() {
        let world = SimulatedWorld::new();
        world.set_session_active(true);
        assert!(world.is_active_session());

        world.clear();
        assert!(!world.is_active_session());
        assert_eq!(world.clear_count(), 1);
    }

    #[test]
    fn test_leave_then_initialize() {
        let world = SimulatedWorld::new();
        world.set_session_active(true);
        world.leave_session();
        assert!(world.has_left());
        assert!(!world.is_active_session());

        world.initialize();
        assert!(world.is_initialized());
        assert!(!world.has_left());
    }
}
