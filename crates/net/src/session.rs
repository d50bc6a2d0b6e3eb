//! Client session: connection lifecycle and packet hand-off
//!
//! State machine: Idle → Connecting → Connected → Closing → Idle, with
//! Reconnecting re-entering Connecting after the old transport is torn
//! down.
//!
//! Transport callbacks run on the network context. They only touch the
//! session's own link state (under a short lock), push raw bytes into the
//! packet processor, or post tasks to the consumer [`Dispatcher`]. Handler
//! code runs exclusively from [`ClientSession::tick`].

use std::sync::{Arc, OnceLock, Weak};

use outpost_core::{Dispatcher, Prompt, PromptAction, PromptKind, Prompter, World};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::processor::PacketProcessor;
use crate::protocol::{HandshakeRequest, Packet, StatusCode, PROTOCOL_VERSION};
use crate::transport::{Transport, TransportFactory, TransportHandler};

/// Close reason sent with a client-requested disconnect
pub const DISCONNECT_REASON: &str = "Player left the game";

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    /// Close requested, waiting for the transport to report it
    Closing,
    /// Old transport torn down, about to connect again
    Reconnecting,
}

/// Identity sent in the handshake
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub client_id: Uuid,
    pub username: String,
    pub protocol_version: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_id: Uuid::new_v4(),
            username: "player".to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Collaborators the session is wired to
pub struct SessionContext {
    pub processor: Arc<PacketProcessor>,
    pub transports: Arc<dyn TransportFactory>,
    pub dispatcher: Dispatcher,
    pub world: Arc<dyn World>,
    pub prompter: Arc<dyn Prompter>,
}

/// State shared with transport callbacks
struct Link {
    state: SessionState,
    generation: u64,
    endpoint: Option<Endpoint>,
    transport: Option<Arc<dyn Transport>>,
    /// Present exactly while connected
    connection: Option<Connection>,
}

struct Inner {
    link: Mutex<Link>,
    processor: Arc<PacketProcessor>,
    transports: Arc<dyn TransportFactory>,
    dispatcher: Dispatcher,
    world: Arc<dyn World>,
    prompter: Arc<dyn Prompter>,
    options: SessionOptions,
}

/// The client half of a session with one server
pub struct ClientSession {
    inner: Arc<Inner>,
}

impl ClientSession {
    pub fn new(context: SessionContext, options: SessionOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                link: Mutex::new(Link {
                    state: SessionState::Idle,
                    generation: 0,
                    endpoint: None,
                    transport: None,
                    connection: None,
                }),
                processor: context.processor,
                transports: context.transports,
                dispatcher: context.dispatcher,
                world: context.world,
                prompter: context.prompter,
                options,
            }),
        }
    }

    /// Connect to `ws://{host}:{port}/socket`
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        self.connect_to(Endpoint::new(host, port))
    }

    /// Connect to an endpoint. Only allowed from `Idle` or `Reconnecting`;
    /// a live or pending connection is never replaced.
    pub fn connect_to(&self, endpoint: Endpoint) -> Result<()> {
        let transport = {
            let mut link = self.inner.link.lock();
            if !matches!(link.state, SessionState::Idle | SessionState::Reconnecting) {
                return Err(Error::InvalidState(link.state));
            }

            link.generation += 1;
            let generation = link.generation;

            let callbacks = Arc::new(SessionCallbacks {
                session: Arc::downgrade(&self.inner),
                generation,
                transport: OnceLock::new(),
                connection: OnceLock::new(),
            });
            let transport = self
                .inner
                .transports
                .create(&endpoint.to_url(), callbacks.clone());
            let _ = callbacks.transport.set(Arc::downgrade(&transport));

            info!(endpoint = %endpoint, generation = generation, "Connecting to server");

            link.endpoint = Some(endpoint);
            link.transport = Some(transport.clone());
            link.connection = None;
            link.state = SessionState::Connecting;
            transport
        };

        self.inner.world.initialize();
        self.inner.world.set_authoritative(false);

        transport.connect();
        Ok(())
    }

    /// Close the connection on purpose. No-op unless connecting or
    /// connected; completion is observed later through `on_close`.
    pub fn disconnect(&self) {
        let transport = {
            let mut link = self.inner.link.lock();
            if !matches!(
                link.state,
                SessionState::Connecting | SessionState::Connected
            ) {
                return;
            }
            link.connection = None;
            link.state = SessionState::Closing;
            link.transport.clone()
        };

        if let Some(transport) = transport {
            info!(url = %transport.url(), "Disconnecting from server");
            transport.close(
                StatusCode::ClientRequestedDisconnect.code(),
                DISCONNECT_REASON,
            );
        }
    }

    /// Clear the world, drop the current transport and connect again to
    /// the previous endpoint. A single attempt, no backoff.
    pub fn reconnect(&self) -> Result<()> {
        let endpoint = self
            .inner
            .link
            .lock()
            .endpoint
            .clone()
            .ok_or(Error::NoPreviousEndpoint)?;

        self.inner.world.clear();
        self.disconnect();

        {
            let mut link = self.inner.link.lock();
            match link.state {
                SessionState::Idle | SessionState::Closing => {
                    link.state = SessionState::Reconnecting;
                }
                other => return Err(Error::InvalidState(other)),
            }
        }

        info!(endpoint = %endpoint, "Reconnecting");
        self.connect_to(endpoint)
    }

    /// Dispatch every pending packet to its handler. Call once per
    /// consumer loop iteration; returns how many packets were processed.
    pub fn tick(&self) -> usize {
        self.inner.processor.process_queue()
    }

    /// Send a packet to the server; a no-op while not connected
    pub fn send_packet<P: Packet>(&self, packet: &P) -> Result<()> {
        let connection = self.inner.link.lock().connection.clone();
        match connection {
            Some(connection) => connection.send_packet(packet),
            None => {
                debug!(kind = P::KIND, "Not connected, packet dropped");
                Ok(())
            }
        }
    }

    /// Disconnect and tear the session down
    pub fn shutdown(self) {
        self.disconnect();
        info!("Client session destroyed");
    }

    pub fn state(&self) -> SessionState {
        self.inner.link.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link.lock().connection.is_some()
    }

    /// Endpoint of the current or last connection
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.link.lock().endpoint.clone()
    }

    /// Transport generation; bumped on every connect
    pub fn generation(&self) -> u64 {
        self.inner.link.lock().generation
    }

    pub fn processor(&self) -> &Arc<PacketProcessor> {
        &self.inner.processor
    }
}

impl Inner {
    /// Runs on the consumer context after an unexpected close
    fn notify_closed(self: &Arc<Self>, reason: String) {
        if self.world.is_active_session() {
            let world = self.world.clone();
            let session = Arc::downgrade(self);

            self.prompter.show(Prompt {
                kind: PromptKind::ConnectionLost,
                title: "Connection Lost".to_string(),
                message: format!("You have been disconnected from the server.\n{}", reason),
                actions: vec![
                    PromptAction::new("Quit", move || world.leave_session()),
                    PromptAction::new("Reconnect", move || {
                        let Some(inner) = session.upgrade() else {
                            return;
                        };
                        if let Err(e) = (ClientSession { inner }).reconnect() {
                            warn!(error = %e, "Reconnect failed");
                        }
                    }),
                ],
            });
        } else {
            let prompter = Arc::downgrade(&self.prompter);

            self.prompter.show(Prompt {
                kind: PromptKind::ServerUnavailable,
                title: "Server Unavailable".to_string(),
                message: "Could not reach the server, please try again later.".to_string(),
                actions: vec![PromptAction::new("OK", move || {
                    if let Some(prompter) = prompter.upgrade() {
                        prompter.return_to_menu();
                    }
                })],
            });
        }
    }
}

/// Transport handler for one generation
struct SessionCallbacks {
    session: Weak<Inner>,
    generation: u64,
    transport: OnceLock<Weak<dyn Transport>>,
    connection: OnceLock<Connection>,
}

impl TransportHandler for SessionCallbacks {
    fn on_open(&self) {
        let Some(inner) = self.session.upgrade() else {
            return;
        };
        let Some(transport) = self.transport.get() else {
            return;
        };

        {
            let link = inner.link.lock();
            if link.generation != self.generation || link.state != SessionState::Connecting {
                debug!(
                    generation = self.generation,
                    state = ?link.state,
                    "Ignoring open from stale transport"
                );
                return;
            }
        }

        let connection = Connection::from_weak(
            transport.clone(),
            Arc::downgrade(&inner.processor),
            self.generation,
        );

        // Sent outside the lock: a transport may report a failed write by
        // calling `on_close` inline
        let handshake = HandshakeRequest {
            protocol_version: inner.options.protocol_version,
            client_id: inner.options.client_id,
            username: inner.options.username.clone(),
        };
        if let Err(e) = connection.send_packet(&handshake) {
            warn!(error = %e, "Failed to send handshake");
        }
        let _ = self.connection.set(connection.clone());

        // Published only after the handshake, so nothing can overtake it
        let mut link = inner.link.lock();
        if link.generation != self.generation || link.state != SessionState::Connecting {
            debug!(
                generation = self.generation,
                state = ?link.state,
                "Transport closed or replaced during handshake"
            );
            return;
        }
        link.connection = Some(connection);
        link.state = SessionState::Connected;

        let url = link
            .endpoint
            .as_ref()
            .map(Endpoint::to_url)
            .unwrap_or_default();
        info!(url = %url, "Server connection established");
    }

    fn on_message(&self, payload: Vec<u8>) {
        let Some(inner) = self.session.upgrade() else {
            return;
        };
        match self.connection.get() {
            Some(connection) => inner.processor.enqueue(payload, connection.clone()),
            None => warn!(
                generation = self.generation,
                "Message before open, dropped"
            ),
        }
    }

    fn on_close(&self, code: u16, reason: String) {
        let Some(inner) = self.session.upgrade() else {
            return;
        };

        {
            let mut link = inner.link.lock();
            if link.generation != self.generation {
                debug!(
                    generation = self.generation,
                    code = code,
                    "Ignoring close from stale transport"
                );
                return;
            }
            link.connection = None;
            link.transport = None;
            link.state = SessionState::Idle;
        }

        // Quitting on our own: nothing to tell the user
        if StatusCode::is_client_requested(code) {
            debug!("Client requested disconnect completed");
            return;
        }

        warn!(code = code, reason = %reason, "Connection closed unexpectedly");

        let session = self.session.clone();
        inner.dispatcher.post(move || {
            if let Some(inner) = session.upgrade() {
                inner.notify_closed(reason);
            }
        });
    }
}
