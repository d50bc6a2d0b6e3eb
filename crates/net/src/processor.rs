//! Packet processor
//!
//! Maps packet kinds to handlers and buffers incoming payloads between the
//! network context (producers, [`PacketProcessor::enqueue`]) and the
//! consumer context (single consumer, [`PacketProcessor::process_queue`]).
//!
//! The queue is unbounded. Crossing the warning threshold is logged once
//! per crossing so a stalled consumer is visible without dropping packets.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::connection::Connection;
use crate::envelope::{decode_envelope, encode_packet, Envelope};
use crate::error::Result;
use crate::protocol::Packet;

/// Default backlog size that triggers a warning
pub const DEFAULT_WARN_THRESHOLD: usize = 1024;

type Handler = Arc<dyn Fn(Envelope, &Connection) -> Result<()> + Send + Sync>;

struct PendingPacket {
    payload: Vec<u8>,
    connection: Connection,
    received_at: Instant,
}

/// Consumer side of the queue. `held` keeps a packet that is not due yet
/// (simulated latency) at the front.
struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<PendingPacket>,
    held: Option<PendingPacket>,
}

/// Packet registry and pending queue
pub struct PacketProcessor {
    handlers: RwLock<HashMap<&'static str, Handler>>,
    queue_tx: mpsc::UnboundedSender<PendingPacket>,
    queue_rx: Mutex<QueueReceiver>,
    pending: AtomicUsize,
    warn_threshold: usize,
    over_threshold: AtomicBool,
    simulated_latency: Option<Duration>,
}

impl PacketProcessor {
    pub fn new() -> Self {
        let (queue_tx, rx) = mpsc::unbounded_channel();
        Self {
            handlers: RwLock::new(HashMap::new()),
            queue_tx,
            queue_rx: Mutex::new(QueueReceiver { rx, held: None }),
            pending: AtomicUsize::new(0),
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            over_threshold: AtomicBool::new(false),
            simulated_latency: None,
        }
    }

    /// Hold every packet at least this long before dispatching it
    pub fn with_simulated_latency(mut self, latency: Option<Duration>) -> Self {
        self.simulated_latency = latency;
        self
    }

    pub fn with_warn_threshold(mut self, threshold: usize) -> Self {
        self.warn_threshold = threshold.max(1);
        self
    }

    /// Register the handler for packet kind `P`, replacing any previous one
    pub fn register<P, F>(&self, handler: F)
    where
        P: Packet,
        F: Fn(P, &Connection) -> Result<()> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |envelope: Envelope, conn: &Connection| {
            let packet = envelope.into_packet::<P>()?;
            handler(packet, conn)
        });

        if self.handlers.write().insert(P::KIND, handler).is_some() {
            warn!(kind = P::KIND, "Replaced existing packet handler");
        } else {
            debug!(kind = P::KIND, "Registered packet handler");
        }
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.handlers.read().contains_key(kind)
    }

    /// Encode a packet for sending
    pub fn write<P: Packet>(&self, packet: &P) -> Result<Vec<u8>> {
        encode_packet(packet)
    }

    /// Queue raw bytes for dispatch. Never blocks; callable from any thread.
    pub fn enqueue(&self, payload: Vec<u8>, connection: Connection) {
        let packet = PendingPacket {
            payload,
            connection,
            received_at: Instant::now(),
        };

        // Count before pushing so the consumer never decrements below zero
        let pending = self.pending.fetch_add(1, Ordering::SeqCst) + 1;

        // The receiver lives as long as `self`, so this cannot fail
        if self.queue_tx.send(packet).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        if pending >= self.warn_threshold && !self.over_threshold.swap(true, Ordering::SeqCst) {
            warn!(
                pending = pending,
                threshold = self.warn_threshold,
                "Packet queue backlog above threshold"
            );
        }
    }

    /// Number of packets waiting for dispatch
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Drain the queue in FIFO order, invoking the handler of each packet
    /// on the calling thread. Failures of a single packet are logged and do
    /// not affect the rest. Returns how many packets were taken off the
    /// queue.
    pub fn process_queue(&self) -> usize {
        let mut processed = 0;

        while let Some(packet) = self.next_due() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            self.dispatch(packet);
            processed += 1;
        }

        if self.pending() < self.warn_threshold {
            self.over_threshold.store(false, Ordering::SeqCst);
        }

        processed
    }

    fn next_due(&self) -> Option<PendingPacket> {
        let mut queue = self.queue_rx.lock();
        let packet = match queue.held.take() {
            Some(packet) => packet,
            None => queue.rx.try_recv().ok()?,
        };

        if let Some(latency) = self.simulated_latency {
            if packet.received_at.elapsed() < latency {
                queue.held = Some(packet);
                return None;
            }
        }

        Some(packet)
    }

    fn dispatch(&self, packet: PendingPacket) {
        let envelope = match decode_envelope(&packet.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, bytes = packet.payload.len(), "Dropping undecodable packet");
                return;
            }
        };

        let handler = self.handlers.read().get(envelope.kind.as_str()).cloned();
        let Some(handler) = handler else {
            warn!(kind = %envelope.kind, "No handler registered for packet");
            return;
        };

        let kind = envelope.kind.clone();
        let conn = &packet.connection;
        match catch_unwind(AssertUnwindSafe(|| handler(envelope, conn))) {
            Ok(Ok(())) => debug!(kind = %kind, "Packet handled"),
            Ok(Err(e)) => warn!(kind = %kind, error = %e, "Packet handler failed"),
            Err(_) => error!(kind = %kind, "Packet handler panicked"),
        }
    }
}

impl Default for PacketProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{ChatMessage, Ping, Pong};
    use crate::transport::Transport;
    use chrono::Utc;
    use std::sync::Weak;

    struct NullTransport;

    impl Transport for NullTransport {
        fn connect(&self) {}
        fn send(&self, _payload: Vec<u8>) {}
        fn close(&self, _code: u16, _reason: &str) {}
        fn url(&self) -> &str {
            "ws://null:0/socket"
        }
    }

    // Handles here are only used as dispatch origins, never to send
    fn connection() -> (Arc<dyn Transport>, Connection) {
        let transport: Arc<dyn Transport> = Arc::new(NullTransport);
        let conn = Connection::from_weak(Arc::downgrade(&transport), Weak::new(), 1);
        (transport, conn)
    }

    fn ping_bytes(nonce: u64) -> Vec<u8> {
        encode_packet(&Ping { nonce }).unwrap()
    }

    fn recording_processor() -> (PacketProcessor, Arc<Mutex<Vec<u64>>>) {
        let processor = PacketProcessor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        processor.register::<Ping, _>(move |ping, _| {
            seen_clone.lock().push(ping.nonce);
            Ok(())
        });
        (processor, seen)
    }

    #[test]
    fn test_dispatch_in_fifo_order_exactly_once() {
        let (processor, seen) = recording_processor();
        let (_transport, conn) = connection();

        for nonce in 0..5 {
            processor.enqueue(ping_bytes(nonce), conn.clone());
        }
        assert_eq!(processor.pending(), 5);
        assert!(seen.lock().is_empty());

        assert_eq!(processor.process_queue(), 5);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(processor.pending(), 0);

        assert_eq!(processor.process_queue(), 0);
        assert_eq!(seen.lock().len(), 5);
    }

    #[test]
    fn test_interleaved_enqueue_and_drain() {
        let (processor, seen) = recording_processor();
        let (_transport, conn) = connection();

        let mut next = 0;
        for batch in [3usize, 0, 1, 4, 2] {
            for _ in 0..batch {
                processor.enqueue(ping_bytes(next), conn.clone());
                next += 1;
            }
            processor.process_queue();
        }

        assert_eq!(*seen.lock(), (0..next).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let (processor, seen) = recording_processor();
        let processor = Arc::new(processor);
        let (_transport, conn) = connection();

        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let processor = processor.clone();
                let conn = conn.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        processor.enqueue(ping_bytes(p * 1000 + i), conn.clone());
                    }
                })
            })
            .collect();

        let mut dispatched = 0;
        while producers.iter().any(|h| !h.is_finished()) {
            dispatched += processor.process_queue();
        }
        for handle in producers {
            handle.join().unwrap();
        }
        dispatched += processor.process_queue();

        assert_eq!(dispatched, 200);
        let seen = seen.lock();
        assert_eq!(seen.len(), 200);

        // Per-producer order is preserved
        for p in 0..4u64 {
            let mine: Vec<u64> = seen.iter().copied().filter(|n| n / 1000 == p).collect();
            assert_eq!(mine, (0..50).map(|i| p * 1000 + i).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_failures_are_isolated() {
        let (processor, seen) = recording_processor();
        let (_transport, conn) = connection();

        processor.register::<Pong, _>(|_, _| Err(Error::Handler("boom".into())));
        processor.register::<ChatMessage, _>(|_, _| panic!("handler bug"));

        let chat = ChatMessage {
            sender: "ada".into(),
            content: "hi".into(),
            sent_at: Utc::now(),
        };

        processor.enqueue(ping_bytes(1), conn.clone());
        processor.enqueue(b"garbage".to_vec(), conn.clone());
        processor.enqueue(encode_packet(&Pong { nonce: 0 }).unwrap(), conn.clone());
        processor.enqueue(encode_packet(&chat).unwrap(), conn.clone());
        processor.enqueue(br#"{"kind":"unknown","body":{}}"#.to_vec(), conn.clone());
        processor.enqueue(br#"{"kind":"ping","body":{"wrong":true}}"#.to_vec(), conn.clone());
        processor.enqueue(ping_bytes(2), conn.clone());

        assert_eq!(processor.process_queue(), 7);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_reregister_replaces_handler() {
        let (processor, seen) = recording_processor();
        let (_transport, conn) = connection();

        let replaced = Arc::new(Mutex::new(0));
        let replaced_clone = replaced.clone();
        processor.register::<Ping, _>(move |_, _| {
            *replaced_clone.lock() += 1;
            Ok(())
        });

        processor.enqueue(ping_bytes(1), conn);
        processor.process_queue();

        assert!(seen.lock().is_empty());
        assert_eq!(*replaced.lock(), 1);
        assert!(processor.is_registered(Ping::KIND));
        assert!(!processor.is_registered(Pong::KIND));
    }

    #[test]
    fn test_handler_receives_origin_connection() {
        let processor = PacketProcessor::new();
        let (_transport, conn) = connection();
        let expected = conn.id();

        let got = Arc::new(Mutex::new(None));
        let got_clone = got.clone();
        processor.register::<Ping, _>(move |_, c| {
            *got_clone.lock() = Some(c.id());
            Ok(())
        });

        processor.enqueue(ping_bytes(1), conn);
        processor.process_queue();
        assert_eq!(*got.lock(), Some(expected));
    }

    #[test]
    fn test_simulated_latency_holds_packets_in_order() {
        let (processor, seen) = recording_processor();
        let processor = processor.with_simulated_latency(Some(Duration::from_millis(50)));
        let (_transport, conn) = connection();

        processor.enqueue(ping_bytes(1), conn.clone());
        processor.enqueue(ping_bytes(2), conn.clone());

        assert_eq!(processor.process_queue(), 0);
        assert_eq!(processor.pending(), 2);

        std::thread::sleep(Duration::from_millis(80));
        processor.enqueue(ping_bytes(3), conn);

        // 1 and 2 are due, 3 is not
        assert_eq!(processor.process_queue(), 2);
        assert_eq!(*seen.lock(), vec![1, 2]);

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(processor.process_queue(), 1);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_backlog_threshold_resets_after_drain() {
        let (processor, _seen) = recording_processor();
        let processor = processor.with_warn_threshold(2);
        let (_transport, conn) = connection();

        processor.enqueue(ping_bytes(1), conn.clone());
        processor.enqueue(ping_bytes(2), conn.clone());
        assert!(processor.over_threshold.load(Ordering::SeqCst));

        processor.process_queue();
        assert!(!processor.over_threshold.load(Ordering::SeqCst));
        assert_eq!(processor.pending(), 0);
    }
}
