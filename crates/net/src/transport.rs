//! Message transport abstraction and its WebSocket implementation
//!
//! A transport is an opaque bidirectional message channel. It reports
//! `on_open`, `on_message` and `on_close` on its own execution context
//! (a tokio task for [`WsTransport`]); callers never block on it.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::protocol::StatusCode;

/// How long to wait for the server to answer a locally requested close
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport events, fired on the network context
pub trait TransportHandler: Send + Sync {
    fn on_open(&self);
    fn on_message(&self, payload: Vec<u8>);
    /// Fired exactly once per transport, including when the connect fails
    fn on_close(&self, code: u16, reason: String);
}

/// Bidirectional message channel to one server
pub trait Transport: Send + Sync {
    /// Start connecting; the outcome is reported through the handler
    fn connect(&self);
    /// Queue a message for sending
    fn send(&self, payload: Vec<u8>);
    /// Start the close handshake; completion is reported via `on_close`
    fn close(&self, code: u16, reason: &str);
    fn url(&self) -> &str;
}

/// Builds a fresh transport for every connection attempt
pub trait TransportFactory: Send + Sync {
    fn create(&self, url: &str, handler: Arc<dyn TransportHandler>) -> Arc<dyn Transport>;
}

enum TransportCommand {
    Send(Vec<u8>),
    Close { code: u16, reason: String },
}

/// WebSocket transport over tokio-tungstenite
pub struct WsTransport {
    url: String,
    runtime: Handle,
    handler: Arc<dyn TransportHandler>,
    cmd_tx: mpsc::UnboundedSender<TransportCommand>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportCommand>>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, runtime: Handle, handler: Arc<dyn TransportHandler>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            runtime,
            handler,
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
        }
    }

    fn push(&self, cmd: TransportCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!(url = %self.url, "Transport task finished, command dropped");
        }
    }
}

impl Transport for WsTransport {
    fn connect(&self) {
        let Some(cmd_rx) = self.cmd_rx.lock().take() else {
            warn!(url = %self.url, "Transport already started");
            return;
        };

        self.runtime.spawn(connection_task(
            self.url.clone(),
            self.handler.clone(),
            cmd_rx,
        ));
    }

    fn send(&self, payload: Vec<u8>) {
        self.push(TransportCommand::Send(payload));
    }

    fn close(&self, code: u16, reason: &str) {
        self.push(TransportCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Factory for [`WsTransport`]s running on a tokio runtime
#[derive(Clone)]
pub struct WsTransportFactory {
    runtime: Handle,
}

impl WsTransportFactory {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl TransportFactory for WsTransportFactory {
    fn create(&self, url: &str, handler: Arc<dyn TransportHandler>) -> Arc<dyn Transport> {
        Arc::new(WsTransport::new(url, self.runtime.clone(), handler))
    }
}

/// Main connection task
async fn connection_task(
    url: String,
    handler: Arc<dyn TransportHandler>,
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>,
) {
    debug!(url = %url, "Connecting transport");

    // Connect, unless a close arrives first
    let connect = connect_async(url.as_str());
    tokio::pin!(connect);

    let ws = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((ws, _)) => break ws,
                Err(e) => {
                    warn!(url = %url, error = %e, "Transport connect failed");
                    handler.on_close(StatusCode::Abnormal.code(), e.to_string());
                    return;
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(TransportCommand::Close { code, reason }) => {
                    debug!(url = %url, "Close requested while connecting");
                    handler.on_close(code, reason);
                    return;
                }
                Some(TransportCommand::Send(_)) => {
                    debug!(url = %url, "Dropping send before open");
                }
                None => {
                    handler.on_close(StatusCode::Abnormal.code(), "transport dropped".into());
                    return;
                }
            },
        }
    };

    handler.on_open();

    let (mut sink, mut stream) = ws.split();
    let mut local_close: Option<(u16, String)> = None;
    let mut close_deadline = Instant::now();

    // Main loop - incoming frames and outgoing commands
    let (code, reason) = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Binary(data))) => handler.on_message(data.to_vec()),
                Some(Ok(Message::Text(text))) => handler.on_message(text.as_str().as_bytes().to_vec()),
                Some(Ok(Message::Close(frame))) => {
                    let remote = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                        .unwrap_or((1005, String::new()));
                    break local_close.take().unwrap_or(remote);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    break local_close
                        .take()
                        .unwrap_or((StatusCode::Abnormal.code(), e.to_string()));
                }
                None => {
                    break local_close
                        .take()
                        .unwrap_or((StatusCode::Abnormal.code(), "connection dropped".into()));
                }
            },

            cmd = cmd_rx.recv(), if local_close.is_none() => match cmd {
                Some(TransportCommand::Send(payload)) => {
                    if let Err(e) = sink.send(Message::Binary(payload.into())).await {
                        break (StatusCode::Abnormal.code(), e.to_string());
                    }
                }
                Some(TransportCommand::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Close frame not sent");
                        break (code, reason);
                    }
                    local_close = Some((code, reason));
                    close_deadline = Instant::now() + CLOSE_HANDSHAKE_TIMEOUT;
                }
                None => {
                    let _ = sink.close().await;
                    break (StatusCode::Abnormal.code(), "transport dropped".into());
                }
            },

            // Server never answered our close
            _ = tokio::time::sleep_until(close_deadline), if local_close.is_some() => {
                if let Some(local) = local_close.take() {
                    break local;
                }
            }
        }
    };

    info!(url = %url, code = code, reason = %reason, "Transport closed");
    handler.on_close(code, reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[derive(Debug, PartialEq)]
    enum Event {
        Open,
        Message(Vec<u8>),
        Close(u16, String),
    }

    struct Recorder {
        tx: mpsc::UnboundedSender<Event>,
    }

    impl TransportHandler for Recorder {
        fn on_open(&self) {
            let _ = self.tx.send(Event::Open);
        }

        fn on_message(&self, payload: Vec<u8>) {
            let _ = self.tx.send(Event::Message(payload));
        }

        fn on_close(&self, code: u16, reason: String) {
            let _ = self.tx.send(Event::Close(code, reason));
        }
    }

    fn transport_for(url: String) -> (Arc<dyn Transport>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let factory = WsTransportFactory::new(Handle::current());
        (factory.create(&url, Arc::new(Recorder { tx })), rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_echo_then_client_requested_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Echo server
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_binary() && ws.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let (transport, mut rx) = transport_for(format!("ws://{}/socket", addr));
        transport.connect();
        assert_eq!(next_event(&mut rx).await, Event::Open);

        transport.send(b"hello".to_vec());
        assert_eq!(next_event(&mut rx).await, Event::Message(b"hello".to_vec()));

        transport.close(StatusCode::ClientRequestedDisconnect.code(), "Player left the game");
        assert_eq!(
            next_event(&mut rx).await,
            Event::Close(4000, "Player left the game".to_string())
        );
    }

    #[tokio::test]
    async fn test_server_close_reports_server_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let frame = CloseFrame {
                code: CloseCode::from(1011),
                reason: "shutting down".into(),
            };
            let _ = ws.close(Some(frame)).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (transport, mut rx) = transport_for(format!("ws://{}/socket", addr));
        transport.connect();
        assert_eq!(next_event(&mut rx).await, Event::Open);
        assert_eq!(
            next_event(&mut rx).await,
            Event::Close(1011, "shutting down".to_string())
        );
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_as_close() {
        // Reserve a port, then free it so nothing is listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (transport, mut rx) = transport_for(format!("ws://{}/socket", addr));
        transport.connect();

        match next_event(&mut rx).await {
            Event::Close(code, _) => assert_eq!(code, StatusCode::Abnormal.code()),
            other => panic!("Expected close, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_twice_is_ignored() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (transport, mut rx) = transport_for(format!("ws://{}/socket", addr));
        transport.connect();
        transport.connect();

        assert!(matches!(next_event(&mut rx).await, Event::Close(..)));
        let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(extra.is_err(), "on_close must fire exactly once");
    }
}
