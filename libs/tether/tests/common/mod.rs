//! Common test utilities for tether integration tests
//!
//! - [`MockTransport`]: scripted transport; tests play the server side
//! - [`settle`]: let the driver task drain its input on a paused clock
//! - [`MockWsServer`]: real WebSocket server speaking the envelope protocol

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether::{
    ConnectionSupervisor, Envelope, Result, SupervisorConfig, TetherError, TransportAdapter,
    TransportEvents, WsMessage,
};
use tokio::net::TcpListener;
use tokio::sync::Notify;

pub const TOKEN: &str = "abc123";

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

#[derive(Default)]
struct MockState {
    events: Option<TransportEvents>,
    opens: usize,
    sent: Vec<WsMessage>,
    closes: Vec<(u16, String)>,
}

/// Transport whose server side is driven by the test
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    open: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn current_events(&self) -> TransportEvents {
        self.state
            .lock()
            .events
            .clone()
            .expect("transport was never opened")
    }

    /// Number of `open` calls so far
    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    /// Generation of the latest attempt
    pub fn generation(&self) -> u64 {
        self.current_events().generation()
    }

    /// Event sink of the latest attempt, kept to replay late callbacks
    pub fn events(&self) -> TransportEvents {
        self.current_events()
    }

    /// Frames the client sent, parsed
    pub fn sent(&self) -> Vec<Envelope> {
        self.state
            .lock()
            .sent
            .iter()
            .map(|frame| Envelope::parse(frame).expect("client sent a malformed frame"))
            .collect()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent().into_iter().map(|e| e.kind).collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.state.lock().closes.clone()
    }

    /// Complete the pending connect
    pub fn accept(&self) {
        self.open.store(true, Ordering::Release);
        self.current_events().opened();
    }

    /// Fail the pending connect
    pub fn refuse(&self, reason: &str) {
        self.open.store(false, Ordering::Release);
        self.current_events().error(reason);
    }

    /// Deliver an envelope from the server
    pub fn server_send(&self, envelope: Value) {
        self.current_events()
            .message(WsMessage::Text(envelope.to_string()));
    }

    pub fn server_send_raw(&self, text: &str) {
        self.current_events().message(WsMessage::Text(text.to_string()));
    }

    /// The server (or network) drops the link
    pub fn drop_link(&self, code: u16, reason: &str) {
        self.open.store(false, Ordering::Release);
        self.current_events().closed(code, reason);
    }

    /// Link dies without anyone noticing
    pub fn go_dark(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl TransportAdapter for MockTransport {
    fn open(&self, events: TransportEvents) -> Result<()> {
        let mut state = self.state.lock();
        state.opens += 1;
        state.events = Some(events);
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn send(&self, message: WsMessage) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TetherError::NotConnected("mock link down".into()));
        }
        self.state.lock().sent.push(message);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        let events = {
            let mut state = self.state.lock();
            state.closes.push((code, reason.to_string()));
            state.events.clone()
        };
        self.open.store(false, Ordering::Release);
        // A real socket echoes the close back; it must be ignored
        if let Some(events) = events {
            events.closed(code, reason);
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Let spawned tasks run without moving the clock
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock, then let the driver react
pub async fn advance(ms: u64) {
    tokio::time::advance(std::time::Duration::from_millis(ms)).await;
    settle().await;
}

pub async fn supervisor_with(config: SupervisorConfig) -> (ConnectionSupervisor, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let supervisor = tether::builder()
        .shared_transport(transport.clone())
        .config(config)
        .build()
        .await
        .expect("build supervisor");
    (supervisor, transport)
}

pub async fn supervisor() -> (ConnectionSupervisor, Arc<MockTransport>) {
    supervisor_with(SupervisorConfig::default()).await
}

/// Open and authenticate the current attempt
pub async fn establish(transport: &MockTransport) {
    transport.accept();
    settle().await;
    transport.server_send(json!({"type": "authenticated"}));
    settle().await;
}

/// A supervisor already in `Connected`
pub async fn connected_supervisor() -> (ConnectionSupervisor, Arc<MockTransport>) {
    let (supervisor, transport) = supervisor().await;
    supervisor.initialize(Some(TOKEN)).await;
    establish(&transport).await;
    (supervisor, transport)
}

/// A WebSocket server that authenticates any non-empty token
///
/// `authenticate{token}` is answered with `authenticated` (or `auth_error`
/// for the token "bad"), `ping` with `pong`, `join_room` with
/// `room_joined`; everything else is echoed.
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self { addr, shutdown }
    }

    fn reply_to(text: &str) -> Option<String> {
        let envelope: Value = serde_json::from_str(text).ok()?;
        let reply = match envelope["type"].as_str()? {
            "authenticate" => match envelope["data"]["token"].as_str() {
                Some("bad") => json!({"type": "auth_error", "data": {"message": "invalid token"}}),
                Some(_) => json!({"type": "authenticated"}),
                None => json!({"type": "auth_error"}),
            },
            "ping" => json!({"type": "pong", "data": envelope["data"].clone()}),
            "join_room" => json!({"type": "room_joined", "data": envelope["data"].clone()}),
            _ => envelope,
        };
        Some(reply.to_string())
    }

    async fn handle_connection(stream: tokio::net::TcpStream, shutdown: Arc<Notify>) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = Self::reply_to(&text) {
                                if write.send(Message::Text(reply)).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(msg)) if msg.is_close() => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => break,
                    }
                }
                _ = shutdown.notified() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Shutdown the server and drop every connection
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
