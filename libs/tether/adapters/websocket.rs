//! WebSocket transport over tokio-tungstenite
//!
//! Every `open` spawns one socket task that owns the stream:
//!
//! ```text
//! open(events) ──spawn──> socket task
//!                          ├─ connect (bounded by connect_timeout)
//!                          ├─ read.next()    ──> events.message / closed / error
//!                          └─ outbound.recv() ──> write.send / close frame
//! ```
//!
//! `send` and `close` only push onto the task's outbound channel, so they
//! never block the supervisor.

use crate::core::config::SupervisorConfig;
use crate::traits::*;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Default bound on a single connection attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// No close frame received
const ABNORMAL_CLOSE: u16 = 1006;

enum Outbound {
    Frame(Message),
    Close { code: u16, reason: String },
}

struct SocketLink {
    generation: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

/// [`TransportAdapter`] for `ws://` and `wss://` endpoints
pub struct WebSocketTransport {
    url: String,
    connect_timeout: Duration,
    link: Mutex<Option<SocketLink>>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            link: Mutex::new(None),
        }
    }

    /// Transport using the connect timeout of `config`
    pub fn from_config(url: impl Into<String>, config: &SupervisorConfig) -> Self {
        Self::new(url).with_connect_timeout(config.connect_timeout())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    fn shutdown_link(link: SocketLink, code: u16, reason: &str) {
        if link.open.swap(false, Ordering::AcqRel) {
            let close = Outbound::Close {
                code,
                reason: reason.to_string(),
            };
            if link.outbound.send(close).is_err() {
                link.task.abort();
            }
        } else {
            // Still connecting (or already gone)
            link.task.abort();
        }
        debug!("Closed socket of attempt {}", link.generation);
    }
}

impl TransportAdapter for WebSocketTransport {
    fn open(&self, events: TransportEvents) -> Result<()> {
        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(TetherError::Transport(format!(
                "unsupported URL scheme: {}",
                self.url
            )));
        }

        let mut slot = self.link.lock();
        if let Some(previous) = slot.take() {
            Self::shutdown_link(previous, CLIENT_CLOSE_CODE, CLIENT_CLOSE_REASON);
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let generation = events.generation();
        let task = tokio::spawn(run_socket(
            self.url.clone(),
            self.connect_timeout,
            events,
            outbound_rx,
            Arc::clone(&open),
        ));

        *slot = Some(SocketLink {
            generation,
            outbound: outbound_tx,
            open,
            task,
        });
        Ok(())
    }

    fn send(&self, message: WsMessage) -> Result<()> {
        let slot = self.link.lock();
        let link = slot
            .as_ref()
            .filter(|link| link.open.load(Ordering::Acquire))
            .ok_or_else(|| TetherError::NotConnected("socket not open".into()))?;

        link.outbound
            .send(Outbound::Frame(ws_message_to_tungstenite(message)))
            .map_err(|_| TetherError::NotConnected("socket task has exited".into()))
    }

    fn close(&self, code: u16, reason: &str) {
        if let Some(link) = self.link.lock().take() {
            Self::shutdown_link(link, code, reason);
        }
    }

    fn is_open(&self) -> bool {
        self.link
            .lock()
            .as_ref()
            .map(|link| link.open.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.task.abort();
        }
    }
}

/// Socket task for one connection attempt
async fn run_socket(
    url: String,
    connect_timeout: Duration,
    events: TransportEvents,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    open: Arc<AtomicBool>,
) {
    let ws_stream = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await
    {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(e)) => {
            warn!("Failed to connect to {}: {}", url, e);
            events.error(format!("Failed to connect: {}", e));
            return;
        }
        Err(_) => {
            warn!("Connecting to {} timed out after {:?}", url, connect_timeout);
            events.error(format!("Connect timed out after {:?}", connect_timeout));
            return;
        }
    };

    info!("Connected to {}", url);
    open.store(true, Ordering::Release);
    events.opened();

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        events.message(WsMessage::Text(text));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        events.message(WsMessage::Binary(data));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        open.store(false, Ordering::Release);
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((ABNORMAL_CLOSE, String::new()));
                        events.closed(code, reason);
                        break;
                    }
                    // Protocol-level ping/pong is answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        open.store(false, Ordering::Release);
                        events.error(format!("WebSocket error: {}", e));
                        break;
                    }
                    None => {
                        open.store(false, Ordering::Release);
                        events.closed(ABNORMAL_CLOSE, "stream ended");
                        break;
                    }
                }
            }

            cmd = outbound_rx.recv() => {
                match cmd {
                    Some(Outbound::Frame(message)) => {
                        if let Err(e) = write.send(message).await {
                            open.store(false, Ordering::Release);
                            events.error(format!("Failed to send: {}", e));
                            break;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        let frame = TungsteniteCloseFrame {
                            code: CloseCode::from(code),
                            reason: Cow::Owned(reason),
                        };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        let _ = write.close().await;
                        break;
                    }
                    None => {
                        let _ = write.close().await;
                        break;
                    }
                }
            }
        }
    }

    open.store(false, Ordering::Release);
    debug!("Socket task for attempt {} exiting", events.generation());
}

/// Convert WsMessage to tungstenite Message
fn ws_message_to_tungstenite(msg: WsMessage) -> Message {
    match msg {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}
