//! Connection supervisor
//!
//! # Architecture
//!
//! ```text
//!  ConnectionSupervisor (handle)           Driver task (owns all mutable state)
//! ┌──────────────────────────┐          ┌──────────────────────────────────┐
//! │ initialize / cleanup /   │─Command─>│                                  │
//! │ force_reconnect          │          │  select! {                       │
//! │                          │          │    input      (commands+events)  │
//! │ send_message ────────────┼─direct──>│    reconnect  (pending timer)    │
//! │ on / off / join / leave  │          │    heartbeat  (interval)         │
//! │                          │          │    restart    (force_reconnect)  │
//! │ connection_health() <────┼─snapshot─│  }                               │
//! └──────────────────────────┘          └──────────────┬───────────────────┘
//!                                                      │ open/send/close
//!                                        TransportAdapter ──TransportEvent──┐
//!                                                      ▲                    │
//!                                                      └── same channel <───┘
//! ```
//!
//! Commands and transport callbacks share one ordered channel, so every
//! transition is applied by exactly one task, one input at a time. Transport
//! events carry the generation of the attempt that produced them; events
//! from a replaced or torn-down attempt are discarded.

use super::backoff::{PendingReconnect, ReconnectionPolicy, ScheduleOutcome};
use super::config::SupervisorConfig;
use super::connection_state::{AtomicMetrics, ConnectionState, Metrics};
use super::dispatcher::{MessageDispatcher, Subscription};
use super::envelope::{Envelope, InboundKind};
use super::handshake::{AuthHandshake, AuthOutcome};
use super::health::{ConnectionHealth, HealthReporter};
use super::heartbeat::{HeartbeatMonitor, HeartbeatVerdict};
use super::rooms::{RoomRegistry, RoomStatus};
use crate::traits::*;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Message recorded when the reconnection budget is spent
pub const RETRIES_EXHAUSTED_MESSAGE: &str = "Maximum reconnection attempts reached";

/// Lifecycle notifications published by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Transport opened, handshake in flight
    Connected,
    /// Session established
    Authenticated,
    /// Credential rejected; a new token or `force_reconnect` is required
    AuthFailed(String),
    /// Link lost unintentionally
    Disconnected(String),
    /// Reconnection scheduled
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnection budget spent
    RetriesExhausted,
    /// `error` envelope from the server
    ServerError(String),
    /// Torn down by `cleanup`
    Closed,
}

pub(crate) enum Command {
    Initialize {
        token: Option<String>,
        ack: oneshot::Sender<()>,
    },
    ForceReconnect {
        ack: oneshot::Sender<()>,
    },
    Cleanup {
        ack: oneshot::Sender<()>,
    },
    /// Send joins for rooms still pending on the current link
    FlushRooms,
    Shutdown,
}

/// Everything the driver task reacts to
pub(crate) enum DriverInput {
    Command(Command),
    Transport { generation: u64, event: TransportEvent },
}

enum Wake {
    Input(Option<DriverInput>),
    ReconnectDue,
    HeartbeatTick,
    RestartDue,
}

/// Handle to one supervised connection
///
/// Dropping the handle tears the link down.
pub struct ConnectionSupervisor {
    input_tx: mpsc::UnboundedSender<DriverInput>,
    dispatcher: Arc<MessageDispatcher>,
    rooms: Arc<RoomRegistry>,
    health: Arc<HealthReporter>,
    metrics: Arc<AtomicMetrics>,
    event_rx: Receiver<ClientEvent>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ConnectionSupervisor {
    /// Spawn the driver task
    ///
    /// Called by the builder's `build()`. Use `tether::builder()` to create
    /// a supervisor.
    pub(crate) fn spawn(
        config: SupervisorConfig,
        transport: Arc<dyn TransportAdapter>,
        strategy: Box<dyn ReconnectionStrategy>,
    ) -> Self {
        let metrics = Arc::new(AtomicMetrics::new());
        let health = Arc::new(HealthReporter::new(config.max_retries));
        let rooms = Arc::new(RoomRegistry::new());
        let dispatcher = Arc::new(MessageDispatcher::new(
            Arc::clone(&transport),
            Arc::clone(&metrics),
        ));

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = bounded(config.event_channel_capacity);

        let driver = Driver {
            reconnect: ReconnectionPolicy::new(strategy, config.max_retries),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_strategy, config.heartbeat_interval()),
            config,
            transport,
            dispatcher: Arc::clone(&dispatcher),
            rooms: Arc::clone(&rooms),
            health: Arc::clone(&health),
            metrics: Arc::clone(&metrics),
            events: event_tx,
            input_tx: input_tx.clone(),
            generation: 0,
            token: None,
            handshake: None,
            attempt_started: None,
            restart_at: None,
        };

        let task_handle = tokio::spawn(driver.run(input_rx));

        Self {
            input_tx,
            dispatcher,
            rooms,
            health,
            metrics,
            event_rx,
            task_handle: Some(task_handle),
        }
    }

    async fn command(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) {
        let (ack, done) = oneshot::channel();
        if self.input_tx.send(DriverInput::Command(make(ack))).is_err() {
            warn!("Supervisor task has stopped, command ignored");
            return;
        }
        let _ = done.await;
    }

    /// Start (or retarget) the session
    ///
    /// `None` or an empty token tears the link down and returns to `Idle`.
    /// The same token while a link is active or being established is a no-op.
    pub async fn initialize(&self, token: Option<&str>) {
        let token = token.map(str::to_string);
        self.command(|ack| Command::Initialize { token, ack }).await;
    }

    /// Reset the retry budget and reconnect with the last token
    pub async fn force_reconnect(&self) {
        self.command(|ack| Command::ForceReconnect { ack }).await;
    }

    /// Tear everything down; safe to call repeatedly
    pub async fn cleanup(&self) {
        self.command(|ack| Command::Cleanup { ack }).await;
    }

    /// Current health snapshot
    pub fn connection_health(&self) -> ConnectionHealth {
        self.health.snapshot()
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.health.state()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.health.state() == ConnectionState::Connected
    }

    pub fn pending_reconnect(&self) -> Option<PendingReconnect> {
        self.health.pending_reconnect()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot(self.health.state())
    }

    /// Best-effort send; false if the message was dropped
    pub fn send_message(&self, envelope: &Envelope) -> bool {
        self.dispatcher.send(envelope)
    }

    /// Send `send_message{roomId, message}` with a generated `messageId`
    pub fn send_room_message(&self, room_id: &str, message: Value) -> bool {
        self.dispatcher.send(&Envelope::room_message(room_id, message))
    }

    /// Track a room and request it if the session is established
    ///
    /// The join itself is sent by the driver task, ordered with transport
    /// events. Rooms requested while disconnected are sent after the next
    /// successful authentication.
    pub fn join_room(&self, room_id: &str) {
        if !self.rooms.request_join(room_id) {
            debug!("Room '{}' already tracked", room_id);
            return;
        }
        let _ = self
            .input_tx
            .send(DriverInput::Command(Command::FlushRooms));
    }

    pub fn leave_room(&self, room_id: &str) {
        if !self.rooms.request_leave(room_id) {
            debug!("Room '{}' not tracked", room_id);
            return;
        }
        if self.is_connected() {
            self.dispatcher.send(&Envelope::leave_room(room_id));
        }
    }

    pub fn rooms(&self) -> Vec<(String, RoomStatus)> {
        self.rooms.rooms()
    }

    /// Register the handler for an inbound type; last registration wins
    pub fn on<H>(&self, kind: impl Into<String>, handler: H) -> Subscription
    where
        H: MessageHandler,
    {
        self.dispatcher.on(kind, handler)
    }

    pub fn off(&self, kind: &str) -> bool {
        self.dispatcher.off(kind)
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ClientEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receiver side of the event channel, for polling from another thread
    pub fn events(&self) -> Receiver<ClientEvent> {
        self.event_rx.clone()
    }

    /// Clean up and wait for the driver task to exit
    pub async fn shutdown(mut self) {
        info!("Shutting down connection supervisor");
        let _ = self.input_tx.send(DriverInput::Command(Command::Shutdown));
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if self.task_handle.is_some() {
            let _ = self.input_tx.send(DriverInput::Command(Command::Shutdown));
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Driver {
    config: SupervisorConfig,
    transport: Arc<dyn TransportAdapter>,
    dispatcher: Arc<MessageDispatcher>,
    rooms: Arc<RoomRegistry>,
    health: Arc<HealthReporter>,
    metrics: Arc<AtomicMetrics>,
    events: Sender<ClientEvent>,
    input_tx: mpsc::UnboundedSender<DriverInput>,
    reconnect: ReconnectionPolicy,
    heartbeat: HeartbeatMonitor,
    /// Bumped on every open and every teardown
    generation: u64,
    token: Option<String>,
    handshake: Option<AuthHandshake>,
    attempt_started: Option<Instant>,
    /// Reopen deadline set by `force_reconnect`
    restart_at: Option<Instant>,
}

impl Driver {
    async fn run(mut self, mut input_rx: mpsc::UnboundedReceiver<DriverInput>) {
        loop {
            let wake = tokio::select! {
                biased;
                input = input_rx.recv() => Wake::Input(input),
                _ = self.reconnect.due() => Wake::ReconnectDue,
                _ = self.heartbeat.tick() => Wake::HeartbeatTick,
                _ = sleep_until_opt(self.restart_at) => Wake::RestartDue,
            };

            match wake {
                Wake::Input(Some(DriverInput::Command(Command::Shutdown))) | Wake::Input(None) => {
                    self.cleanup();
                    break;
                }
                Wake::Input(Some(DriverInput::Command(command))) => self.handle_command(command),
                Wake::Input(Some(DriverInput::Transport { generation, event })) => {
                    self.handle_transport(generation, event)
                }
                Wake::ReconnectDue => self.on_reconnect_due(),
                Wake::HeartbeatTick => self.on_heartbeat_tick(),
                Wake::RestartDue => self.on_restart_due(),
            }
        }

        info!("Supervisor task exiting");
    }

    fn state(&self) -> ConnectionState {
        self.health.state()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.health.state();
        if previous != state {
            debug!("State {:?} -> {:?}", previous, state);
            self.health.set_state(state);
        }
    }

    fn emit(&self, event: ClientEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!("Event channel full, dropping {:?}", event),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn elapsed_since_attempt(&self) -> Option<u64> {
        self.attempt_started
            .map(|started| started.elapsed().as_millis() as u64)
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Initialize { token, ack } => {
                self.initialize(token);
                let _ = ack.send(());
            }
            Command::ForceReconnect { ack } => {
                self.force_reconnect();
                let _ = ack.send(());
            }
            Command::Cleanup { ack } => {
                self.cleanup();
                let _ = ack.send(());
            }
            Command::FlushRooms => {
                if self.state() == ConnectionState::Connected {
                    self.flush_pending_rooms();
                }
            }
            // Handled by the run loop
            Command::Shutdown => {}
        }
    }

    fn initialize(&mut self, token: Option<String>) {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            info!("No token supplied, going idle");
            self.teardown();
            self.rooms.clear();
            self.health.reset();
            self.token = None;
            self.set_state(ConnectionState::Idle);
            return;
        };

        let state = self.state();
        if self.token.as_deref() == Some(token.as_str()) && state.is_active() {
            debug!("Already {:?} with this token, ignoring initialize", state);
            return;
        }

        if state.is_active() {
            info!("Token changed, replacing the current link");
        }
        self.teardown();
        if self.config.replay_rooms_on_reconnect {
            self.rooms.mark_all_pending();
        }

        self.token = Some(token);
        self.health.reset();
        self.reconnect.reset();
        self.open_attempt(ConnectionState::Connecting);
    }

    fn force_reconnect(&mut self) {
        if self.token.is_none() {
            warn!("force_reconnect called before initialize, ignoring");
            return;
        }

        info!(
            "Forcing reconnection in {:?}",
            self.config.force_reconnect_delay()
        );
        self.teardown();
        // Membership survives so it can be replayed on the new link
        if self.config.replay_rooms_on_reconnect {
            self.rooms.mark_all_pending();
        }
        self.health.reset();
        self.reconnect.reset();
        self.restart_at = Some(Instant::now() + self.config.force_reconnect_delay());
        self.set_state(ConnectionState::Reconnecting);
    }

    fn on_restart_due(&mut self) {
        self.restart_at = None;
        self.open_attempt(ConnectionState::Connecting);
    }

    fn cleanup(&mut self) {
        let was_active = self.teardown();
        self.rooms.clear();
        self.health.reset();
        self.set_state(ConnectionState::Closed);
        if was_active {
            info!("Connection cleaned up");
            self.emit(ClientEvent::Closed);
        }
    }

    /// Cancel timers, stop the heartbeat and close the transport
    ///
    /// Returns true if there was anything to tear down.
    fn teardown(&mut self) -> bool {
        let had_timer = self.reconnect.cancel() | self.restart_at.take().is_some();
        self.health.set_pending(None);
        self.heartbeat.stop();
        self.dispatcher.set_link_open(false);
        self.handshake = None;
        self.attempt_started = None;
        // Late callbacks from the old socket are now stale
        self.generation += 1;

        let was_active = self.state().is_active();
        if was_active {
            self.transport.close(CLIENT_CLOSE_CODE, CLIENT_CLOSE_REASON);
        }
        self.health.update(|h| {
            h.connected = false;
            h.authenticated = false;
        });
        was_active || had_timer
    }

    fn open_attempt(&mut self, state: ConnectionState) {
        let Some(token) = self.token.clone() else {
            return;
        };

        self.generation += 1;
        self.attempt_started = Some(Instant::now());
        self.handshake = Some(AuthHandshake::new(token));
        self.set_state(state);

        debug!("Opening transport (attempt generation {})", self.generation);
        let events = TransportEvents::new(self.generation, self.input_tx.clone());
        if let Err(e) = self.transport.open(events) {
            error!("Failed to open transport: {}", e);
            self.on_transport_lost(e.to_string());
        }
    }

    // ---------------------------------------------------------------------
    // Transport events
    // ---------------------------------------------------------------------

    fn handle_transport(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation {
            debug!(
                "Discarding {:?} from stale attempt {} (current {})",
                event, generation, self.generation
            );
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(message) => self.on_frame(message),
            TransportEvent::Close(frame) => self.on_close(frame),
            TransportEvent::Error(e) => {
                warn!("Transport error: {}", e);
                self.on_transport_lost(e);
            }
        }
    }

    fn on_open(&mut self) {
        let elapsed = self.elapsed_since_attempt();
        let Some(handshake) = self.handshake.as_mut() else {
            debug!("Transport opened with no handshake pending");
            return;
        };

        // authenticate must be the first frame on every link
        let auth = handshake.begin();
        if let Err(e) = self.dispatcher.send_unchecked(&auth) {
            error!("Failed to send authentication: {}", e);
            self.on_transport_lost(e.to_string());
            return;
        }
        self.dispatcher.set_link_open(true);

        self.health.update(|h| {
            h.connected = true;
            h.retry_attempts = 0;
            h.connection_time_ms = elapsed;
        });
        self.set_state(ConnectionState::Authenticating);
        info!("Transport open, authenticating");
        self.emit(ClientEvent::Connected);
    }

    fn on_frame(&mut self, message: WsMessage) {
        self.metrics.increment_received();

        let envelope = match Envelope::parse(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                return;
            }
        };

        let outcome = self.handshake.as_mut().and_then(|h| h.resolve(&envelope));
        match outcome {
            Some(AuthOutcome::Authenticated) => self.on_authenticated(),
            Some(AuthOutcome::Rejected(reason)) => self.on_auth_rejected(reason),
            None => self.on_protocol_envelope(&envelope),
        }

        self.dispatcher.dispatch(&envelope);
    }

    fn on_protocol_envelope(&mut self, envelope: &Envelope) {
        match envelope.inbound_kind() {
            InboundKind::Ping => {
                let pong = self.heartbeat.answer_server_ping(envelope);
                if let Err(e) = self.dispatcher.send_unchecked(&pong) {
                    warn!("Failed to answer server ping: {}", e);
                }
            }
            InboundKind::Pong => {
                if let Some(rtt) = self.heartbeat.record_pong() {
                    debug!("Heartbeat round trip {:?}", rtt);
                    self.metrics.record_latency(rtt.as_millis() as u64);
                }
            }
            InboundKind::RoomJoined => match envelope.data_str("roomId") {
                Some(room) => self.rooms.acknowledge_joined(room),
                None => warn!("room_joined without roomId"),
            },
            InboundKind::RoomLeft => match envelope.data_str("roomId") {
                Some(room) => self.rooms.acknowledge_left(room),
                None => warn!("room_left without roomId"),
            },
            InboundKind::ConnectionRetry => {
                info!(
                    "Server reports retry {}/{}",
                    envelope.data_u64("attempt").unwrap_or(0),
                    envelope.data_u64("maxRetries").unwrap_or(0)
                );
            }
            InboundKind::MaxRetriesReached => {
                let message = envelope
                    .error_message()
                    .unwrap_or_else(|| RETRIES_EXHAUSTED_MESSAGE.to_string());
                warn!("Server reports retries exhausted: {}", message);
                self.health.update(|h| h.last_error = Some(message));
            }
            InboundKind::IdleTimeout => {
                info!(
                    "Server reports idle timeout after {}ms",
                    envelope.data_u64("idleTime").unwrap_or(0)
                );
            }
            InboundKind::MessageSent => {
                debug!(
                    "Server acknowledged message {}",
                    envelope.data_str("messageId").unwrap_or("<unknown>")
                );
            }
            InboundKind::Error => {
                let message = envelope
                    .error_message()
                    .unwrap_or_else(|| "Unknown server error".to_string());
                warn!("Server error: {}", message);
                self.health.update(|h| h.last_error = Some(message.clone()));
                self.emit(ClientEvent::ServerError(message));
            }
            InboundKind::ErrorHandled => debug!("Server marked error as handled"),
            InboundKind::Connected => debug!("Server greeting received"),
            InboundKind::Authenticated | InboundKind::AuthError => {
                debug!("'{}' with no handshake in progress", envelope.kind)
            }
            InboundKind::Application => {}
        }
    }

    fn on_authenticated(&mut self) {
        if self.state() != ConnectionState::Authenticating {
            debug!("Duplicate authenticated in state {:?}", self.state());
            return;
        }

        let elapsed = self.elapsed_since_attempt();
        self.health.update(|h| {
            h.authenticated = true;
            h.last_error = None;
            h.connection_time_ms = elapsed;
        });
        self.reconnect.reset();
        self.health.set_pending(None);
        self.set_state(ConnectionState::Connected);
        self.heartbeat.start();

        info!(
            "Authenticated ({}ms since attempt start)",
            elapsed.unwrap_or(0)
        );
        self.emit(ClientEvent::Authenticated);
        self.flush_pending_rooms();
    }

    fn flush_pending_rooms(&mut self) {
        for room in self.rooms.take_pending() {
            debug!("Joining room '{}'", room);
            if !self.dispatcher.send(&Envelope::join_room(&room)) {
                // Not on the wire; retry on the next authenticated link
                self.rooms.release(&room);
            }
        }
    }

    fn on_auth_rejected(&mut self, message: String) {
        error!("Authentication rejected: {}", message);
        self.teardown();
        self.health.update(|h| {
            h.authenticated = false;
            h.last_error = Some(message.clone());
        });
        self.set_state(ConnectionState::Failed);
        self.emit(ClientEvent::AuthFailed(message));
    }

    /// Close of the current link
    ///
    /// Closes the client issued itself always arrive stale, so anything that
    /// reaches here came from the server or the network, whatever its code.
    fn on_close(&mut self, frame: CloseFrame) {
        if frame.is_client_initiated() {
            warn!("Server closed with the client cleanup code, reconnecting anyway");
        }
        warn!("Connection closed ({}): {}", frame.code, frame.reason);
        let reason = if frame.reason.is_empty() {
            format!("Connection closed with code {}", frame.code)
        } else {
            frame.reason
        };
        self.on_transport_lost(reason);
    }

    /// Unintentional loss of the link: schedule the next attempt
    fn on_transport_lost(&mut self, reason: String) {
        self.heartbeat.stop();
        self.dispatcher.set_link_open(false);
        self.handshake = None;
        self.generation += 1;

        if self.config.replay_rooms_on_reconnect {
            self.rooms.mark_all_pending();
        }

        let was_connected = self.health.snapshot().connected;
        self.health.update(|h| {
            h.connected = false;
            h.authenticated = false;
            h.last_error = Some(reason.clone());
        });
        if was_connected {
            self.emit(ClientEvent::Disconnected(reason));
        }

        let attempts = self.health.snapshot().retry_attempts;
        match self.reconnect.schedule(attempts) {
            ScheduleOutcome::Scheduled(pending) => {
                info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    pending.delay,
                    pending.attempt,
                    self.reconnect.max_retries()
                );
                self.health.update(|h| h.retry_attempts = pending.attempt);
                self.set_state(ConnectionState::Reconnecting);
                self.emit(ClientEvent::Reconnecting {
                    attempt: pending.attempt,
                    delay: pending.delay,
                });
                self.health.set_pending(Some(pending));
            }
            ScheduleOutcome::Exhausted => {
                error!("{} ({})", RETRIES_EXHAUSTED_MESSAGE, attempts);
                self.health.set_pending(None);
                self.health
                    .update(|h| h.last_error = Some(RETRIES_EXHAUSTED_MESSAGE.to_string()));
                self.set_state(ConnectionState::Failed);
                self.emit(ClientEvent::RetriesExhausted);
            }
        }
    }

    fn on_reconnect_due(&mut self) {
        let Some(pending) = self.reconnect.take_due() else {
            return;
        };
        self.health.set_pending(None);
        self.metrics.increment_reconnects();
        info!("Reconnection attempt {}", pending.attempt);
        self.open_attempt(ConnectionState::Reconnecting);
    }

    fn on_heartbeat_tick(&mut self) {
        match self.heartbeat.check(self.transport.is_open()) {
            HeartbeatVerdict::Alive => {}
            HeartbeatVerdict::Probe(ping) => {
                if let Err(e) = self.dispatcher.send_unchecked(&ping) {
                    warn!("Failed to send heartbeat: {}", e);
                }
            }
            HeartbeatVerdict::Dead(reason) => {
                warn!("Heartbeat declared link dead: {}", reason);
                self.transport.close(CLIENT_CLOSE_CODE, CLIENT_CLOSE_REASON);
                self.on_transport_lost(format!("Heartbeat failed: {}", reason));
            }
        }
    }
}
