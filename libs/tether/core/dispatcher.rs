//! Message dispatcher
//!
//! Inbound: a type → single-handler map. Registering a second handler for a
//! type replaces the first; [`Subscription`] handles only ever remove their
//! own registration.
//!
//! Outbound: synchronous best-effort send. While the link is not open the
//! message is dropped with a warning. Nothing is buffered or queued; retry
//! and replay are the caller's responsibility.

use super::connection_state::AtomicMetrics;
use super::envelope::Envelope;
use crate::error::{Result, TetherError};
use crate::traits::{MessageHandler, TransportAdapter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

struct Registration {
    id: u64,
    handler: Arc<dyn MessageHandler>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No handler registered; logged and dropped
    Unhandled,
    /// Handler returned an error; logged
    Failed,
}

/// Handle to one handler registration
#[derive(Debug)]
pub struct Subscription {
    kind: String,
    id: u64,
    dispatcher: Weak<MessageDispatcher>,
}

impl Subscription {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Still the registered handler for its type
    pub fn is_active(&self) -> bool {
        self.dispatcher
            .upgrade()
            .map(|d| d.registration_id(&self.kind) == Some(self.id))
            .unwrap_or(false)
    }

    /// Remove this registration
    ///
    /// Returns false if it was already replaced or removed.
    pub fn unsubscribe(self) -> bool {
        match self.dispatcher.upgrade() {
            Some(dispatcher) => dispatcher.remove_registration(&self.kind, self.id),
            None => false,
        }
    }
}

pub struct MessageDispatcher {
    handlers: RwLock<HashMap<String, Registration>>,
    next_id: AtomicU64,
    transport: Arc<dyn TransportAdapter>,
    link_open: AtomicBool,
    metrics: Arc<AtomicMetrics>,
}

impl MessageDispatcher {
    pub fn new(transport: Arc<dyn TransportAdapter>, metrics: Arc<AtomicMetrics>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            transport,
            link_open: AtomicBool::new(false),
            metrics,
        }
    }

    // ---------------------------------------------------------------------
    // Inbound
    // ---------------------------------------------------------------------

    /// Register the handler for `kind`, replacing any previous one
    pub fn on<H>(self: &Arc<Self>, kind: impl Into<String>, handler: H) -> Subscription
    where
        H: MessageHandler,
    {
        let kind = kind.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.handlers.write().insert(
            kind.clone(),
            Registration {
                id,
                handler: Arc::new(handler),
            },
        );
        if previous.is_some() {
            debug!("Replaced handler for '{}'", kind);
        }

        Subscription {
            kind,
            id,
            dispatcher: Arc::downgrade(self),
        }
    }

    /// Remove the handler for `kind`; false if none was registered
    pub fn off(&self, kind: &str) -> bool {
        self.handlers.write().remove(kind).is_some()
    }

    fn registration_id(&self, kind: &str) -> Option<u64> {
        self.handlers.read().get(kind).map(|r| r.id)
    }

    fn remove_registration(&self, kind: &str, id: u64) -> bool {
        let mut handlers = self.handlers.write();
        match handlers.get(kind) {
            Some(registration) if registration.id == id => {
                handlers.remove(kind);
                true
            }
            _ => false,
        }
    }

    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.read().contains_key(kind)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Deliver an inbound envelope to its handler
    pub fn dispatch(&self, envelope: &Envelope) -> DispatchOutcome {
        // Clone out of the lock so handlers may call on/off themselves
        let handler = self
            .handlers
            .read()
            .get(&envelope.kind)
            .map(|r| Arc::clone(&r.handler));

        let Some(handler) = handler else {
            if envelope.inbound_kind().is_protocol() {
                debug!("No handler for protocol message '{}'", envelope.kind);
            } else {
                warn!("Unhandled message type '{}', dropping", envelope.kind);
            }
            return DispatchOutcome::Unhandled;
        };

        match handler.handle(envelope) {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) => {
                error!("Handler error for '{}': {}", envelope.kind, e);
                DispatchOutcome::Failed
            }
        }
    }

    // ---------------------------------------------------------------------
    // Outbound
    // ---------------------------------------------------------------------

    pub fn is_link_open(&self) -> bool {
        self.link_open.load(Ordering::Acquire)
    }

    pub(crate) fn set_link_open(&self, open: bool) {
        self.link_open.store(open, Ordering::Release);
    }

    /// Best-effort send; false if the message was dropped
    pub fn send(&self, envelope: &Envelope) -> bool {
        if !self.is_link_open() {
            warn!("Dropping '{}' message: transport not open", envelope.kind);
            self.metrics.increment_dropped();
            return false;
        }

        match self.send_unchecked(envelope) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping '{}' message: {}", envelope.kind, e);
                self.metrics.increment_dropped();
                false
            }
        }
    }

    /// Send without the link gate, used for the handshake itself
    pub(crate) fn send_unchecked(&self, envelope: &Envelope) -> Result<()> {
        let frame = envelope.to_frame()?;
        self.transport
            .send(frame)
            .map_err(|e| TetherError::Transport(e.to_string()))?;
        self.metrics.increment_sent();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{TransportEvents, WsMessage};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<WsMessage>>,
    }

    impl TransportAdapter for RecordingTransport {
        fn open(&self, _events: TransportEvents) -> Result<()> {
            Ok(())
        }

        fn send(&self, message: WsMessage) -> Result<()> {
            self.sent.lock().push(message);
            Ok(())
        }

        fn close(&self, _code: u16, _reason: &str) {}

        fn is_open(&self) -> bool {
            true
        }
    }

    fn dispatcher() -> (Arc<MessageDispatcher>, Arc<RecordingTransport>, Arc<AtomicMetrics>) {
        let transport = Arc::new(RecordingTransport::default());
        let metrics = Arc::new(AtomicMetrics::new());
        let dispatcher = Arc::new(MessageDispatcher::new(
            transport.clone() as Arc<dyn TransportAdapter>,
            Arc::clone(&metrics),
        ));
        (dispatcher, transport, metrics)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Envelope) -> Result<()>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let handler = move |_: &Envelope| -> Result<()> {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        (count, handler)
    }

    #[test]
    fn test_on_then_off_leaves_type_unhandled() {
        let (dispatcher, _, _) = dispatcher();
        let (count, handler) = counter();

        let _sub = dispatcher.on("chat", handler);
        assert_eq!(dispatcher.dispatch(&Envelope::new("chat")), DispatchOutcome::Handled);

        assert!(dispatcher.off("chat"));
        assert_eq!(dispatcher.dispatch(&Envelope::new("chat")), DispatchOutcome::Unhandled);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_last_registration_wins() {
        let (dispatcher, _, _) = dispatcher();
        let (first, h1) = counter();
        let (second, h2) = counter();

        let old = dispatcher.on("chat", h1);
        let new = dispatcher.on("chat", h2);
        dispatcher.dispatch(&Envelope::new("chat"));

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        // The replaced handle must not remove the newer registration
        assert!(!old.is_active());
        assert!(!old.unsubscribe());
        assert!(new.is_active());
        assert!(dispatcher.has_handler("chat"));
        assert!(new.unsubscribe());
        assert_eq!(dispatcher.handler_count(), 0);
    }

    #[test]
    fn test_handler_error_is_contained() {
        let (dispatcher, _, _) = dispatcher();
        let _sub = dispatcher.on("chat", |_: &Envelope| -> Result<()> {
            Err(TetherError::Application("bad payload".into()))
        });
        assert_eq!(dispatcher.dispatch(&Envelope::new("chat")), DispatchOutcome::Failed);
    }

    #[test]
    fn test_send_is_dropped_while_link_closed() {
        let (dispatcher, transport, metrics) = dispatcher();

        assert!(!dispatcher.send(&Envelope::new("chat")));
        assert!(transport.sent.lock().is_empty());
        assert_eq!(metrics.messages_dropped(), 1);

        dispatcher.set_link_open(true);
        assert!(dispatcher.send(&Envelope::new("chat")));
        assert_eq!(transport.sent.lock().len(), 1);
        assert_eq!(metrics.messages_sent(), 1);
    }
}
