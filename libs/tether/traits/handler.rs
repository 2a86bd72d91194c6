//! Message Handler Trait
//!
//! Handlers are registered per envelope type on the supervisor. Exactly one
//! handler exists per type; a second registration replaces the first.
//!
//! # Ordering Guarantees
//!
//! Handlers run inside the supervisor's driver task, one at a time, in the
//! order the transport delivered the frames. A handler returning never blocks
//! the next message longer than its own execution.

use crate::core::envelope::Envelope;
use crate::error::Result;

/// Handler for one envelope type
///
/// # Example
///
/// ```ignore
/// struct ChatHandler {
///     received: Arc<AtomicU64>,
/// }
///
/// impl MessageHandler for ChatHandler {
///     fn handle(&self, envelope: &Envelope) -> Result<()> {
///         self.received.fetch_add(1, Ordering::Relaxed);
///         Ok(())
///     }
/// }
/// ```
///
/// Closures `Fn(&Envelope) -> Result<()>` are handlers too.
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle an inbound envelope
    ///
    /// **Important**: this runs on the driver task. Keep it short and never
    /// block; hand heavy work off to another task.
    ///
    /// # Errors
    /// Errors are logged and the next message is processed normally.
    fn handle(&self, envelope: &Envelope) -> Result<()>;
}

impl<F> MessageHandler for F
where
    F: Fn(&Envelope) -> Result<()> + Send + Sync + 'static,
{
    fn handle(&self, envelope: &Envelope) -> Result<()> {
        self(envelope)
    }
}
