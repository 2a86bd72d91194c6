pub mod states;

use crate::config::SupervisorConfig;
use crate::heartbeat::HeartbeatStrategy;
use crate::supervisor::ConnectionSupervisor;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for [`ConnectionSupervisor`]
///
/// The transport is the only required piece; everything else falls back to
/// [`SupervisorConfig::default`].
pub struct SupervisorBuilder<T>
where
    T: TransportState,
{
    _state: TypeState<T>,
    transport: Option<Arc<dyn TransportAdapter>>,
    config: SupervisorConfig,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl SupervisorBuilder<NoTransport> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            transport: None,
            config: SupervisorConfig::default(),
            reconnect_strategy: None,
        }
    }

    /// Set the transport adapter
    pub fn transport<A>(self, transport: A) -> SupervisorBuilder<HasTransport>
    where
        A: TransportAdapter,
    {
        self.shared_transport(Arc::new(transport))
    }

    /// Set a transport adapter the caller keeps a handle to
    pub fn shared_transport(
        self,
        transport: Arc<dyn TransportAdapter>,
    ) -> SupervisorBuilder<HasTransport> {
        SupervisorBuilder {
            _state: TypeState::new(),
            transport: Some(transport),
            config: self.config,
            reconnect_strategy: self.reconnect_strategy,
        }
    }
}

impl Default for SupervisorBuilder<NoTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SupervisorBuilder<T>
where
    T: TransportState,
{
    /// Replace the whole configuration
    pub fn config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    /// Heartbeat strategy and period
    pub fn heartbeat(mut self, strategy: HeartbeatStrategy, interval: Duration) -> Self {
        self.config.heartbeat_strategy = strategy;
        self.config.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Custom reconnection delay schedule
    ///
    /// Without one, exponential backoff is derived from the config.
    pub fn reconnect_strategy<S>(mut self, strategy: S) -> Self
    where
        S: ReconnectionStrategy + 'static,
    {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Re-send `join_room` for tracked rooms after every re-authentication
    pub fn replay_rooms(mut self, enabled: bool) -> Self {
        self.config.replay_rooms_on_reconnect = enabled;
        self
    }
}

impl SupervisorBuilder<HasTransport> {
    /// Validate the configuration and spawn the supervisor
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(self) -> Result<ConnectionSupervisor> {
        self.config
            .validate()
            .map_err(|e| TetherError::Configuration(e.to_string()))?;

        let transport = self
            .transport
            .ok_or_else(|| TetherError::Configuration("transport must be set".into()))?;

        let config = self.config;
        let reconnect_strategy = self.reconnect_strategy.unwrap_or_else(|| {
            Box::new(ExponentialBackoff::new(
                config.base_delay(),
                config.max_delay(),
                Some(config.max_retries),
            ))
        });

        Ok(ConnectionSupervisor::spawn(config, transport, reconnect_strategy))
    }
}
