//! Channel builder for configuring reconnection and other options
//!
//! The `ChannelBuilder` provides a fluent API for configuring a channel
//! before it connects. It allows you to:
//! - Replace the reconnect schedule
//! - Reconnect automatically whenever the channel disconnects
//! - Swap the transport (e.g. an in-memory connector in tests)
//! - Register listeners that must see the very first `connect`
//! - Configure observability (OpenTelemetry)
//!
//! Options are fixed once the channel is built.
//!
//! # Examples
//!
//! ```rust,no_run
//! use resock_client::{ChannelBuilder, ExponentialBackoff, Listener};
//! use std::time::Duration;
//!
//! # async fn example() -> resock_core::Result<()> {
//! let channel = ChannelBuilder::new("ws://localhost:8080")
//!     .with_reconnect(Box::new(
//!         ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(10))
//!             .with_max_attempts(20),
//!     ))
//!     .auto_reconnect(true)
//!     .on("connect", Listener::new(|_, _| println!("connected")))
//!     .connect()?;
//!
//! // With observability
//! let traced = ChannelBuilder::new("ws://localhost:8080")
//!     .with_default_observability()
//!     .service_name("my-app")
//!     .connect()?;
//! # Ok(())
//! # }
//! ```

use crate::channel::{Channel, Settings};
use crate::events::{Context, EventRegistry, Listener};
use crate::metrics::ChannelMetrics;
use crate::reconnect::{ExponentialBackoff, ReconnectionStrategy};
use crate::transport::{Connector, WebSocketConnector};
use resock_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;

/// Builder for configuring and creating a [`Channel`]
pub struct ChannelBuilder {
    address: String,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    auto_reconnect: bool,
    connector: Option<Arc<dyn Connector>>,
    context: Option<Context>,
    listeners: Vec<(String, Listener, Option<Context>)>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ChannelBuilder {
    /// Create a new channel builder
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reconnect_strategy: None,
            auto_reconnect: false,
            connector: None,
            context: None,
            listeners: Vec::new(),
            observability_config: None,
            service_name: None,
        }
    }

    /// Use `strategy` for reconnect sequences instead of the default backoff
    pub fn with_reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self
    }

    /// Start a reconnect sequence whenever `disconnect` is published (off by default)
    pub fn auto_reconnect(mut self, enable: bool) -> Self {
        self.auto_reconnect = enable;
        self
    }

    /// Open transports through `connector` instead of WebSocket
    pub fn with_connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Use `context` as the channel's default listener receiver
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Register a listener before the first transport opens
    pub fn on(mut self, name: impl Into<String>, listener: Listener) -> Self {
        self.listeners.push((name.into(), listener, None));
        self
    }

    /// Register a listener with an explicit receiver before the first transport opens
    pub fn on_with_context(
        mut self,
        name: impl Into<String>,
        listener: Listener,
        context: Context,
    ) -> Self {
        self.listeners.push((name.into(), listener, Some(context)));
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build the channel and start connecting
    ///
    /// Must be called from within a tokio runtime. The first open completes
    /// in the background and is announced by a `connect` event.
    #[tracing::instrument(skip(self), fields(address = %self.address))]
    pub fn connect(self) -> Result<Channel> {
        if self.address.is_empty() {
            return Err(Error::InvalidConfig("address must not be empty".to_string()));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::InvalidConfig("a channel must be created inside a tokio runtime".to_string())
        })?;

        // Initialize observability if configured
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            resock_core::init_observability(config.clone())
                .map_err(|e| Error::Internal(format!("Failed to initialize observability: {}", e)))?;

            Some(Arc::new(ChannelMetrics::new(config.service_name.clone())))
        } else {
            None
        };

        let mut registry = match self.context {
            Some(context) => EventRegistry::with_context(context),
            None => EventRegistry::new(),
        };
        for (name, listener, context) in self.listeners {
            registry.on(name, listener, context);
        }

        let strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(ExponentialBackoff::default()));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector));

        tracing::debug!(auto_reconnect = self.auto_reconnect, "Starting channel");

        Ok(Channel::start(
            &runtime,
            Settings {
                address: self.address,
                registry,
                strategy,
                connector,
                auto_reconnect: self.auto_reconnect,
                metrics,
            },
        ))
    }
}

impl std::fmt::Debug for ChannelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBuilder")
            .field("address", &self.address)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("listeners", &self.listeners.len())
            .field("observability", &self.observability_config.is_some())
            .finish_non_exhaustive()
    }
}
