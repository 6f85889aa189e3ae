//! Transport server.
//!
//! [`MemoryServer::new`] builds the component bundle through the adapter, hands component
//! handles to the tool providers, and merges their capability lists into one registry. The
//! configured transport is bound by [`MemoryServer::run`]; all three bindings share the same
//! [`Dispatcher`], so a request produces the same reply envelope on every transport.

use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::adapter::{Adapter, AdapterError};
use crate::config::{AdapterConfig, ConfigError, ServerConfig, TransportKind};
use crate::metrics::DispatchMetrics;
use crate::tools::{
    CollisionPolicy, RegistryError, ToolProvider, ToolRegistry, fallback::FileMemoryTools,
    memory::MemoryTools, prompt::PromptTools, short_term::ShortTermTools, status::StatusTools,
    temporal::TemporalTools,
};

pub mod dispatch;
pub mod http;
pub mod stdio;
pub mod websocket;

pub use dispatch::{
    Dispatcher, ErrorBody, HealthReport, Outcome, ToolDispatch, ToolRequest, ToolResponse,
    ToolSummary,
};
pub use stdio::serve_stdio;

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The transport name is not one of `stdio`, `http`, `websocket`.
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),
    /// The component bundle could not be built.
    #[error("Initialization failed: {0}")]
    Initialization(#[from] AdapterError),
    /// Providers could not be merged into the registry.
    #[error("Tool registration failed: {0}")]
    Registry(#[from] RegistryError),
    /// The listening socket could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address we attempted to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Transport I/O failed.
    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnsupportedTransport(name) => Self::UnsupportedTransport(name),
            other => Self::Initialization(other.into()),
        }
    }
}

/// Lifecycle of a server instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerPhase {
    /// Configuration accepted.
    #[default]
    Constructed,
    /// Registry built; nothing bound yet.
    ToolsRegistered,
    /// Transport bound and waiting for requests.
    Listening,
    /// At least one request is being handled.
    Processing,
    /// A reply is being produced.
    Responding,
    /// Transport closed.
    Stopped,
}

#[derive(Debug, Default)]
pub(crate) struct PhaseCell(Mutex<ServerPhase>);

impl PhaseCell {
    pub(crate) fn get(&self) -> ServerPhase {
        *self.guard()
    }

    pub(crate) fn set(&self, next: ServerPhase) {
        let mut phase = self.guard();
        if *phase != ServerPhase::Stopped {
            *phase = next;
        }
    }

    /// Return to `next` only from the request-handling phases.
    pub(crate) fn set_if_active(&self, next: ServerPhase) {
        let mut phase = self.guard();
        if matches!(*phase, ServerPhase::Processing | ServerPhase::Responding) {
            *phase = next;
        }
    }

    fn stop(&self) {
        *self.guard() = ServerPhase::Stopped;
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ServerPhase> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Server bound to one transport, owning the adapter and the tool registry.
pub struct MemoryServer {
    config: ServerConfig,
    adapter: Option<Arc<Adapter>>,
    dispatcher: Arc<Dispatcher>,
    phase: Arc<PhaseCell>,
}

impl MemoryServer {
    /// Build the component bundle (unless in fallback mode) and register every provider.
    pub fn new(config: ServerConfig, adapter_config: AdapterConfig) -> Result<Self, ServerError> {
        Self::with_policy(config, adapter_config, CollisionPolicy::default())
    }

    /// Like [`MemoryServer::new`] with an explicit name-collision policy.
    pub fn with_policy(
        config: ServerConfig,
        adapter_config: AdapterConfig,
        policy: CollisionPolicy,
    ) -> Result<Self, ServerError> {
        let phase = Arc::new(PhaseCell::default());
        let metrics = Arc::new(DispatchMetrics::new());

        let (adapter, mut providers) = if config.fallback {
            tracing::info!(data_dir = %config.data_dir.display(), "Fallback mode: serving flat-file memories");
            let providers: Vec<Arc<dyn ToolProvider>> =
                vec![Arc::new(FileMemoryTools::new(config.data_dir.clone()))];
            (None, providers)
        } else {
            let adapter = Arc::new(Adapter::new(adapter_config));
            let providers: Vec<Arc<dyn ToolProvider>> = vec![
                Arc::new(MemoryTools::new(adapter.block_store()?, adapter.cache_layer()?)),
                Arc::new(ShortTermTools::new(adapter.short_term_store()?)),
                Arc::new(PromptTools::new(adapter.prompt_composer()?)),
                Arc::new(TemporalTools::new(adapter.temporal_reasoner()?)),
            ];
            (Some(adapter), providers)
        };
        providers.insert(
            0,
            Arc::new(StatusTools::new(
                config.server_name.clone(),
                config.data_dir.clone(),
                config.transport,
                adapter.clone(),
                metrics.clone(),
            )),
        );

        let registry = ToolRegistry::from_providers(providers, policy)?;
        tracing::info!(
            server = %config.server_name,
            transport = %config.transport,
            tools = registry.len(),
            "Tools registered"
        );
        phase.set(ServerPhase::ToolsRegistered);

        let dispatcher = Dispatcher::new(
            config.server_name.clone(),
            Arc::new(registry),
            metrics,
            adapter.clone(),
        )
        .with_phase(phase.clone());

        Ok(Self {
            config,
            adapter,
            dispatcher: Arc::new(dispatcher),
            phase,
        })
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ServerPhase {
        self.phase.get()
    }

    /// Registered tools.
    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    /// Shared dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Adapter owning the component bundle; `None` in fallback mode.
    pub fn adapter(&self) -> Option<&Arc<Adapter>> {
        self.adapter.as_ref()
    }

    /// Serve the configured transport until EOF (stdio) or Ctrl-C (HTTP, WebSocket).
    pub async fn run(&self) -> Result<(), ServerError> {
        match self.config.transport {
            TransportKind::Stdio => {
                self.phase.set(ServerPhase::Listening);
                let outcome =
                    serve_stdio(&*self.dispatcher, tokio::io::stdin(), tokio::io::stdout()).await;
                self.phase.stop();
                outcome
            }
            TransportKind::Http | TransportKind::WebSocket => {
                let addr = format!("{}:{}", self.config.host, self.config.port);
                let listener = TcpListener::bind(&addr)
                    .await
                    .map_err(|source| ServerError::Bind { addr, source })?;
                self.serve(listener, shutdown_signal()).await
            }
        }
    }

    /// Serve the HTTP or WebSocket router on an already bound listener until `shutdown`
    /// resolves. The stdio transport has no listener and is rejected.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = match self.config.transport {
            TransportKind::Http => http::create_router(self.dispatcher.clone()),
            TransportKind::WebSocket => websocket::create_router(self.dispatcher.clone()),
            TransportKind::Stdio => {
                return Err(ServerError::UnsupportedTransport(
                    "stdio cannot be served on a socket".into(),
                ));
            }
        };

        let local = listener.local_addr()?;
        self.phase.set(ServerPhase::Listening);
        tracing::info!(
            transport = %self.config.transport,
            "Listening on {local}"
        );
        let outcome = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;
        self.phase.stop();
        tracing::info!("Server stopped");
        Ok(outcome?)
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
