//! `server_status` provider: server identity, adapter state, and dispatch counters.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use super::{NoArguments, ToolCapability, ToolError, ToolProvider};
use crate::adapter::Adapter;
use crate::config::TransportKind;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};

/// Payload returned by `server_status`.
#[derive(Debug, Serialize)]
pub struct ServerStatus {
    /// Configured server name.
    pub server_name: String,
    /// Directory holding persisted records.
    pub data_directory: String,
    /// Active transport label.
    pub transport: &'static str,
    /// Always `running` while the server answers.
    pub status: &'static str,
    /// Adapter state label, or `disabled` in fallback mode.
    pub adapter: &'static str,
    /// Dispatch counters since startup.
    pub metrics: MetricsSnapshot,
}

/// Reports server identity and health.
pub struct StatusTools {
    server_name: String,
    data_dir: PathBuf,
    transport: TransportKind,
    adapter: Option<Arc<Adapter>>,
    metrics: Arc<DispatchMetrics>,
}

impl StatusTools {
    /// Create the provider. `adapter` is `None` when the server runs in fallback mode.
    pub fn new(
        server_name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        transport: TransportKind,
        adapter: Option<Arc<Adapter>>,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            data_dir: data_dir.into(),
            transport,
            adapter,
            metrics,
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            server_name: self.server_name.clone(),
            data_directory: self.data_dir.display().to_string(),
            transport: self.transport.as_str(),
            status: "running",
            adapter: self
                .adapter
                .as_ref()
                .map_or("disabled", |adapter| adapter.state().label()),
            metrics: self.metrics.snapshot(),
        }
    }
}

impl ToolProvider for StatusTools {
    fn provider_name(&self) -> &'static str {
        "status"
    }

    fn capabilities(self: Arc<Self>) -> Vec<ToolCapability> {
        vec![ToolCapability::new(
            "server_status",
            "Report the server name, data directory, transport, and dispatch counters.",
            move |_: NoArguments| {
                let tools = self.clone();
                async move { Ok::<_, ToolError>(tools.status()) }
            },
        )]
    }
}
