//! Request envelope, dispatch, and the trait the transports are generic over.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{PhaseCell, ServerPhase};
use crate::adapter::Adapter;
use crate::metrics::DispatchMetrics;
use crate::tools::{JsonObject, ToolError, ToolRegistry};

/// Incoming tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Caller-chosen correlation id, echoed in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Registered tool to run.
    pub tool_name: String,
    /// Argument object; absent means no arguments.
    #[serde(default)]
    pub arguments: JsonObject,
}

impl ToolRequest {
    /// Build a request without a correlation id.
    pub fn new(tool_name: impl Into<String>, arguments: JsonObject) -> Self {
        Self {
            id: None,
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Machine-readable failure carried by an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// One of `tool_not_found`, `invalid_arguments`, `invalid_request`, `tool_execution`.
    pub kind: String,
    /// Human-readable detail.
    pub message: String,
}

/// Either the tool output or a structured error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Handler output, verbatim.
    Result(Value),
    /// Failure description.
    Error(ErrorBody),
}

/// Reply envelope shared by every transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Correlation id copied from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// `result` or `error`, flattened into the envelope.
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ToolResponse {
    /// Successful reply.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Result(result),
        }
    }

    /// Error reply built from a [`ToolError`].
    pub fn failure(id: Option<Value>, error: &ToolError) -> Self {
        Self {
            id,
            outcome: Outcome::Error(ErrorBody {
                kind: error.kind().to_string(),
                message: error.to_string(),
            }),
        }
    }

    /// Error kind, if this is an error reply.
    pub fn error_kind(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(body) => Some(&body.kind),
        }
    }

    /// Result payload, if this is a successful reply.
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }
}

/// Entry of the `GET /tools` listing.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    /// Tool name.
    pub name: String,
    /// Human-readable summary.
    pub description: String,
    /// Argument schema.
    pub input_schema: Value,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Configured server name.
    pub server_name: String,
    /// Always `ok` while the server answers.
    pub status: &'static str,
    /// Adapter state label, or `disabled` in fallback mode.
    pub adapter: &'static str,
    /// Number of registered tools.
    pub tools: usize,
}

/// What the transports need from the server.
#[async_trait]
pub trait ToolDispatch: Send + Sync + 'static {
    /// Run one request to completion.
    async fn dispatch(&self, request: ToolRequest) -> ToolResponse;

    /// Registered tools in listing order.
    fn tools(&self) -> Vec<ToolSummary>;

    /// Liveness snapshot.
    fn health(&self) -> HealthReport;

    /// Parse a raw record and dispatch it. Unparseable input yields an `invalid_request`
    /// reply, carrying the record's `id` when one can be recovered.
    async fn dispatch_raw(&self, raw: &str) -> ToolResponse {
        match serde_json::from_str::<ToolRequest>(raw) {
            Ok(request) => self.dispatch(request).await,
            Err(err) => {
                tracing::warn!(error = %err, "Rejecting malformed request");
                let id = serde_json::from_str::<Value>(raw)
                    .ok()
                    .and_then(|value| value.get("id").cloned())
                    .filter(|id| !id.is_null());
                ToolResponse::failure(id, &ToolError::InvalidRequest(err.to_string()))
            }
        }
    }
}

/// Routes requests to the registry and keeps dispatch counters.
pub struct Dispatcher {
    server_name: String,
    registry: Arc<ToolRegistry>,
    metrics: Arc<DispatchMetrics>,
    adapter: Option<Arc<Adapter>>,
    phase: Arc<PhaseCell>,
    in_flight: AtomicUsize,
}

impl Dispatcher {
    /// Create a dispatcher over a finished registry.
    pub fn new(
        server_name: impl Into<String>,
        registry: Arc<ToolRegistry>,
        metrics: Arc<DispatchMetrics>,
        adapter: Option<Arc<Adapter>>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            registry,
            metrics,
            adapter,
            phase: Arc::new(PhaseCell::default()),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_phase(mut self, phase: Arc<PhaseCell>) -> Self {
        self.phase = phase;
        self
    }

    /// Registry the dispatcher routes to.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Dispatch counters.
    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }
}

#[async_trait]
impl ToolDispatch for Dispatcher {
    async fn dispatch(&self, request: ToolRequest) -> ToolResponse {
        let ToolRequest {
            id,
            tool_name,
            arguments,
        } = request;

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.phase.set(ServerPhase::Processing);
        let outcome = self.registry.invoke(&tool_name, arguments).await;
        self.phase.set(ServerPhase::Responding);

        let response = match outcome {
            Ok(result) => {
                self.metrics.record_call(true);
                tracing::debug!(tool = %tool_name, "Tool call succeeded");
                ToolResponse::success(id, result)
            }
            Err(error) => {
                match &error {
                    ToolError::NotFound(_) => self.metrics.record_unknown_tool(),
                    _ => self.metrics.record_call(false),
                }
                tracing::warn!(tool = %tool_name, kind = error.kind(), %error, "Tool call failed");
                ToolResponse::failure(id, &error)
            }
        };

        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.phase.set_if_active(ServerPhase::Listening);
        }
        response
    }

    fn tools(&self) -> Vec<ToolSummary> {
        self.registry
            .descriptors()
            .map(|descriptor| ToolSummary {
                name: descriptor.name().to_string(),
                description: descriptor.description().to_string(),
                input_schema: descriptor.input_schema().clone(),
            })
            .collect()
    }

    fn health(&self) -> HealthReport {
        HealthReport {
            server_name: self.server_name.clone(),
            status: "ok",
            adapter: self
                .adapter
                .as_ref()
                .map_or("disabled", |adapter| adapter.state().label()),
            tools: self.registry.len(),
        }
    }
}
