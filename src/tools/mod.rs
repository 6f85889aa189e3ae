//! Tool providers and the registry that merges them.
//!
//! A provider declares its remotely callable operations as an ordered list of
//! [`ToolCapability`] values: name, description, argument schema, and an async handler closing
//! over the provider instance. The [`ToolRegistry`] merges those lists into a single
//! name-to-handler table; the transports only ever talk to the registry.

use std::{future::Future, pin::Pin, sync::Arc};

use schemars::JsonSchema;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::engine::StoreError;

pub mod fallback;
pub mod memory;
pub mod prompt;
mod registry;
pub mod short_term;
pub mod status;
pub mod temporal;

pub use registry::{CollisionPolicy, RegistryError, ToolDescriptor, ToolRegistry};

/// JSON object carrying tool arguments.
pub type JsonObject = Map<String, Value>;
/// Boxed future returned by every tool handler.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;
/// Async callable bound to a provider instance.
pub type ToolHandler = Arc<dyn Fn(JsonObject) -> ToolFuture + Send + Sync>;

/// Name prefix marking a capability as internal; such capabilities are never registered.
pub const PRIVATE_PREFIX: char = '_';

/// Failures reported to callers as structured error responses.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// No tool is registered under the requested name.
    #[error("Tool not found: {0}")]
    NotFound(String),
    /// Arguments failed schema validation or deserialization.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    /// The request envelope itself was malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The handler ran and failed.
    #[error("{0}")]
    Execution(String),
}

impl ToolError {
    /// Stable machine-readable kind used in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "tool_not_found",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Execution(_) => "tool_execution",
        }
    }

    /// Build an execution error from any displayable failure.
    pub fn execution(err: impl std::fmt::Display) -> Self {
        Self::Execution(err.to_string())
    }
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        Self::execution(err)
    }
}

/// One remotely callable operation declared by a provider.
pub struct ToolCapability {
    /// Registry key.
    pub name: String,
    /// Human-readable summary shown by `list-tools` and `GET /tools`.
    pub description: String,
    /// JSON schema of the argument object.
    pub input_schema: Value,
    /// Handler bound to the declaring provider.
    pub handler: ToolHandler,
}

impl ToolCapability {
    /// Declare a typed operation. Arguments are deserialized into `A`, whose schema is
    /// generated from the type; the handler's output is serialized verbatim as the result.
    pub fn new<A, F, Fut, T>(name: &str, description: &str, handler: F) -> Self
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ToolError>> + Send + 'static,
        T: Serialize,
    {
        let handler = Arc::new(handler);
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: input_schema::<A>(),
            handler: Arc::new(move |arguments: JsonObject| -> ToolFuture {
                let handler = handler.clone();
                Box::pin(async move {
                    let args: A = parse_arguments(arguments)?;
                    let output = handler(args).await?;
                    serde_json::to_value(output).map_err(ToolError::execution)
                })
            }),
        }
    }

    /// Whether the name follows the private-member convention.
    pub fn is_private(&self) -> bool {
        self.name.starts_with(PRIVATE_PREFIX)
    }
}

/// An object exposing tools. Capability order is the provider's declaration order.
pub trait ToolProvider: Send + Sync + 'static {
    /// Label used in logs and tool listings.
    fn provider_name(&self) -> &'static str;

    /// Ordered capability list; handlers keep a reference to this instance.
    fn capabilities(self: Arc<Self>) -> Vec<ToolCapability>;
}

/// Argument type for tools that take no arguments.
#[derive(Debug, Default, serde::Deserialize, JsonSchema)]
pub struct NoArguments {}

/// Generate the JSON schema for an argument type.
pub fn input_schema<A: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(A)).unwrap_or_else(|error| {
        tracing::warn!(%error, "Failed to render argument schema; accepting any object");
        json!({ "type": "object" })
    })
}

/// Deserialize structured arguments supplied to a tool invocation.
pub(crate) fn parse_arguments<T: DeserializeOwned>(arguments: JsonObject) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|err| ToolError::InvalidArguments(err.to_string()))
}
