use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;

use super::{JsonObject, ToolError, ToolHandler, ToolProvider};

/// What to do when two capabilities share a name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// The later registration replaces the earlier one.
    #[default]
    Overwrite,
    /// Registration fails with [`RegistryError::DuplicateTool`].
    Reject,
}

/// Errors raised while building the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two capabilities share a name under [`CollisionPolicy::Reject`].
    #[error("Tool `{name}` from provider `{provider}` collides with provider `{previous}`")]
    DuplicateTool {
        /// Colliding tool name.
        name: String,
        /// Provider attempting the registration.
        provider: &'static str,
        /// Provider already holding the name.
        previous: &'static str,
    },
    /// A capability declared a schema that does not compile.
    #[error("Tool `{name}` has an invalid argument schema: {reason}")]
    InvalidSchema {
        /// Tool name.
        name: String,
        /// Compiler message.
        reason: String,
    },
}

/// A registered tool.
pub struct ToolDescriptor {
    name: String,
    description: String,
    provider: &'static str,
    input_schema: Value,
    validator: jsonschema::Validator,
    handler: ToolHandler,
}

impl ToolDescriptor {
    /// Registry key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable summary.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Provider that declared the tool.
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// JSON schema of the argument object.
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    fn validate(&self, arguments: &JsonObject) -> Result<(), ToolError> {
        let instance = Value::Object(arguments.clone());
        let problems: Vec<String> = self
            .validator
            .iter_errors(&instance)
            .map(|error| error.to_string())
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments(problems.join("; ")))
        }
    }
}

/// Name-to-handler table built once at server construction and read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
    order: Vec<String>,
    policy: CollisionPolicy,
}

impl ToolRegistry {
    /// Create an empty registry with the given collision policy.
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            policy,
        }
    }

    /// Build a registry from providers, processed in the order supplied.
    pub fn from_providers<I>(providers: I, policy: CollisionPolicy) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = Arc<dyn ToolProvider>>,
    {
        let mut registry = Self::new(policy);
        for provider in providers {
            registry.register_provider(provider)?;
        }
        Ok(registry)
    }

    /// Merge one provider's capability list; returns how many tools it registered.
    pub fn register_provider(&mut self, provider: Arc<dyn ToolProvider>) -> Result<usize, RegistryError> {
        let provider_name = provider.provider_name();
        let mut registered = 0;
        for capability in provider.capabilities() {
            if capability.is_private() {
                tracing::debug!(
                    provider = provider_name,
                    tool = %capability.name,
                    "Skipping private capability"
                );
                continue;
            }

            if let Some(existing) = self.tools.get(&capability.name) {
                match self.policy {
                    CollisionPolicy::Reject => {
                        return Err(RegistryError::DuplicateTool {
                            name: capability.name,
                            provider: provider_name,
                            previous: existing.provider,
                        });
                    }
                    CollisionPolicy::Overwrite => {
                        tracing::warn!(
                            tool = %capability.name,
                            provider = provider_name,
                            previous = existing.provider,
                            "Tool name collision; later registration wins"
                        );
                    }
                }
            } else {
                self.order.push(capability.name.clone());
            }

            let validator = jsonschema::validator_for(&capability.input_schema).map_err(|err| {
                RegistryError::InvalidSchema {
                    name: capability.name.clone(),
                    reason: err.to_string(),
                }
            })?;
            let descriptor = ToolDescriptor {
                name: capability.name.clone(),
                description: capability.description,
                provider: provider_name,
                input_schema: capability.input_schema,
                validator,
                handler: capability.handler,
            };
            self.tools.insert(capability.name, descriptor);
            registered += 1;
        }
        tracing::debug!(provider = provider_name, registered, "Provider registered");
        Ok(registered)
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Registered names in first-registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Registered descriptors in first-registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate arguments and run the named tool. Handler failures, including panics, come
    /// back as [`ToolError`] values.
    pub async fn invoke(&self, name: &str, arguments: JsonObject) -> Result<Value, ToolError> {
        let descriptor = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        descriptor.validate(&arguments)?;

        let future = (descriptor.handler)(arguments);
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|text| text.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                tracing::error!(tool = name, %message, "Tool handler panicked");
                Err(ToolError::Execution(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{NoArguments, ToolCapability};
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    struct Labelled {
        label: &'static str,
        names: Vec<&'static str>,
    }

    impl ToolProvider for Labelled {
        fn provider_name(&self) -> &'static str {
            self.label
        }

        fn capabilities(self: Arc<Self>) -> Vec<ToolCapability> {
            self.names
                .iter()
                .map(|name| {
                    let this = self.clone();
                    ToolCapability::new(name, "labelled", move |_: NoArguments| {
                        let label = this.label;
                        async move { Ok::<_, ToolError>(label) }
                    })
                })
                .collect()
        }
    }

    fn provider(label: &'static str, names: &[&'static str]) -> Arc<dyn ToolProvider> {
        Arc::new(Labelled {
            label,
            names: names.to_vec(),
        })
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Bounded {
        #[schemars(range(min = 1))]
        count: u32,
    }

    struct Fallible;

    impl ToolProvider for Fallible {
        fn provider_name(&self) -> &'static str {
            "fallible"
        }

        fn capabilities(self: Arc<Self>) -> Vec<ToolCapability> {
            vec![
                ToolCapability::new("bounded", "needs count >= 1", |args: Bounded| async move {
                    Ok::<_, ToolError>(args.count)
                }),
                ToolCapability::new("fails", "always errors", |_: NoArguments| async move {
                    Err::<Value, _>(ToolError::execution("disk on fire"))
                }),
                ToolCapability::new("panics", "always panics", |_: NoArguments| async move {
                    if true {
                        panic!("handler exploded");
                    }
                    Ok::<_, ToolError>(Value::Null)
                }),
            ]
        }
    }

    #[test]
    fn private_capabilities_are_skipped() {
        let registry = ToolRegistry::from_providers(
            [
                provider("a", &["alpha", "_hidden", "beta"]),
                provider("b", &["gamma", "_internal"]),
            ],
            CollisionPolicy::Overwrite,
        )
        .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["alpha", "beta", "gamma"]);
        assert!(registry.get("_hidden").is_none());
    }

    #[tokio::test]
    async fn later_provider_wins_name_collision() {
        let registry = ToolRegistry::from_providers(
            [provider("first", &["status"]), provider("second", &["status"])],
            CollisionPolicy::Overwrite,
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("status").unwrap().provider(), "second");
        let output = registry.invoke("status", JsonObject::new()).await.unwrap();
        assert_eq!(output, json!("second"));
    }

    #[test]
    fn reject_policy_fails_on_collision() {
        let result = ToolRegistry::from_providers(
            [provider("first", &["status"]), provider("second", &["status"])],
            CollisionPolicy::Reject,
        );

        match result {
            Err(RegistryError::DuplicateTool {
                name,
                provider,
                previous,
            }) => {
                assert_eq!(name, "status");
                assert_eq!(provider, "second");
                assert_eq!(previous, "first");
            }
            _ => panic!("expected duplicate tool error"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new(CollisionPolicy::Overwrite);
        let err = registry.invoke("missing", JsonObject::new()).await.unwrap_err();
        assert_eq!(err, ToolError::NotFound("missing".into()));
    }

    #[tokio::test]
    async fn schema_violations_are_rejected_before_dispatch() {
        let registry =
            ToolRegistry::from_providers([Arc::new(Fallible) as Arc<dyn ToolProvider>], CollisionPolicy::Reject)
                .unwrap();

        let args = json!({ "count": 0 }).as_object().unwrap().clone();
        let err = registry.invoke("bounded", args).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");

        let args = json!({ "count": 3 }).as_object().unwrap().clone();
        assert_eq!(registry.invoke("bounded", args).await.unwrap(), json!(3));
    }

    #[tokio::test]
    async fn handler_errors_and_panics_become_tool_errors() {
        let registry =
            ToolRegistry::from_providers([Arc::new(Fallible) as Arc<dyn ToolProvider>], CollisionPolicy::Reject)
                .unwrap();

        let err = registry.invoke("fails", JsonObject::new()).await.unwrap_err();
        assert_eq!(err, ToolError::Execution("disk on fire".into()));

        let err = registry.invoke("panics", JsonObject::new()).await.unwrap_err();
        assert_eq!(err, ToolError::Execution("handler exploded".into()));
    }
}
