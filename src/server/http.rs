//! HTTP surface.
//!
//! - `POST /tools/call` – Run a tool from a full request envelope
//!   (`{"id": .., "tool_name": "..", "arguments": {..}}`).
//! - `POST /tools/:name` – Run the named tool with the body as its argument object. An empty
//!   body means no arguments.
//! - `GET /tools` – List registered tools with their argument schemas.
//! - `GET /health` – Server name, adapter state, and tool count.
//!
//! `/tools/call` always takes an envelope, so a tool registered under the name `call` is only
//! reachable through it, never with a bare argument body.
//!
//! Replies use the same envelope as the stdio and WebSocket bindings. The status code follows
//! the error kind: 404 for `tool_not_found`, 400 for `invalid_arguments` and `invalid_request`,
//! 500 for `tool_execution`.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::Value;

use super::dispatch::{HealthReport, ToolDispatch, ToolRequest, ToolResponse, ToolSummary};
use crate::tools::{JsonObject, ToolError};

/// Build the HTTP router over a dispatcher.
pub fn create_router<D>(dispatch: Arc<D>) -> Router
where
    D: ToolDispatch,
{
    Router::new()
        .route("/tools", get(list_tools::<D>))
        .route("/tools/call", post(call_envelope::<D>))
        .route("/tools/:name", post(call_named::<D>))
        .route("/health", get(health::<D>))
        .with_state(dispatch)
}

async fn list_tools<D>(State(dispatch): State<Arc<D>>) -> Json<Vec<ToolSummary>>
where
    D: ToolDispatch,
{
    Json(dispatch.tools())
}

pub(super) async fn health<D>(State(dispatch): State<Arc<D>>) -> Json<HealthReport>
where
    D: ToolDispatch,
{
    Json(dispatch.health())
}

async fn call_envelope<D>(State(dispatch): State<Arc<D>>, body: Bytes) -> EnvelopeReply
where
    D: ToolDispatch,
{
    let raw = String::from_utf8_lossy(&body);
    EnvelopeReply(dispatch.dispatch_raw(&raw).await)
}

async fn call_named<D>(
    State(dispatch): State<Arc<D>>,
    Path(name): Path<String>,
    body: Bytes,
) -> EnvelopeReply
where
    D: ToolDispatch,
{
    match parse_arguments(&body) {
        Ok(arguments) => EnvelopeReply(dispatch.dispatch(ToolRequest::new(name, arguments)).await),
        Err(error) => {
            tracing::warn!(tool = %name, %error, "Rejecting malformed argument body");
            EnvelopeReply(ToolResponse::failure(None, &error))
        }
    }
}

fn parse_arguments(body: &[u8]) -> Result<JsonObject, ToolError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(JsonObject::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(Value::Null) => Ok(JsonObject::new()),
        Ok(other) => Err(ToolError::InvalidRequest(format!(
            "arguments must be a JSON object, got {other}"
        ))),
        Err(err) => Err(ToolError::InvalidRequest(err.to_string())),
    }
}

struct EnvelopeReply(ToolResponse);

impl IntoResponse for EnvelopeReply {
    fn into_response(self) -> Response {
        (status_for(&self.0), Json(self.0)).into_response()
    }
}

/// HTTP status matching a reply's error kind.
pub fn status_for(response: &ToolResponse) -> StatusCode {
    match response.error_kind() {
        None => StatusCode::OK,
        Some("tool_not_found") => StatusCode::NOT_FOUND,
        Some("invalid_arguments") | Some("invalid_request") => StatusCode::BAD_REQUEST,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::DispatchMetrics;
    use crate::server::Dispatcher;
    use crate::tools::{CollisionPolicy, ToolCapability, ToolProvider, ToolRegistry};
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;
    use tower::ServiceExt;

    #[derive(Deserialize, JsonSchema)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    struct Arithmetic;

    impl ToolProvider for Arithmetic {
        fn provider_name(&self) -> &'static str {
            "arithmetic"
        }

        fn capabilities(self: Arc<Self>) -> Vec<ToolCapability> {
            vec![
                ToolCapability::new("add", "Add two integers", |args: AddArgs| async move {
                    Ok::<_, ToolError>(args.a + args.b)
                }),
                ToolCapability::new("divide_by_zero", "Fails", |_: crate::tools::NoArguments| async move {
                    Err::<i64, _>(ToolError::execution("division by zero"))
                }),
            ]
        }
    }

    /// Registers its adder under the name that collides with the envelope route.
    struct CallNamed;

    impl ToolProvider for CallNamed {
        fn provider_name(&self) -> &'static str {
            "call_named"
        }

        fn capabilities(self: Arc<Self>) -> Vec<ToolCapability> {
            vec![ToolCapability::new("call", "Add two integers", |args: AddArgs| async move {
                Ok::<_, ToolError>(args.a + args.b)
            })]
        }
    }

    fn app() -> Router {
        app_with(Arc::new(Arithmetic))
    }

    fn app_with(provider: Arc<dyn ToolProvider>) -> Router {
        let registry = ToolRegistry::from_providers(
            [provider],
            CollisionPolicy::Reject,
        )
        .unwrap();
        let dispatcher = Dispatcher::new(
            "http-test",
            Arc::new(registry),
            Arc::new(DispatchMetrics::new()),
            None,
        );
        create_router(Arc::new(dispatcher))
    }

    async fn send(method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        send_to(app(), method, uri, body).await
    }

    async fn send_to(app: Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn envelope_route_runs_tool() {
        let (status, body) = send(
            Method::POST,
            "/tools/call",
            r#"{"id": 9, "tool_name": "add", "arguments": {"a": 2, "b": 3}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "id": 9, "result": 5 }));
    }

    #[tokio::test]
    async fn named_route_takes_arguments_as_body() {
        let (status, body) = send(Method::POST, "/tools/add", r#"{"a": 40, "b": 2}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], 42);
    }

    #[tokio::test]
    async fn error_kinds_map_to_status_codes() {
        let (status, body) = send(Method::POST, "/tools/missing", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["kind"], "tool_not_found");

        let (status, body) = send(Method::POST, "/tools/add", r#"{"a": "two"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "invalid_arguments");

        let (status, _) = send(Method::POST, "/tools/call", "{").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(Method::POST, "/tools/divide_by_zero", "").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "division by zero");
    }

    #[tokio::test]
    async fn listing_and_health() {
        let (status, body) = send(Method::GET, "/tools", "").await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect();
        assert_eq!(names, vec!["add", "divide_by_zero"]);
        assert_eq!(body[0]["input_schema"]["required"], json!(["a", "b"]));

        let (_, body) = send(Method::GET, "/health", "").await;
        assert_eq!(body["server_name"], "http-test");
        assert_eq!(body["tools"], 2);
    }

    #[tokio::test]
    async fn tool_named_call_is_reached_through_the_envelope() {
        let envelope = r#"{"id": 1, "tool_name": "call", "arguments": {"a": 1, "b": 2}}"#;
        let (status, body) =
            send_to(app_with(Arc::new(CallNamed)), Method::POST, "/tools/call", envelope).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "id": 1, "result": 3 }));

        let (status, body) =
            send_to(app_with(Arc::new(CallNamed)), Method::POST, "/tools/call", r#"{"a": 1, "b": 2}"#)
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "invalid_request");
    }
}
