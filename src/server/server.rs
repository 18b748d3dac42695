//! Server implementation
//!
//! The Server parses inbound envelopes, classifies them as requests or
//! notifications, dispatches requests through the [`Router`], and blesses the
//! outcome back into an envelope. It is the single place where any error turns
//! into a wire error.

use async_trait::async_trait;
use serde_json::{ Map, Value };
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{ debug, info, warn };

use crate::errors::Error;
use crate::protocol::{
    CapabilityFlag,
    CapabilityOptions,
    Implementation,
    JSONRPCMessage,
    JSONRPCNotification,
    JSONRPCRequest,
    JSONRPCResponse,
    JSONRPC_VERSION,
    LogLevel,
    Notification,
    Request,
    ServerCapabilities,
};
use crate::registry::{ Prompt, Resource, ResourceTemplate, ServerRegistry, Tool, UriTemplate };
use crate::server::router::Router;
use crate::transport::{ MessageHandler, SseServerOptions, SseServerTransport, stdio_server };

/// Capabilities advertised when none are configured
pub fn default_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        tools: Some(CapabilityFlag::with_list_changed(false)),
        resources: Some(
            CapabilityFlag::Options(CapabilityOptions {
                list_changed: Some(false),
                subscribe: Some(false),
            })
        ),
        prompts: Some(CapabilityFlag::with_list_changed(false)),
        logging: None,
        experimental: None,
    }
}

/// A capability server
#[derive(Debug, Clone)]
pub struct Server {
    router: Router,
}

impl Server {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn registry(&self) -> &ServerRegistry {
        self.router.registry()
    }

    /// Handle one serialized envelope, returning the serialized reply if any.
    ///
    /// Requests always get a reply: a result, an empty `{}` for methods with no
    /// behaviour, or an error carrying the request's id. Unparseable text and
    /// messages that are neither requests nor notifications get an error with a
    /// null id. Notifications never get a reply.
    pub fn handle_json(&self, text: &str) -> Result<Option<String>, Error> {
        let message = match JSONRPCMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Rejecting inbound message: {}", e);
                return Ok(Some(JSONRPCMessage::from(e.to_response_payload(None)).to_json()?));
            }
        };

        match message {
            JSONRPCMessage::Request(request) => {
                let reply = self.handle_request(request);
                Ok(Some(reply.to_json()?))
            }
            JSONRPCMessage::Notification(notification) => {
                self.handle_notification(&notification);
                Ok(None)
            }
            JSONRPCMessage::Response(_) | JSONRPCMessage::Error(_) => {
                warn!("Ignoring unsolicited response from client");
                Ok(None)
            }
        }
    }

    fn handle_request(&self, envelope: JSONRPCRequest) -> JSONRPCMessage {
        let id = envelope.id.clone();
        debug!("Handling request {} ({})", id, envelope.method);

        let outcome = Request::from_envelope(&envelope).and_then(|request| self.router.dispatch(request));
        let reply = match outcome {
            Ok(Some(result)) => result.to_envelope(id.clone()).map(JSONRPCMessage::from),
            Ok(None) =>
                Ok(
                    JSONRPCMessage::from(JSONRPCResponse {
                        jsonrpc: JSONRPC_VERSION.to_string(),
                        id: id.clone(),
                        result: Value::Object(Map::new()),
                    })
                ),
            Err(e) => Err(e),
        };

        reply.unwrap_or_else(|e| {
            warn!("Request {} failed: {}", id, e);
            JSONRPCMessage::from(e.to_response_payload(Some(id)))
        })
    }

    fn handle_notification(&self, envelope: &JSONRPCNotification) {
        match Notification::from_envelope(envelope) {
            Ok(Notification::Initialized) => info!("Client finished initialization"),
            Ok(Notification::Cancelled(params)) => {
                info!(
                    "Client cancelled request {}: {}",
                    params.request_id,
                    params.reason.as_deref().unwrap_or("no reason given")
                );
            }
            Ok(Notification::Message(params)) => {
                let logger = params.logger.as_deref().unwrap_or("client");
                match params.level {
                    LogLevel::Debug => debug!("[{}] {}", logger, params.data),
                    LogLevel::Info => info!("[{}] {}", logger, params.data),
                    LogLevel::Warning => warn!("[{}] {}", logger, params.data),
                    LogLevel::Error => tracing::error!("[{}] {}", logger, params.data),
                }
            }
            Ok(other) => debug!("Received notification {}", other.method()),
            Err(e) => warn!("Dropping notification '{}': {}", envelope.method, e),
        }
    }

    /// Serve newline-delimited envelopes on stdin/stdout until stdin closes
    pub async fn serve_stdio(self) -> Result<(), Error> {
        stdio_server::serve_stdio(Arc::new(self)).await
    }

    /// Serve over HTTP with an event stream until the server task ends
    pub async fn serve_sse(self, options: SseServerOptions) -> Result<(), Error> {
        let transport = SseServerTransport::new(Arc::new(self), options);
        let addr = transport.start().await?;
        info!("Serving SSE on http://{}", addr);
        transport.wait().await
    }
}

#[async_trait]
impl MessageHandler for Server {
    async fn handle_message(&self, client_id: &str, message: &str) -> Result<Option<String>, Error> {
        debug!("Processing message from client {}", client_id);
        self.handle_json(message)
    }
}

/// Builder for configuring and creating a Server
pub struct ServerBuilder {
    name: String,
    version: String,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
    registry: ServerRegistry,
    /// First registration failure, reported by `build`
    error: Option<Error>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            name: "mcp-lite-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: default_capabilities(),
            instructions: None,
            registry: ServerRegistry::new(),
            error: None,
        }
    }

    /// Set the server name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the server version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.registry.register_tool(tool);
        self
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.registry.register_prompt(prompt);
        self
    }

    /// Register a resource. A URI containing `{param}` placeholders becomes a
    /// resource template and the function receives the decoded values; a plain
    /// URI becomes a concrete resource and the function receives an empty map.
    pub fn with_resource<F>(
        mut self,
        uri: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F
    )
        -> Self
        where F: Fn(&HashMap<String, String>) -> Result<String, Error> + Send + Sync + 'static
    {
        if UriTemplate::is_template(uri) {
            match ResourceTemplate::new(uri, name, description, handler) {
                Ok(template) => self.registry.register_resource_template(template),
                Err(e) => self.record(e),
            }
        } else {
            let empty = HashMap::new();
            match Resource::new(uri, name, description, move || handler(&empty)) {
                Ok(resource) => self.registry.register_resource(resource),
                Err(e) => self.record(e),
            }
        }
        self
    }

    /// Merge an already populated registry
    pub fn with_registry(mut self, registry: ServerRegistry) -> Self {
        self.registry += registry;
        self
    }

    fn record(&mut self, error: Error) {
        warn!("Registration failed: {}", error);
        self.error.get_or_insert(error);
    }

    /// Build the server, failing with the first registration error
    pub fn build(self) -> Result<Server, Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        info!(
            "Built server {} {} with {} capabilities",
            self.name,
            self.version,
            self.registry.definitions().len()
        );
        Ok(Server {
            router: Router::new(
                Arc::new(self.registry),
                Implementation::new(self.name, self.version),
                self.capabilities,
                self.instructions
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ ParamType, argument };
    use serde_json::json;

    fn server() -> Server {
        Server::builder()
            .with_name("MyMinimalServer")
            .with_tool(
                Tool::new("add", "Add two numbers.", &[
                    ("a", ParamType::Int),
                    ("b", ParamType::Int),
                ], |args| Ok(argument::<i64>(args, "a")? + argument::<i64>(args, "b")?)).unwrap()
            )
            .with_resource("names://sheepadoodle", "sheepadoodle", "Name of the dog.", |_| {
                Ok("Otis".to_string())
            })
            .with_resource("file://todos/{date}", "todos", "Todos for a date.", |params| {
                Ok(format!("Nothing due on {}", params["date"]))
            })
            .build()
            .unwrap()
    }

    fn reply(server: &Server, text: &str) -> Value {
        let reply = server.handle_json(text).unwrap().expect("a reply");
        serde_json::from_str(&reply).unwrap()
    }

    #[test]
    fn test_add_scenario() {
        let reply = reply(
            &server(),
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add","arguments":{"a":9801,"b":1444}}}"#
        );
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["content"][0]["text"], "11245");
        assert_eq!(reply["result"]["isError"], false);
    }

    #[test]
    fn test_unknown_tool_is_wire_error() {
        let reply = reply(
            &server(),
            r#"{"jsonrpc":"2.0","id":"abc","method":"tools/call","params":{"name":"nope","arguments":{}}}"#
        );
        assert_eq!(reply["id"], "abc");
        assert_eq!(reply["error"]["code"], -32007);
    }

    #[test]
    fn test_malformed_messages() {
        let server = server();
        let parse = reply(&server, "{not json");
        assert_eq!(parse["error"]["code"], -32700);
        assert!(parse["id"].is_null());

        let invalid = reply(&server, r#"{"jsonrpc":"2.0","params":{}}"#);
        assert_eq!(invalid["error"]["code"], -32600);

        let unknown = reply(&server, r#"{"jsonrpc":"2.0","id":7,"method":"tools/destroy"}"#);
        assert_eq!(unknown["error"]["code"], -32601);
        assert_eq!(unknown["id"], 7);

        let bad_args = reply(
            &server,
            r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"add","arguments":{"a":"x","b":1}}}"#
        );
        assert_eq!(bad_args["error"]["code"], -32602);
    }

    #[test]
    fn test_notifications_get_no_reply() {
        let server = server();
        let initialized = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        assert_eq!(server.handle_json(initialized).unwrap(), None);
        let unknown = r#"{"jsonrpc":"2.0","method":"notifications/whatever"}"#;
        assert_eq!(server.handle_json(unknown).unwrap(), None);
    }

    #[test]
    fn test_reserved_methods_answer_empty() {
        let reply = reply(&server(), r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#);
        assert_eq!(reply["result"], json!({}));
    }

    #[test]
    fn test_unified_resource_registration() {
        let server = server();
        assert_eq!(server.registry().resources().count(), 1);
        assert_eq!(server.registry().resource_templates().count(), 1);

        let read = reply(
            &server,
            r#"{"jsonrpc":"2.0","id":4,"method":"resources/read","params":{"uri":"file://todos/2025-05-03"}}"#
        );
        assert_eq!(read["result"]["resource"]["contents"]["text"], "Nothing due on 2025-05-03");
    }

    #[test]
    fn test_build_reports_registration_error() {
        let result = Server::builder()
            .with_resource("not a uri", "bad", "Broken.", |_| Ok(String::new()))
            .build();
        assert!(matches!(result, Err(Error::Registration(_))));
    }

    #[test]
    fn test_initialize_advertises_defaults() {
        let reply = reply(
            &server(),
            r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"capabilities":{},"clientInfo":{"name":"c","version":"1"},"protocolVersion":"1.0.0"}}"#
        );
        assert_eq!(reply["result"]["serverInfo"]["name"], "MyMinimalServer");
        assert_eq!(reply["result"]["capabilities"]["resources"]["subscribe"], false);
        assert_eq!(reply["result"]["capabilities"]["tools"]["listChanged"], false);
    }
}
