//! Client core implementation
//!
//! A client owns one transport and the registry it mirrored from its server.
//! It performs the handshake, blesses typed requests into envelopes, and
//! unblesses the replies.

use serde_json::{ Map, Value };
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{ debug, info, warn };

use crate::errors::Error;
use crate::protocol::{
    CallToolResult,
    ClientCapabilities,
    GetPromptResult,
    Implementation,
    InitializeParams,
    InitializeResult,
    JSONRPCMessage,
    ListPromptsResult,
    ListResourceTemplatesResult,
    ListResourcesResult,
    ListToolsResult,
    Notification,
    PROTOCOL_VERSION,
    PromptDefinition,
    ReadResourceResult,
    Request,
    ResourceDefinition,
    ResourceTemplateDefinition,
    SUPPORTED_PROTOCOL_VERSIONS,
    ServerCapabilities,
    ServerResult,
    ToolDefinition,
};
use crate::registry::ClientRegistry;
use crate::transport::Transport;

/// Session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No transport session (also the state after `close`)
    Uninitialized,
    /// Bound to a transport, handshake not yet completed
    Initializing,
    /// Handshake completed; usable for routing
    Initialized,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::Uninitialized => write!(f, "Uninitialized"),
            ClientState::Initializing => write!(f, "Initializing"),
            ClientState::Initialized => write!(f, "Initialized"),
        }
    }
}

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sent as `clientInfo` during the handshake
    pub client_info: Implementation,
    /// Protocol version requested during the handshake
    pub protocol_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new("mcp-lite-client", env!("CARGO_PKG_VERSION")),
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_info = Implementation::new(name, version);
        self
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }
}

/// Main client for protocol communication
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    state: RwLock<ClientState>,
    registry: RwLock<ClientRegistry>,
    server: RwLock<Option<InitializeResult>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.try_read().map(|state| *state).ok();
        f.debug_struct("Client")
            .field("client_info", &self.config.client_info.name)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Bind a client to a transport. The client starts out `Initializing`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            state: RwLock::new(ClientState::Initializing),
            registry: RwLock::new(ClientRegistry::new()),
            server: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    pub async fn is_initialized(&self) -> bool {
        self.state().await == ClientState::Initialized
    }

    /// Definitions learned during the handshake
    pub async fn registry(&self) -> ClientRegistry {
        self.registry.read().await.clone()
    }

    /// The server's handshake answer, once initialized
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server.read().await.clone()
    }

    /// Run the handshake.
    ///
    /// Lists are fetched only for capabilities the server advertised. The client
    /// becomes `Initialized` after the `notifications/initialized` notification
    /// has been sent.
    pub async fn initialize(&self) -> Result<InitializeResult, Error> {
        match self.state().await {
            ClientState::Initialized => {
                return Err(Error::AlreadyInitialized("Client is already initialized".to_string()));
            }
            ClientState::Uninitialized => {
                *self.state.write().await = ClientState::Initializing;
            }
            ClientState::Initializing => {}
        }

        self.transport.start().await?;

        let params = InitializeParams {
            capabilities: ClientCapabilities::default(),
            client_info: self.config.client_info.clone(),
            protocol_version: self.config.protocol_version.clone(),
        };
        let ServerResult::Initialize(result) = self.exchange_typed(Request::Initialize(params)).await? else {
            return Err(Error::Protocol("Handshake answered with the wrong result".to_string()));
        };

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            return Err(
                Error::UnsupportedProtocolVersion(
                    format!(
                        "Server speaks '{}', supported: {}",
                        result.protocol_version,
                        SUPPORTED_PROTOCOL_VERSIONS.join(", ")
                    )
                )
            );
        }
        info!(
            "Connected to {} {} (protocol {})",
            result.server_info.name,
            result.server_info.version,
            result.protocol_version
        );

        let registry = self.mirror_registry(&result.capabilities).await?;
        debug!(
            "Mirrored {} tools, {} resources, {} templates, {} prompts",
            registry.tools.len(),
            registry.resources.len(),
            registry.resource_templates.len(),
            registry.prompts.len()
        );

        self.notify(Notification::Initialized).await?;

        *self.registry.write().await = registry;
        *self.server.write().await = Some(result.clone());
        *self.state.write().await = ClientState::Initialized;
        Ok(result)
    }

    async fn mirror_registry(&self, capabilities: &ServerCapabilities) -> Result<ClientRegistry, Error> {
        let mut registry = ClientRegistry::new();
        if capabilities.supports_tools() {
            if let ServerResult::ListTools(list) = self.exchange_typed(Request::ListTools).await? {
                registry.tools = list.tools;
            }
        }
        if capabilities.supports_resources() {
            if let ServerResult::ListResources(list) = self.exchange_typed(Request::ListResources).await? {
                registry.resources = list.resources;
            }
            let templates = self.exchange_typed(Request::ListResourceTemplates).await?;
            if let ServerResult::ListResourceTemplates(list) = templates {
                registry.resource_templates = list.resource_templates;
            }
        }
        if capabilities.supports_prompts() {
            if let ServerResult::ListPrompts(list) = self.exchange_typed(Request::ListPrompts).await? {
                registry.prompts = list.prompts;
            }
        }
        Ok(registry)
    }

    /// Send a typed request and unbless its typed result
    pub async fn request(&self, request: Request) -> Result<ServerResult, Error> {
        self.ensure_initialized().await?;
        if let Request::Reserved { method, .. } = &request {
            return Err(Error::InvalidRequest(format!("'{}' has no typed result", method)));
        }
        self.exchange_typed(request).await
    }

    /// Send a typed notification; no reply is awaited
    pub async fn notify(&self, notification: Notification) -> Result<(), Error> {
        let text = serde_json::to_string(&notification.to_envelope()?)?;
        if let Some(reply) = self.transport.send(&text).await? {
            warn!("Unexpected reply to notification {}: {}", notification.method(), reply);
        }
        Ok(())
    }

    /// Liveness check. The reply's payload is not interpreted.
    pub async fn ping(&self) -> Result<(), Error> {
        self.ensure_initialized().await?;
        self.exchange(&Request::ping()).await.map(|_| ())
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, Error> {
        self.require_capability("tools", ServerCapabilities::supports_tools).await?;
        match self.request(Request::ListTools).await? {
            ServerResult::ListTools(ListToolsResult { tools }) => Ok(tools),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceDefinition>, Error> {
        self.require_capability("resources", ServerCapabilities::supports_resources).await?;
        match self.request(Request::ListResources).await? {
            ServerResult::ListResources(ListResourcesResult { resources }) => Ok(resources),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateDefinition>, Error> {
        self.require_capability("resources", ServerCapabilities::supports_resources).await?;
        match self.request(Request::ListResourceTemplates).await? {
            ServerResult::ListResourceTemplates(ListResourceTemplatesResult { resource_templates }) => {
                Ok(resource_templates)
            }
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptDefinition>, Error> {
        self.require_capability("prompts", ServerCapabilities::supports_prompts).await?;
        match self.request(Request::ListPrompts).await? {
            ServerResult::ListPrompts(ListPromptsResult { prompts }) => Ok(prompts),
            other => Err(unexpected(other)),
        }
    }

    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Map<String, Value>
    ) -> Result<CallToolResult, Error> {
        self.require_capability("tools", ServerCapabilities::supports_tools).await?;
        match self.request(Request::call_tool(name, arguments)).await? {
            ServerResult::CallTool(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    pub async fn read_resource(&self, uri: impl Into<String>) -> Result<ReadResourceResult, Error> {
        self.require_capability("resources", ServerCapabilities::supports_resources).await?;
        match self.request(Request::read_resource(uri)).await? {
            ServerResult::ReadResource(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Map<String, Value>
    ) -> Result<GetPromptResult, Error> {
        self.require_capability("prompts", ServerCapabilities::supports_prompts).await?;
        match self.request(Request::get_prompt(name, arguments)).await? {
            ServerResult::GetPrompt(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    /// Stop the transport and return to `Uninitialized`
    pub async fn close(&self) -> Result<(), Error> {
        *self.state.write().await = ClientState::Uninitialized;
        self.transport.stop().await
    }

    async fn ensure_initialized(&self) -> Result<(), Error> {
        let state = self.state().await;
        if state != ClientState::Initialized {
            return Err(Error::NotInitialized(format!("Client is {}", state)));
        }
        Ok(())
    }

    async fn require_capability(
        &self,
        name: &str,
        supported: fn(&ServerCapabilities) -> bool
    ) -> Result<(), Error> {
        self.ensure_initialized().await?;
        let server = self.server.read().await;
        match server.as_ref() {
            Some(result) if supported(&result.capabilities) => Ok(()),
            _ => Err(Error::CapabilityNotSupported(format!("Server does not support {}", name))),
        }
    }

    /// Round-trip a request and check the reply's shape against the request
    async fn exchange_typed(&self, request: Request) -> Result<ServerResult, Error> {
        let method = request.method();
        let value = self.exchange(&request).await?;
        let result = ServerResult::from_value(value)?;
        if result.kind().method() != method {
            return Err(
                Error::Protocol(format!("'{}' was answered with a {}", method, result.kind()))
            );
        }
        Ok(result)
    }

    /// Round-trip one request and return the raw `result` payload
    async fn exchange(&self, request: &Request) -> Result<Value, Error> {
        let envelope = request.to_envelope()?;
        let text = serde_json::to_string(&envelope)?;
        debug!("-> {}", text);

        let reply = self.transport
            .send(&text).await?
            .ok_or_else(|| {
                Error::Protocol(format!("No reply to request '{}'", envelope.method))
            })?;
        debug!("<- {}", reply);

        match JSONRPCMessage::parse(&reply)? {
            JSONRPCMessage::Response(response) => {
                if response.id != envelope.id {
                    return Err(
                        Error::Protocol(
                            format!("Reply id {} does not match request id {}", response.id, envelope.id)
                        )
                    );
                }
                Ok(response.result)
            }
            JSONRPCMessage::Error(error) => {
                if let Some(id) = &error.id {
                    if *id != envelope.id {
                        return Err(
                            Error::Protocol(
                                format!("Error id {} does not match request id {}", id, envelope.id)
                            )
                        );
                    }
                }
                Err(Error::from_error_data(error.error))
            }
            other => Err(Error::Protocol(format!("Expected a response, got {}", other))),
        }
    }
}

fn unexpected(result: ServerResult) -> Error {
    Error::Protocol(format!("Unexpected {}", result.kind()))
}
