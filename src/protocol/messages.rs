//! Typed protocol messages and their conversion to and from JSON-RPC envelopes
//!
//! Requests and notifications carry their method, so unblessing them is a table
//! lookup. Results carry no discriminant on the wire; [`sniff_result`] recovers the
//! variant from the key set of the result object in a fixed priority order.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde::de::DeserializeOwned;
use serde_json::{ Map, Value };
use std::fmt;

use crate::errors::Error;
use crate::protocol::{
    ClientCapabilities,
    Content,
    Implementation,
    JSONRPCNotification,
    JSONRPCRequest,
    JSONRPCResponse,
    JSONRPC_VERSION,
    Method,
    PromptDefinition,
    PromptMessage,
    RequestId,
    ResourceDefinition,
    ResourceTemplateDefinition,
    ServerCapabilities,
    TextResourceContents,
    ToolDefinition,
};

/// Parameters of `initialize`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct InitializeParams {
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
}

/// Parameters of `tools/call`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Parameters of `resources/read`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ReadResourceParams {
    pub uri: String,
}

/// Parameters of `prompts/get`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GetPromptParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// A typed request, tagged by its method
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Initialize(InitializeParams),
    ListTools,
    CallTool(CallToolParams),
    ListResources,
    ReadResource(ReadResourceParams),
    ListResourceTemplates,
    ListPrompts,
    GetPrompt(GetPromptParams),
    /// A method in the closed set with no behaviour behind it (`ping`, `roots/list`, ...)
    Reserved {
        method: Method,
        params: Option<Value>,
    },
}

impl Request {
    pub fn call_tool(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Request::CallTool(CallToolParams { name: name.into(), arguments })
    }

    pub fn read_resource(uri: impl Into<String>) -> Self {
        Request::ReadResource(ReadResourceParams { uri: uri.into() })
    }

    pub fn get_prompt(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Request::GetPrompt(GetPromptParams { name: name.into(), arguments })
    }

    pub fn ping() -> Self {
        Request::Reserved { method: Method::Ping, params: None }
    }

    pub fn method(&self) -> Method {
        match self {
            Request::Initialize(_) => Method::Initialize,
            Request::ListTools => Method::ToolsList,
            Request::CallTool(_) => Method::ToolsCall,
            Request::ListResources => Method::ResourcesList,
            Request::ReadResource(_) => Method::ResourcesRead,
            Request::ListResourceTemplates => Method::ResourcesTemplatesList,
            Request::ListPrompts => Method::PromptsList,
            Request::GetPrompt(_) => Method::PromptsGet,
            Request::Reserved { method, .. } => *method,
        }
    }

    /// The params sub-record flattened into a plain key/value map
    pub fn params(&self) -> Result<Option<Value>, Error> {
        let params = match self {
            Request::Initialize(p) => serde_json::to_value(p)?,
            Request::CallTool(p) => serde_json::to_value(p)?,
            Request::ReadResource(p) => serde_json::to_value(p)?,
            Request::GetPrompt(p) => serde_json::to_value(p)?,
            Request::ListTools |
            Request::ListResources |
            Request::ListResourceTemplates |
            Request::ListPrompts => Value::Object(Map::new()),
            Request::Reserved { params, .. } => {
                return Ok(params.clone());
            }
        };
        Ok(Some(params))
    }

    /// Bless into an envelope with a freshly generated id
    pub fn to_envelope(&self) -> Result<JSONRPCRequest, Error> {
        self.to_envelope_with_id(RequestId::fresh())
    }

    pub fn to_envelope_with_id(&self, id: RequestId) -> Result<JSONRPCRequest, Error> {
        Ok(JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: self.method().as_str().to_string(),
            params: self.params()?,
        })
    }

    /// Build a typed request from a method name and raw params.
    ///
    /// Unknown methods (and notification methods) are `MethodNotFound`; params that
    /// do not fit the method's record are `InvalidParams`.
    pub fn from_parts(method: &str, params: Option<Value>) -> Result<Self, Error> {
        let parsed: Method = method
            .parse()
            .map_err(|_| Error::MethodNotFound(format!("Method '{}' not found", method)))?;

        if parsed.is_notification() {
            return Err(Error::MethodNotFound(format!("'{}' is a notification, not a request", method)));
        }

        let request = match parsed {
            Method::Initialize => Request::Initialize(decode_params(method, params)?),
            Method::ToolsList => Request::ListTools,
            Method::ToolsCall => Request::CallTool(decode_params(method, params)?),
            Method::ResourcesList => Request::ListResources,
            Method::ResourcesRead => Request::ReadResource(decode_params(method, params)?),
            Method::ResourcesTemplatesList => Request::ListResourceTemplates,
            Method::PromptsList => Request::ListPrompts,
            Method::PromptsGet => Request::GetPrompt(decode_params(method, params)?),
            reserved => Request::Reserved { method: reserved, params },
        };
        Ok(request)
    }

    /// Unbless an envelope
    pub fn from_envelope(envelope: &JSONRPCRequest) -> Result<Self, Error> {
        Self::from_parts(&envelope.method, envelope.params.clone())
    }
}

fn decode_params<T: DeserializeOwned>(method: &str, params: Option<Value>) -> Result<T, Error> {
    let params = params.unwrap_or_else(|| Value::Object(Map::new()));
    serde_json
        ::from_value(params)
        .map_err(|e| Error::InvalidParams(format!("Invalid params for '{}': {}", method, e)))
}

/// Severity of a log message notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Parameters of `notifications/progress`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProgressParams {
    #[serde(rename = "progressToken")]
    pub progress_token: Value,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

/// Parameters of `notifications/message`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LogMessageParams {
    pub level: LogLevel,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
}

/// Parameters of `notifications/resources/updated`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceUpdatedParams {
    pub uri: String,
}

/// Parameters of `notifications/cancelled`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CancelledParams {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A typed notification. Never carries an id, never expects a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Initialized,
    Progress(ProgressParams),
    Message(LogMessageParams),
    ResourceUpdated(ResourceUpdatedParams),
    Cancelled(CancelledParams),
    ToolsListChanged,
    ResourcesListChanged,
    PromptsListChanged,
}

impl Notification {
    pub fn method(&self) -> Method {
        match self {
            Notification::Initialized => Method::NotificationsInitialized,
            Notification::Progress(_) => Method::NotificationsProgress,
            Notification::Message(_) => Method::NotificationsMessage,
            Notification::ResourceUpdated(_) => Method::NotificationsResourcesUpdated,
            Notification::Cancelled(_) => Method::NotificationsCancelled,
            Notification::ToolsListChanged => Method::NotificationsToolsListChanged,
            Notification::ResourcesListChanged => Method::NotificationsResourcesListChanged,
            Notification::PromptsListChanged => Method::NotificationsPromptsListChanged,
        }
    }

    pub fn to_envelope(&self) -> Result<JSONRPCNotification, Error> {
        let params = match self {
            Notification::Progress(p) => Some(serde_json::to_value(p)?),
            Notification::Message(p) => Some(serde_json::to_value(p)?),
            Notification::ResourceUpdated(p) => Some(serde_json::to_value(p)?),
            Notification::Cancelled(p) => Some(serde_json::to_value(p)?),
            _ => None,
        };
        Ok(JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: self.method().as_str().to_string(),
            params,
        })
    }

    pub fn from_parts(method: &str, params: Option<Value>) -> Result<Self, Error> {
        let parsed: Method = method
            .parse()
            .map_err(|_| Error::MethodNotFound(format!("Notification '{}' not found", method)))?;

        let notification = match parsed {
            Method::NotificationsInitialized => Notification::Initialized,
            Method::NotificationsProgress => Notification::Progress(decode_params(method, params)?),
            Method::NotificationsMessage => Notification::Message(decode_params(method, params)?),
            Method::NotificationsResourcesUpdated => {
                Notification::ResourceUpdated(decode_params(method, params)?)
            }
            Method::NotificationsCancelled => Notification::Cancelled(decode_params(method, params)?),
            Method::NotificationsToolsListChanged => Notification::ToolsListChanged,
            Method::NotificationsResourcesListChanged => Notification::ResourcesListChanged,
            Method::NotificationsPromptsListChanged => Notification::PromptsListChanged,
            request => {
                return Err(
                    Error::InvalidRequest(format!("'{}' is a request and needs an id", request))
                );
            }
        };
        Ok(notification)
    }

    pub fn from_envelope(envelope: &JSONRPCNotification) -> Result<Self, Error> {
        Self::from_parts(&envelope.method, envelope.params.clone())
    }
}

/// Result of `initialize`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct InitializeResult {
    pub capabilities: ServerCapabilities,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Result of `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDefinition>,
}

/// Result of `tools/call`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self { content: vec![Content::text(text)], is_error: false }
    }

    /// All text blocks joined by newlines
    pub fn joined_text(&self) -> String {
        self.content.iter().filter_map(Content::as_text).collect::<Vec<_>>().join("\n")
    }
}

/// Result of `resources/list`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ListResourcesResult {
    pub resources: Vec<ResourceDefinition>,
}

/// The body of a read resource: its URI plus its text contents
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceContents {
    pub uri: String,
    pub contents: TextResourceContents,
}

/// Result of `resources/read`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ReadResourceResult {
    pub resource: ResourceContents,
}

/// Result of `resources/templates/list`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ListResourceTemplatesResult {
    #[serde(rename = "resourceTemplates")]
    pub resource_templates: Vec<ResourceTemplateDefinition>,
}

/// Result of `prompts/list`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ListPromptsResult {
    pub prompts: Vec<PromptDefinition>,
}

/// Result of `prompts/get`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GetPromptResult {
    pub messages: Vec<PromptMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GetPromptResult {
    /// Text of every message, joined by blank lines
    pub fn joined_text(&self) -> String {
        self.messages
            .iter()
            .filter_map(|m| m.content.as_text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A typed result
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ServerResult {
    Initialize(InitializeResult),
    ListTools(ListToolsResult),
    CallTool(CallToolResult),
    ListResources(ListResourcesResult),
    ReadResource(ReadResourceResult),
    ListResourceTemplates(ListResourceTemplatesResult),
    ListPrompts(ListPromptsResult),
    GetPrompt(GetPromptResult),
}

/// Discriminant recovered by [`sniff_result`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Initialize,
    ReadResource,
    ListResources,
    ListResourceTemplates,
    ListPrompts,
    GetPrompt,
    ListTools,
    CallTool,
}

impl ResultKind {
    /// The request method this kind of result answers
    pub fn method(&self) -> Method {
        match self {
            ResultKind::Initialize => Method::Initialize,
            ResultKind::ReadResource => Method::ResourcesRead,
            ResultKind::ListResources => Method::ResourcesList,
            ResultKind::ListResourceTemplates => Method::ResourcesTemplatesList,
            ResultKind::ListPrompts => Method::PromptsList,
            ResultKind::GetPrompt => Method::PromptsGet,
            ResultKind::ListTools => Method::ToolsList,
            ResultKind::CallTool => Method::ToolsCall,
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}Result", self)
    }
}

/// Recover the result variant from the key set of a raw result object.
///
/// Order matters: some shapes are structural subsets of others, and the first
/// match wins. `resource` is checked before `resources`, and both before `tools`.
pub fn sniff_result(result: &Value) -> Result<ResultKind, Error> {
    let Value::Object(object) = result else {
        return Err(Error::Internal("unknown result shape".to_string()));
    };
    let has = |key: &str| object.contains_key(key);

    let kind = if has("serverInfo") && has("protocolVersion") {
        ResultKind::Initialize
    } else if has("resource") {
        ResultKind::ReadResource
    } else if has("resources") {
        ResultKind::ListResources
    } else if has("resourceTemplates") {
        ResultKind::ListResourceTemplates
    } else if has("prompts") {
        ResultKind::ListPrompts
    } else if has("messages") {
        ResultKind::GetPrompt
    } else if has("tools") {
        ResultKind::ListTools
    } else if has("content") && has("isError") {
        ResultKind::CallTool
    } else {
        return Err(Error::Internal("unknown result shape".to_string()));
    };
    Ok(kind)
}

impl ServerResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            ServerResult::Initialize(_) => ResultKind::Initialize,
            ServerResult::ListTools(_) => ResultKind::ListTools,
            ServerResult::CallTool(_) => ResultKind::CallTool,
            ServerResult::ListResources(_) => ResultKind::ListResources,
            ServerResult::ReadResource(_) => ResultKind::ReadResource,
            ServerResult::ListResourceTemplates(_) => ResultKind::ListResourceTemplates,
            ServerResult::ListPrompts(_) => ResultKind::ListPrompts,
            ServerResult::GetPrompt(_) => ResultKind::GetPrompt,
        }
    }

    /// Unbless a raw `result` payload by sniffing its shape
    pub fn from_value(result: Value) -> Result<Self, Error> {
        let kind = sniff_result(&result)?;
        let typed = match kind {
            ResultKind::Initialize => ServerResult::Initialize(decode_result(kind, result)?),
            ResultKind::ReadResource => ServerResult::ReadResource(decode_result(kind, result)?),
            ResultKind::ListResources => ServerResult::ListResources(decode_result(kind, result)?),
            ResultKind::ListResourceTemplates => {
                ServerResult::ListResourceTemplates(decode_result(kind, result)?)
            }
            ResultKind::ListPrompts => ServerResult::ListPrompts(decode_result(kind, result)?),
            ResultKind::GetPrompt => ServerResult::GetPrompt(decode_result(kind, result)?),
            ResultKind::ListTools => ServerResult::ListTools(decode_result(kind, result)?),
            ResultKind::CallTool => ServerResult::CallTool(decode_result(kind, result)?),
        };
        Ok(typed)
    }

    pub fn from_envelope(envelope: &JSONRPCResponse) -> Result<Self, Error> {
        Self::from_value(envelope.result.clone())
    }

    pub fn to_envelope(&self, id: RequestId) -> Result<JSONRPCResponse, Error> {
        Ok(JSONRPCResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: serde_json::to_value(self)?,
        })
    }
}

fn decode_result<T: DeserializeOwned>(kind: ResultKind, result: Value) -> Result<T, Error> {
    serde_json
        ::from_value(result)
        .map_err(|e| Error::Internal(format!("Malformed {}: {}", kind, e)))
}
