//! Error handling for mcp-lite
//!
//! This module defines the crate-wide error type, the wire error codes, and helper
//! functions for turning errors into JSON-RPC error envelopes and back.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use thiserror::Error;

use crate::protocol::{ JSONRPCError, RequestId };

/// Standard JSON-RPC 2.0 error codes and protocol-specific error codes
pub mod error_codes {
    /// Invalid JSON was received
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Generic protocol violation
    pub const PROTOCOL_ERROR: i32 = -32000;
    /// Request issued before the handshake completed
    pub const NOT_INITIALIZED: i32 = -32001;
    /// Handshake attempted twice
    pub const ALREADY_INITIALIZED: i32 = -32002;
    /// Peer speaks an unsupported protocol version
    pub const UNSUPPORTED_PROTOCOL_VERSION: i32 = -32003;
    /// No resource with the requested URI
    pub const RESOURCE_NOT_FOUND: i32 = -32004;
    /// No resource template with the requested URI template
    pub const RESOURCE_TEMPLATE_NOT_FOUND: i32 = -32005;
    /// No prompt with the requested name
    pub const PROMPT_NOT_FOUND: i32 = -32006;
    /// No tool with the requested name
    pub const TOOL_NOT_FOUND: i32 = -32007;
    /// The peer did not advertise the capability
    pub const CAPABILITY_NOT_SUPPORTED: i32 = -32008;
    /// The request was cancelled
    pub const REQUEST_CANCELLED: i32 = -32009;
}

/// Error data for JSON-RPC responses
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct ErrorData {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The main Error type for the mcp-lite library
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failure (process died, socket closed, bad HTTP status)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A bounded wait on a transport elapsed
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Malformed inbound text
    #[error("Parse error: {0}")]
    Parse(String),

    /// Message matches neither the request nor the notification shape
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Method not found
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Catch-all for untyped failures
    #[error("Internal error: {0}")]
    Internal(String),

    /// Protocol violations (e.g. mismatched response ids)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Session used before the handshake completed
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Handshake attempted on an initialized session
    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    /// Peer protocol version is not supported
    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(String),

    /// Resource lookup failed
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Resource template lookup failed
    #[error("Resource template not found: {0}")]
    ResourceTemplateNotFound(String),

    /// Prompt lookup failed
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    /// Tool lookup failed
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Peer did not advertise the capability
    #[error("Capability not supported: {0}")]
    CapabilityNotSupported(String),

    /// Request was cancelled
    #[error("Request cancelled: {0}")]
    RequestCancelled(String),

    /// A capability failed validation while being registered
    #[error("Registration error: {0}")]
    Registration(String),

    /// Wire error whose code has no dedicated variant
    #[error("Error {}: {}", .0.code, .0.message)]
    Rpc(ErrorData),
}

impl Error {
    /// Convert an error to a JSON-RPC error code
    pub fn to_code(&self) -> i32 {
        use error_codes::*;
        match self {
            Error::Json(_) | Error::Parse(_) => PARSE_ERROR,
            Error::InvalidRequest(_) => INVALID_REQUEST,
            Error::MethodNotFound(_) => METHOD_NOT_FOUND,
            Error::InvalidParams(_) => INVALID_PARAMS,
            Error::Protocol(_) => PROTOCOL_ERROR,
            Error::NotInitialized(_) => NOT_INITIALIZED,
            Error::AlreadyInitialized(_) => ALREADY_INITIALIZED,
            Error::UnsupportedProtocolVersion(_) => UNSUPPORTED_PROTOCOL_VERSION,
            Error::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            Error::ResourceTemplateNotFound(_) => RESOURCE_TEMPLATE_NOT_FOUND,
            Error::PromptNotFound(_) => PROMPT_NOT_FOUND,
            Error::ToolNotFound(_) => TOOL_NOT_FOUND,
            Error::CapabilityNotSupported(_) => CAPABILITY_NOT_SUPPORTED,
            Error::RequestCancelled(_) => REQUEST_CANCELLED,
            Error::Rpc(data) => data.code,
            Error::Io(_)
            | Error::Transport(_)
            | Error::Timeout(_)
            | Error::Internal(_)
            | Error::Registration(_) => INTERNAL_ERROR,
        }
    }

    /// True for failures of the channel itself rather than of the peer's answer.
    ///
    /// Only protocol-level errors carry a structured `{code, message}` from the peer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Timeout(_) | Error::Io(_))
    }

    /// The bare message, without the variant prefix used by `Display`
    pub fn message(&self) -> String {
        match self {
            Error::Json(e) => e.to_string(),
            Error::Io(e) => e.to_string(),
            Error::Rpc(data) => data.message.clone(),
            Error::Transport(s)
            | Error::Timeout(s)
            | Error::Parse(s)
            | Error::InvalidRequest(s)
            | Error::MethodNotFound(s)
            | Error::InvalidParams(s)
            | Error::Internal(s)
            | Error::Protocol(s)
            | Error::NotInitialized(s)
            | Error::AlreadyInitialized(s)
            | Error::UnsupportedProtocolVersion(s)
            | Error::ResourceNotFound(s)
            | Error::ResourceTemplateNotFound(s)
            | Error::PromptNotFound(s)
            | Error::ToolNotFound(s)
            | Error::CapabilityNotSupported(s)
            | Error::RequestCancelled(s)
            | Error::Registration(s) => s.clone(),
        }
    }

    /// Build the `{code, message, data}` triple sent on the wire
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            Error::Rpc(data) => data.clone(),
            _ =>
                ErrorData {
                    code: self.to_code(),
                    message: self.message(),
                    data: None,
                },
        }
    }

    /// Map a received wire error back onto the typed taxonomy
    pub fn from_error_data(data: ErrorData) -> Self {
        use error_codes::*;
        let message = data.message.clone();
        match data.code {
            PARSE_ERROR => Error::Parse(message),
            INVALID_REQUEST => Error::InvalidRequest(message),
            METHOD_NOT_FOUND => Error::MethodNotFound(message),
            INVALID_PARAMS => Error::InvalidParams(message),
            INTERNAL_ERROR => Error::Internal(message),
            PROTOCOL_ERROR => Error::Protocol(message),
            NOT_INITIALIZED => Error::NotInitialized(message),
            ALREADY_INITIALIZED => Error::AlreadyInitialized(message),
            UNSUPPORTED_PROTOCOL_VERSION => Error::UnsupportedProtocolVersion(message),
            RESOURCE_NOT_FOUND => Error::ResourceNotFound(message),
            RESOURCE_TEMPLATE_NOT_FOUND => Error::ResourceTemplateNotFound(message),
            PROMPT_NOT_FOUND => Error::PromptNotFound(message),
            TOOL_NOT_FOUND => Error::ToolNotFound(message),
            CAPABILITY_NOT_SUPPORTED => Error::CapabilityNotSupported(message),
            REQUEST_CANCELLED => Error::RequestCancelled(message),
            _ => Error::Rpc(data),
        }
    }

    /// Create an error response payload from this error
    pub fn to_response_payload(&self, id: Option<RequestId>) -> JSONRPCError {
        let data = self.to_error_data();
        create_error_response(id, data.code, &data.message, data.data)
    }
}

// Manual implementation of Clone that handles non-cloneable types
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Json(e) => Error::Parse(e.to_string()),
            Error::Io(e) => Error::Transport(format!("I/O error: {}", e)),
            Error::Transport(s) => Error::Transport(s.clone()),
            Error::Timeout(s) => Error::Timeout(s.clone()),
            Error::Parse(s) => Error::Parse(s.clone()),
            Error::InvalidRequest(s) => Error::InvalidRequest(s.clone()),
            Error::MethodNotFound(s) => Error::MethodNotFound(s.clone()),
            Error::InvalidParams(s) => Error::InvalidParams(s.clone()),
            Error::Internal(s) => Error::Internal(s.clone()),
            Error::Protocol(s) => Error::Protocol(s.clone()),
            Error::NotInitialized(s) => Error::NotInitialized(s.clone()),
            Error::AlreadyInitialized(s) => Error::AlreadyInitialized(s.clone()),
            Error::UnsupportedProtocolVersion(s) => Error::UnsupportedProtocolVersion(s.clone()),
            Error::ResourceNotFound(s) => Error::ResourceNotFound(s.clone()),
            Error::ResourceTemplateNotFound(s) => Error::ResourceTemplateNotFound(s.clone()),
            Error::PromptNotFound(s) => Error::PromptNotFound(s.clone()),
            Error::ToolNotFound(s) => Error::ToolNotFound(s.clone()),
            Error::CapabilityNotSupported(s) => Error::CapabilityNotSupported(s.clone()),
            Error::RequestCancelled(s) => Error::RequestCancelled(s.clone()),
            Error::Registration(s) => Error::Registration(s.clone()),
            Error::Rpc(data) => Error::Rpc(data.clone()),
        }
    }
}

/// Create an error response with the given code, message, and optional data
///
/// A `None` id serializes as `null`, used when the failing message could not be
/// attributed to a request.
pub fn create_error_response(
    id: Option<RequestId>,
    code: i32,
    message: &str,
    data: Option<Value>
) -> JSONRPCError {
    JSONRPCError {
        jsonrpc: crate::protocol::JSONRPC_VERSION.to_string(),
        id,
        error: ErrorData {
            code,
            message: message.to_string(),
            data,
        },
    }
}

/// Create a parse error response, which never has an id
pub fn parse_error(message: &str) -> JSONRPCError {
    create_error_response(None, error_codes::PARSE_ERROR, message, None)
}

/// Create an internal error response
pub fn internal_error(id: Option<RequestId>, message: &str) -> JSONRPCError {
    create_error_response(id, error_codes::INTERNAL_ERROR, message, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_taxonomy() {
        assert_eq!(Error::Parse("x".into()).to_code(), -32700);
        assert_eq!(Error::InvalidRequest("x".into()).to_code(), -32600);
        assert_eq!(Error::MethodNotFound("x".into()).to_code(), -32601);
        assert_eq!(Error::InvalidParams("x".into()).to_code(), -32602);
        assert_eq!(Error::Internal("x".into()).to_code(), -32603);
        assert_eq!(Error::Protocol("x".into()).to_code(), -32000);
        assert_eq!(Error::NotInitialized("x".into()).to_code(), -32001);
        assert_eq!(Error::AlreadyInitialized("x".into()).to_code(), -32002);
        assert_eq!(Error::UnsupportedProtocolVersion("x".into()).to_code(), -32003);
        assert_eq!(Error::ResourceNotFound("x".into()).to_code(), -32004);
        assert_eq!(Error::ResourceTemplateNotFound("x".into()).to_code(), -32005);
        assert_eq!(Error::PromptNotFound("x".into()).to_code(), -32006);
        assert_eq!(Error::ToolNotFound("x".into()).to_code(), -32007);
        assert_eq!(Error::CapabilityNotSupported("x".into()).to_code(), -32008);
        assert_eq!(Error::RequestCancelled("x".into()).to_code(), -32009);
    }

    #[test]
    fn test_untyped_errors_become_internal() {
        assert_eq!(Error::Transport("pipe closed".into()).to_code(), -32603);
        assert_eq!(Error::Registration("no description".into()).to_code(), -32603);
    }

    #[test]
    fn test_error_data_round_trip() {
        let original = Error::ToolNotFound("Tool 'nope' not found".into());
        let data = original.to_error_data();
        assert_eq!(data.code, error_codes::TOOL_NOT_FOUND);

        match Error::from_error_data(data) {
            Error::ToolNotFound(_) => {}
            other => panic!("unexpected variant: {:?}", other),
        }

        let unknown = ErrorData { code: -31999, message: "custom".into(), data: None };
        match Error::from_error_data(unknown.clone()) {
            Error::Rpc(data) => assert_eq!(data, unknown),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_transport_errors_are_distinguishable() {
        assert!(Error::Transport("child exited".into()).is_transport());
        assert!(Error::Timeout("30s".into()).is_transport());
        assert!(!Error::ToolNotFound("add".into()).is_transport());
        assert!(!Error::from_error_data(ErrorData {
            code: -32603,
            message: "boom".into(),
            data: None,
        }).is_transport());
    }

    #[test]
    fn test_parse_error_has_null_id() {
        let response = parse_error("bad json");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["id"].is_null());
        assert_eq!(json["error"]["code"], -32700);
    }
}
