//! JSON-RPC 2.0 envelope types
//!
//! The envelope is the untyped wire form. Typed requests, results and notifications
//! live in [`crate::protocol::messages`] and are blessed into / unblessed from these.

use schemars::JsonSchema;
use serde::{ Deserialize, Deserializer, Serialize };
use serde_json::{ Map, Value };
use std::fmt;

use crate::errors::{ Error, ErrorData };

/// JSON-RPC version carried by every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version announced during the handshake
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Versions a client accepts in the server's `InitializeResult`
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[PROTOCOL_VERSION, "1.0.0"];

/// A uniquely identifying ID for a request in JSON-RPC.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl RequestId {
    /// A fresh random token, never reused
    pub fn fresh() -> Self {
        RequestId::String(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A request that expects a response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JSONRPCRequest {
    /// The JSON-RPC version (always "2.0").
    pub jsonrpc: String,

    /// The request ID.
    pub id: RequestId,

    /// The method name.
    pub method: String,

    /// The request parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC notification which does not expect a response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JSONRPCNotification {
    /// The JSON-RPC version (always "2.0").
    pub jsonrpc: String,

    /// The method name.
    pub method: String,

    /// The notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A successful (non-error) response to a request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JSONRPCResponse {
    /// The JSON-RPC version (always "2.0").
    pub jsonrpc: String,

    /// The request ID this response is for.
    pub id: RequestId,

    /// The response result.
    pub result: Value,
}

/// A JSON-RPC error response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JSONRPCError {
    /// The JSON-RPC version (always "2.0").
    pub jsonrpc: String,

    /// The request ID this error is for; `null` when it could not be determined.
    pub id: Option<RequestId>,

    /// The error details.
    pub error: ErrorData,
}

/// Any envelope that can travel over a transport
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum JSONRPCMessage {
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
    Response(JSONRPCResponse),
    Error(JSONRPCError),
}

impl JSONRPCMessage {
    /// Parse wire text into an envelope.
    ///
    /// Text that is not JSON yields `Error::Json` (ParseError). Well-formed JSON that
    /// fits no envelope shape yields `InvalidRequest`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Classify an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut object) = value else {
            return Err(Error::InvalidRequest("Envelope must be a JSON object".to_string()));
        };

        match object.get("jsonrpc") {
            None => {}
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(other) => {
                return Err(Error::InvalidRequest(format!("Unsupported jsonrpc version: {}", other)));
            }
        }

        let id = take_id(&mut object)?;
        let has_result = object.contains_key("result");
        let has_error = object.contains_key("error");

        if has_result && has_error {
            return Err(
                Error::InvalidRequest("Response carries both result and error".to_string())
            );
        }

        if has_error {
            let error: ErrorData = serde_json
                ::from_value(object.remove("error").unwrap_or(Value::Null))
                .map_err(|e| Error::InvalidRequest(format!("Malformed error object: {}", e)))?;
            return Ok(JSONRPCMessage::Error(JSONRPCError {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id,
                error,
            }));
        }

        if has_result {
            let id = id.ok_or_else(|| {
                Error::InvalidRequest("Response is missing its id".to_string())
            })?;
            return Ok(JSONRPCMessage::Response(JSONRPCResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id,
                result: object.remove("result").unwrap_or(Value::Null),
            }));
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            Some(other) => {
                return Err(Error::InvalidRequest(format!("Method must be a string, got {}", other)));
            }
            None => {
                return Err(Error::InvalidRequest("Missing method".to_string()));
            }
        };
        let params = object.remove("params");

        Ok(match id {
            Some(id) =>
                JSONRPCMessage::Request(JSONRPCRequest {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id,
                    method,
                    params,
                }),
            None =>
                JSONRPCMessage::Notification(JSONRPCNotification {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    method,
                    params,
                }),
        })
    }

    /// The id this envelope carries, if any
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JSONRPCMessage::Request(r) => Some(&r.id),
            JSONRPCMessage::Response(r) => Some(&r.id),
            JSONRPCMessage::Error(e) => e.id.as_ref(),
            JSONRPCMessage::Notification(_) => None,
        }
    }

    /// Serialize to compact single-line JSON
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

fn take_id(object: &mut Map<String, Value>) -> Result<Option<RequestId>, Error> {
    match object.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(value) =>
            serde_json
                ::from_value(value)
                .map(Some)
                .map_err(|e| Error::InvalidRequest(format!("Invalid id: {}", e))),
    }
}

impl<'de> Deserialize<'de> for JSONRPCMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: Deserializer<'de>
    {
        let value = Value::deserialize(deserializer)?;
        JSONRPCMessage::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<JSONRPCRequest> for JSONRPCMessage {
    fn from(request: JSONRPCRequest) -> Self {
        JSONRPCMessage::Request(request)
    }
}

impl From<JSONRPCNotification> for JSONRPCMessage {
    fn from(notification: JSONRPCNotification) -> Self {
        JSONRPCMessage::Notification(notification)
    }
}

impl From<JSONRPCResponse> for JSONRPCMessage {
    fn from(response: JSONRPCResponse) -> Self {
        JSONRPCMessage::Response(response)
    }
}

impl From<JSONRPCError> for JSONRPCMessage {
    fn from(error: JSONRPCError) -> Self {
        JSONRPCMessage::Error(error)
    }
}

impl fmt::Display for JSONRPCMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "<unserializable envelope>"),
        }
    }
}

/// Cheap check used by transports: does this outgoing text expect a reply?
///
/// Notifications (a `method` without an id) and responses get no reply; everything
/// else does, including text the peer will reject with ParseError or
/// InvalidRequest.
pub fn expects_reply(text: &str) -> bool {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => {
            if object.contains_key("result") || object.contains_key("error") {
                return false;
            }
            let has_id = !matches!(object.get("id"), None | Some(Value::Null));
            has_id || !object.contains_key("method")
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_envelopes() {
        let request = JSONRPCMessage::parse(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/list","params":{}}"#
        ).unwrap();
        assert!(matches!(request, JSONRPCMessage::Request(ref r) if r.id == RequestId::Number(7)));

        let notification = JSONRPCMessage::parse(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#
        ).unwrap();
        assert!(matches!(notification, JSONRPCMessage::Notification(_)));

        let response = JSONRPCMessage::parse(r#"{"jsonrpc":"2.0","id":"a","result":{}}"#).unwrap();
        assert!(matches!(response, JSONRPCMessage::Response(_)));

        let error = JSONRPCMessage::parse(
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#
        ).unwrap();
        match error {
            JSONRPCMessage::Error(e) => {
                assert!(e.id.is_none());
                assert_eq!(e.error.code, -32700);
            }
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(JSONRPCMessage::parse("{not json"), Err(Error::Json(_))));
        assert!(
            matches!(JSONRPCMessage::parse(r#"{"jsonrpc":"2.0","id":1}"#), Err(Error::InvalidRequest(_)))
        );
        assert!(matches!(JSONRPCMessage::parse("[1,2]"), Err(Error::InvalidRequest(_))));
        assert!(
            matches!(
                JSONRPCMessage::parse(r#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":1,"message":"x"}}"#),
                Err(Error::InvalidRequest(_))
            )
        );
        assert!(
            matches!(
                JSONRPCMessage::parse(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#),
                Err(Error::InvalidRequest(_))
            )
        );
    }

    #[test]
    fn test_notification_has_no_id_on_the_wire() {
        let message = JSONRPCMessage::Notification(JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
        });
        insta::assert_snapshot!(message.to_json().unwrap(), @r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
    }

    #[test]
    fn test_expects_reply() {
        assert!(expects_reply(r#"{"jsonrpc":"2.0","id":"x","method":"ping"}"#));
        assert!(!expects_reply(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#));
        assert!(!expects_reply(r#"{"jsonrpc":"2.0","id":null,"method":"notifications/initialized"}"#));
        assert!(expects_reply("garbage"));
        assert!(expects_reply(r#"{"jsonrpc":"2.0","params":{}}"#));
        assert!(!expects_reply(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#));
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        assert_ne!(RequestId::fresh(), RequestId::fresh());
        assert_eq!(serde_json::to_value(RequestId::Number(3)).unwrap(), json!(3));
    }
}
