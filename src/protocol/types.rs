//! Shared protocol data types: implementation info, capabilities, content blocks and
//! the data-only capability definitions a peer sees.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };

/// Describes the name and version of a protocol implementation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: version.into() }
    }
}

/// Options attached to an advertised capability
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CapabilityOptions {
    /// Whether the server emits list-changed notifications
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,

    /// Whether the server supports subscriptions (resources only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
}

/// A capability entry: either a plain boolean or an options object.
///
/// An options object, even an empty one, means the capability is present.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum CapabilityFlag {
    Enabled(bool),
    Options(CapabilityOptions),
}

impl CapabilityFlag {
    pub fn is_enabled(&self) -> bool {
        match self {
            CapabilityFlag::Enabled(enabled) => *enabled,
            CapabilityFlag::Options(_) => true,
        }
    }

    /// Present, with `listChanged` set
    pub fn with_list_changed(list_changed: bool) -> Self {
        CapabilityFlag::Options(CapabilityOptions {
            list_changed: Some(list_changed),
            subscribe: None,
        })
    }
}

/// Capabilities a server may support.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<CapabilityFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<CapabilityFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<CapabilityFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<CapabilityFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Map<String, Value>>,
}

impl ServerCapabilities {
    pub fn supports_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(CapabilityFlag::is_enabled)
    }

    pub fn supports_resources(&self) -> bool {
        self.resources.as_ref().is_some_and(CapabilityFlag::is_enabled)
    }

    pub fn supports_prompts(&self) -> bool {
        self.prompts.as_ref().is_some_and(CapabilityFlag::is_enabled)
    }

    pub fn supports_logging(&self) -> bool {
        self.logging.as_ref().is_some_and(CapabilityFlag::is_enabled)
    }
}

/// Capabilities a client may support. The lite handshake sends these empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<CapabilityFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Map<String, Value>>,
}

/// The sender or recipient of messages and data in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Text contents of a resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct TextResourceContents {
    pub uri: String,
    pub text: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// A content block. Only text is produced by the server today; the other kinds are
/// accepted on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Content {
    #[serde(rename = "text")] Text {
        text: String,
    },
    #[serde(rename = "image")] Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    #[serde(rename = "resource")] Resource {
        resource: TextResourceContents,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    /// The text payload, if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A message returned as part of a prompt.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: Content,
}

impl PromptMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: Content::text(text) }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: Content::text(text) }
    }
}

/// Input schema of a tool: parameter name to type name
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self { schema_type: "object".to_string(), properties: Map::new() }
    }
}

/// Definition of a tool as seen by a remote peer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: InputSchema,
}

/// Definition of a concrete resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub size: u64,
}

/// Definition of a parameterized resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceTemplateDefinition {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Argument accepted by a prompt
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Definition of a prompt
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PromptDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// Any capability definition
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Tool(ToolDefinition),
    Resource(ResourceDefinition),
    ResourceTemplate(ResourceTemplateDefinition),
    Prompt(PromptDefinition),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Tool(d) => &d.name,
            Definition::Resource(d) => &d.name,
            Definition::ResourceTemplate(d) => &d.name,
            Definition::Prompt(d) => &d.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capability_flags() {
        let caps: ServerCapabilities = serde_json
            ::from_value(
                json!({
                "tools": false,
                "resources": {"listChanged": true, "subscribe": true},
                "prompts": {}
            })
            )
            .unwrap();
        assert!(!caps.supports_tools());
        assert!(caps.supports_resources());
        assert!(caps.supports_prompts());
        assert!(!caps.supports_logging());
    }

    #[test]
    fn test_content_is_tagged_by_type() {
        let value = serde_json::to_value(Content::text("11245")).unwrap();
        assert_eq!(value, json!({"type": "text", "text": "11245"}));
    }

    #[test]
    fn test_tool_definition_wire_shape() {
        let mut properties = Map::new();
        properties.insert("a".to_string(), json!("int"));
        let definition = ToolDefinition {
            name: "add".to_string(),
            description: "Add two numbers.".to_string(),
            input_schema: InputSchema { schema_type: "object".to_string(), properties },
        };
        assert_eq!(
            serde_json::to_value(&definition).unwrap(),
            json!({
                "name": "add",
                "description": "Add two numbers.",
                "inputSchema": {"type": "object", "properties": {"a": "int"}}
            })
        );
    }
}
