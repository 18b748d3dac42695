//! Server-side capability primitives
//!
//! A primitive is a capability description bound to a native function. Everything
//! that can be checked about a primitive is checked when it is constructed, so a
//! bad registration fails at startup instead of on the first call.

use jsonschema::JSONSchema;
use serde::de::DeserializeOwned;
use serde_json::{ Map, Value, json };
use std::collections::HashMap;
use std::fmt;
use std::panic::{ self, AssertUnwindSafe };
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::Error;
use crate::protocol::{
    Definition,
    InputSchema,
    PromptArgument,
    PromptDefinition,
    PromptMessage,
    ResourceDefinition,
    ResourceTemplateDefinition,
    ToolDefinition,
};
use crate::registry::uri_template::UriTemplate;

/// Default MIME type for resources that do not declare one
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// Default advertised size for resources
pub const DEFAULT_RESOURCE_SIZE: u64 = 1024;

/// Handler type for tools
pub type ToolHandler = Arc<dyn (Fn(&Map<String, Value>) -> Result<Value, Error>) + Send + Sync>;

/// Handler type for concrete resources
pub type ResourceHandler = Arc<dyn (Fn() -> Result<String, Error>) + Send + Sync>;

/// Handler type for resource templates, fed the decoded placeholder values
pub type TemplateHandler = Arc<
    dyn (Fn(&HashMap<String, String>) -> Result<String, Error>) + Send + Sync
>;

/// Handler type for prompts
pub type PromptHandler = Arc<
    dyn (Fn(&Map<String, Value>) -> Result<PromptOutput, Error>) + Send + Sync
>;

/// Behaviour shared by every primitive
pub trait Capability {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn definition(&self) -> Definition;
}

/// Parameter types a tool can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Float,
    Str,
    Bool,
    List,
    Dict,
    Any,
}

impl ParamType {
    /// Type name advertised in the tool's input schema
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Str => "str",
            ParamType::Bool => "bool",
            ParamType::List => "list",
            ParamType::Dict => "dict",
            ParamType::Any => "any",
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            ParamType::Int => json!({"type": "integer"}),
            ParamType::Float => json!({"type": "number"}),
            ParamType::Str => json!({"type": "string"}),
            ParamType::Bool => json!({"type": "boolean"}),
            ParamType::List => json!({"type": "array"}),
            ParamType::Dict => json!({"type": "object"}),
            ParamType::Any => json!({}),
        }
    }
}

impl FromStr for ParamType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(ParamType::Int),
            "float" => Ok(ParamType::Float),
            "str" => Ok(ParamType::Str),
            "bool" => Ok(ParamType::Bool),
            "list" => Ok(ParamType::List),
            "dict" => Ok(ParamType::Dict),
            "any" => Ok(ParamType::Any),
            other => Err(Error::Registration(format!("Unknown parameter type '{}'", other))),
        }
    }
}

fn require_text(kind: &str, field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::Registration(format!("{} is missing a {}", kind, field)));
    }
    Ok(())
}

/// Run a capability function, turning a panic into an InternalError
fn invoke_guarded<T>(kind: &str, name: &str, f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("{} '{}' panicked: {}", kind, name, reason);
            Err(Error::Internal(format!("{} '{}' panicked: {}", kind, name, reason)))
        }
    }
}

/// Read one typed argument out of an argument map
pub fn argument<T: DeserializeOwned>(arguments: &Map<String, Value>, name: &str) -> Result<T, Error> {
    let value = arguments
        .get(name)
        .ok_or_else(|| Error::InvalidParams(format!("Missing argument '{}'", name)))?;
    serde_json
        ::from_value(value.clone())
        .map_err(|e| Error::InvalidParams(format!("Argument '{}': {}", name, e)))
}

/// Render a tool's return value as the text of a content block
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// An invocable tool
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    params: Vec<(String, ParamType)>,
    validator: Arc<JSONSchema>,
    handler: ToolHandler,
}

impl Tool {
    /// Bind a function as a tool. Every declared parameter is required.
    pub fn new<F, R>(
        name: impl Into<String>,
        description: impl Into<String>,
        params: &[(&str, ParamType)],
        handler: F
    )
        -> Result<Self, Error>
        where F: Fn(&Map<String, Value>) -> Result<R, Error> + Send + Sync + 'static, R: Into<Value>
    {
        let name = name.into();
        let description = description.into();
        require_text("Tool", "name", &name)?;
        require_text(&format!("Tool '{}'", name), "description", &description)?;

        let mut properties = Map::new();
        let mut required = Vec::new();
        for (param, param_type) in params {
            if properties.insert(param.to_string(), param_type.json_schema()).is_some() {
                return Err(
                    Error::Registration(format!("Tool '{}' declares '{}' twice", name, param))
                );
            }
            required.push(param.to_string());
        }

        let schema =
            json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        });
        let validator = JSONSchema::compile(&schema).map_err(|e| {
            Error::Registration(format!("Tool '{}' has an invalid schema: {}", name, e))
        })?;

        Ok(Self {
            name,
            description,
            params: params
                .iter()
                .map(|(p, t)| (p.to_string(), *t))
                .collect(),
            validator: Arc::new(validator),
            handler: Arc::new(move |arguments| handler(arguments).map(Into::into)),
        })
    }

    pub fn params(&self) -> &[(String, ParamType)] {
        &self.params
    }

    /// Validate the arguments against the captured schema, then call the function
    pub fn invoke(&self, arguments: &Map<String, Value>) -> Result<Value, Error> {
        let instance = Value::Object(arguments.clone());
        if let Err(errors) = self.validator.validate(&instance) {
            let reasons = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(
                Error::InvalidParams(format!("Invalid arguments for tool '{}': {}", self.name, reasons))
            );
        }
        invoke_guarded("Tool", &self.name, || (self.handler)(arguments))
    }

    pub fn tool_definition(&self) -> ToolDefinition {
        let properties = self.params
            .iter()
            .map(|(name, param_type)| (name.clone(), Value::from(param_type.as_str())))
            .collect();
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties,
            },
        }
    }
}

impl Capability for Tool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn definition(&self) -> Definition {
        Definition::Tool(self.tool_definition())
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool").field("name", &self.name).field("params", &self.params).finish()
    }
}

/// An invocable concrete resource
#[derive(Clone)]
pub struct Resource {
    uri: String,
    name: String,
    description: String,
    mime_type: String,
    size: u64,
    handler: ResourceHandler,
}

impl Resource {
    pub fn new<F>(
        uri: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F
    )
        -> Result<Self, Error>
        where F: Fn() -> Result<String, Error> + Send + Sync + 'static
    {
        let uri = uri.into();
        let name = name.into();
        let description = description.into();
        require_text("Resource", "name", &name)?;
        require_text(&format!("Resource '{}'", name), "description", &description)?;

        if UriTemplate::is_template(&uri) {
            return Err(
                Error::Registration(format!("'{}' is a URI template, register a ResourceTemplate", uri))
            );
        }
        let parsed = url::Url
            ::parse(&uri)
            .map_err(|e| Error::Registration(format!("Invalid resource URI '{}': {}", uri, e)))?;
        let mime_type = mime_guess
            ::from_path(parsed.path())
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        Ok(Self {
            uri,
            name,
            description,
            mime_type,
            size: DEFAULT_RESOURCE_SIZE,
            handler: Arc::new(handler),
        })
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn invoke(&self) -> Result<String, Error> {
        invoke_guarded("Resource", &self.name, || (self.handler)())
    }

    pub fn resource_definition(&self) -> ResourceDefinition {
        ResourceDefinition {
            uri: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
        }
    }
}

impl Capability for Resource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn definition(&self) -> Definition {
        Definition::Resource(self.resource_definition())
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource").field("uri", &self.uri).field("name", &self.name).finish()
    }
}

/// An invocable parameterized resource
#[derive(Clone)]
pub struct ResourceTemplate {
    template: UriTemplate,
    name: String,
    description: String,
    mime_type: String,
    handler: TemplateHandler,
}

impl ResourceTemplate {
    pub fn new<F>(
        uri_template: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F
    )
        -> Result<Self, Error>
        where F: Fn(&HashMap<String, String>) -> Result<String, Error> + Send + Sync + 'static
    {
        let name = name.into();
        let description = description.into();
        require_text("Resource template", "name", &name)?;
        require_text(&format!("Resource template '{}'", name), "description", &description)?;
        let template = UriTemplate::parse(uri_template)?;
        let mime_type = mime_guess
            ::from_path(uri_template)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        Ok(Self {
            template,
            name,
            description,
            mime_type,
            handler: Arc::new(handler),
        })
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn uri_template(&self) -> &str {
        self.template.as_str()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Placeholder names captured at registration
    pub fn params(&self) -> Vec<&str> {
        self.template.parameters()
    }

    pub fn matches(&self, uri: &str) -> bool {
        self.template.matches(uri)
    }

    /// Expand `uri` against the template and call the function
    pub fn invoke(&self, uri: &str) -> Result<String, Error> {
        let params = self.template
            .extract(uri)
            .ok_or_else(|| {
                Error::ResourceNotFound(
                    format!("'{}' does not match template '{}'", uri, self.template)
                )
            })?;
        invoke_guarded("Resource template", &self.name, || (self.handler)(&params))
    }

    pub fn template_definition(&self) -> ResourceTemplateDefinition {
        ResourceTemplateDefinition {
            uri_template: self.template.as_str().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

impl Capability for ResourceTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn definition(&self) -> Definition {
        Definition::ResourceTemplate(self.template_definition())
    }
}

impl fmt::Debug for ResourceTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTemplate")
            .field("uri_template", &self.template.as_str())
            .field("name", &self.name)
            .finish()
    }
}

/// Either kind of resource, as stored in the resource list
#[derive(Debug, Clone)]
pub enum ResourceEntry {
    Static(Resource),
    Template(ResourceTemplate),
}

impl ResourceEntry {
    pub fn definition(&self) -> Definition {
        match self {
            ResourceEntry::Static(resource) => resource.definition(),
            ResourceEntry::Template(template) => template.definition(),
        }
    }
}

impl From<Resource> for ResourceEntry {
    fn from(resource: Resource) -> Self {
        ResourceEntry::Static(resource)
    }
}

impl From<ResourceTemplate> for ResourceEntry {
    fn from(template: ResourceTemplate) -> Self {
        ResourceEntry::Template(template)
    }
}

/// What a prompt function returns
#[derive(Debug, Clone, PartialEq)]
pub enum PromptOutput {
    /// Wrapped as a single user message
    Text(String),
    Messages(Vec<PromptMessage>),
}

impl PromptOutput {
    pub fn into_messages(self) -> Vec<PromptMessage> {
        match self {
            PromptOutput::Text(text) => vec![PromptMessage::user(text)],
            PromptOutput::Messages(messages) => messages,
        }
    }
}

impl From<String> for PromptOutput {
    fn from(text: String) -> Self {
        PromptOutput::Text(text)
    }
}

impl From<&str> for PromptOutput {
    fn from(text: &str) -> Self {
        PromptOutput::Text(text.to_string())
    }
}

impl From<Vec<PromptMessage>> for PromptOutput {
    fn from(messages: Vec<PromptMessage>) -> Self {
        PromptOutput::Messages(messages)
    }
}

/// An invocable prompt
#[derive(Clone)]
pub struct Prompt {
    name: String,
    description: String,
    arguments: Vec<PromptArgument>,
    handler: PromptHandler,
}

impl Prompt {
    pub fn new<F, R>(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: Vec<PromptArgument>,
        handler: F
    )
        -> Result<Self, Error>
        where
            F: Fn(&Map<String, Value>) -> Result<R, Error> + Send + Sync + 'static,
            R: Into<PromptOutput>
    {
        let name = name.into();
        let description = description.into();
        require_text("Prompt", "name", &name)?;
        require_text(&format!("Prompt '{}'", name), "description", &description)?;
        for argument in &arguments {
            require_text(&format!("Argument of prompt '{}'", name), "name", &argument.name)?;
        }

        Ok(Self {
            name,
            description,
            arguments,
            handler: Arc::new(move |args| handler(args).map(Into::into)),
        })
    }

    pub fn arguments(&self) -> &[PromptArgument] {
        &self.arguments
    }

    pub fn invoke(&self, arguments: &Map<String, Value>) -> Result<PromptOutput, Error> {
        let missing: Vec<&str> = self.arguments
            .iter()
            .filter(|a| a.required && !arguments.contains_key(&a.name))
            .map(|a| a.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(
                Error::InvalidParams(
                    format!("Prompt '{}' is missing required arguments: {}", self.name, missing.join(", "))
                )
            );
        }
        invoke_guarded("Prompt", &self.name, || (self.handler)(arguments))
    }

    pub fn prompt_definition(&self) -> PromptDefinition {
        PromptDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

impl Capability for Prompt {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn definition(&self) -> Definition {
        Definition::Prompt(self.prompt_definition())
    }
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt").field("name", &self.name).field("arguments", &self.arguments).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn add_tool() -> Tool {
        Tool::new(
            "add",
            "Add two numbers.",
            &[
                ("a", ParamType::Int),
                ("b", ParamType::Int),
            ],
            |args| {
                let a: i64 = argument(args, "a")?;
                let b: i64 = argument(args, "b")?;
                Ok(a + b)
            }
        ).unwrap()
    }

    #[test]
    fn test_tool_invocation() {
        let tool = add_tool();
        let value = tool.invoke(&args(json!({"a": 9801, "b": 1444}))).unwrap();
        assert_eq!(value_to_text(&value), "11245");
    }

    #[test]
    fn test_tool_argument_validation() {
        let tool = add_tool();
        assert!(matches!(tool.invoke(&args(json!({"a": 1}))), Err(Error::InvalidParams(_))));
        assert!(
            matches!(tool.invoke(&args(json!({"a": "1", "b": 2}))), Err(Error::InvalidParams(_)))
        );
        assert!(
            matches!(
                tool.invoke(&args(json!({"a": 1, "b": 2, "c": 3}))),
                Err(Error::InvalidParams(_))
            )
        );
    }

    #[test]
    fn test_tool_definition_uses_type_names() {
        let definition = add_tool().tool_definition();
        assert_eq!(definition.input_schema.schema_type, "object");
        assert_eq!(definition.input_schema.properties["a"], json!("int"));
        assert_eq!(definition.input_schema.properties["b"], json!("int"));
    }

    #[test]
    fn test_registration_errors() {
        let no_description = Tool::new("noop", "  ", &[], |_| Ok(Value::Null));
        assert!(matches!(no_description, Err(Error::Registration(_))));

        let duplicate = Tool::new("dup", "Duplicate params.", &[
            ("x", ParamType::Int),
            ("x", ParamType::Str),
        ], |_| Ok(Value::Null));
        assert!(duplicate.is_err());

        let bad_uri = Resource::new("not a uri", "bad", "Bad resource.", || Ok(String::new()));
        assert!(matches!(bad_uri, Err(Error::Registration(_))));

        let templated = Resource::new("file://todos/{date}", "todos", "Todos.", || Ok(String::new()));
        assert!(templated.is_err());

        let no_placeholder = ResourceTemplate::new("names://otis", "otis", "Otis.", |_| {
            Ok(String::new())
        });
        assert!(no_placeholder.is_err());

        assert!("complex".parse::<ParamType>().is_err());
        assert_eq!("int".parse::<ParamType>().unwrap(), ParamType::Int);
    }

    #[test]
    fn test_panicking_tool_becomes_internal_error() {
        let tool = Tool::new("explode", "Always panics.", &[], |_| -> Result<Value, Error> {
            panic!("kaboom")
        }).unwrap();
        match tool.invoke(&Map::new()) {
            Err(Error::Internal(message)) => assert!(message.contains("kaboom")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_resource_defaults() {
        let resource = Resource::new("names://sheepadoodle", "sheepadoodle", "Name of the dog.", || {
            Ok("Otis".to_string())
        }).unwrap();
        let definition = resource.resource_definition();
        assert_eq!(definition.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(definition.size, DEFAULT_RESOURCE_SIZE);
        assert_eq!(resource.invoke().unwrap(), "Otis");

        let markdown = Resource::new("file:///notes/today.md", "today", "Today's note.", || {
            Ok(String::new())
        }).unwrap();
        assert_eq!(markdown.mime_type(), "text/markdown");
    }

    #[test]
    fn test_template_invocation() {
        let template = ResourceTemplate::new(
            "file://todos/{date}",
            "todos",
            "Todos for a date.",
            |params| Ok(format!("todos for {}", params["date"]))
        ).unwrap();
        assert_eq!(template.params(), vec!["date"]);
        assert_eq!(template.invoke("file://todos/2025-05-03").unwrap(), "todos for 2025-05-03");
        assert!(matches!(template.invoke("file://todos/a/b"), Err(Error::ResourceNotFound(_))));
    }

    #[test]
    fn test_prompt_wraps_text_as_user_message() {
        let prompt = Prompt::new(
            "partner",
            "Suggest partners.",
            vec![PromptArgument {
                name: "topic".into(),
                description: "Topic".into(),
                required: true,
            }],
            |args| {
                let topic: String = argument(args, "topic")?;
                Ok(format!("Suggest partners for {}", topic))
            }
        ).unwrap();

        let messages = prompt
            .invoke(&args(json!({"topic": "BI"})))
            .unwrap()
            .into_messages();
        assert_eq!(messages, vec![PromptMessage::user("Suggest partners for BI")]);
        assert!(matches!(prompt.invoke(&Map::new()), Err(Error::InvalidParams(_))));
    }
}
