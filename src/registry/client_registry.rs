//! Registry of capability definitions mirrored from a remote server

use serde_json::{ Value, json };
use std::ops::{ Add, AddAssign };

use crate::protocol::{
    Definition,
    PromptDefinition,
    Request,
    ResourceDefinition,
    ResourceTemplateDefinition,
    ToolDefinition,
};
use crate::registry::uri_template::UriTemplate;

/// What a client learned about its server during the handshake
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientRegistry {
    pub tools: Vec<ToolDefinition>,
    pub resources: Vec<ResourceDefinition>,
    pub resource_templates: Vec<ResourceTemplateDefinition>,
    pub prompts: Vec<PromptDefinition>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn find_prompt(&self, name: &str) -> Option<&PromptDefinition> {
        self.prompts.iter().find(|prompt| prompt.name == name)
    }

    /// Exact URI match first, then the first template that matches
    pub fn find_resource(&self, uri: &str) -> Option<Definition> {
        if let Some(resource) = self.resources.iter().find(|r| r.uri == uri) {
            return Some(Definition::Resource(resource.clone()));
        }
        self.resource_templates
            .iter()
            .find(|t| {
                UriTemplate::parse(&t.uri_template)
                    .map(|template| template.matches(uri))
                    .unwrap_or(false)
            })
            .map(|t| Definition::ResourceTemplate(t.clone()))
    }

    /// The definition that would serve `request`, if any.
    ///
    /// Only calls, reads and prompt fetches are routable; every other request
    /// kind has no owner.
    pub fn lookup(&self, request: &Request) -> Option<Definition> {
        match request {
            Request::CallTool(params) => self.find_tool(&params.name).cloned().map(Definition::Tool),
            Request::GetPrompt(params) => {
                self.find_prompt(&params.name).cloned().map(Definition::Prompt)
            }
            Request::ReadResource(params) => self.find_resource(&params.uri),
            _ => None,
        }
    }

    pub fn owns(&self, request: &Request) -> bool {
        self.lookup(request).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() &&
            self.resources.is_empty() &&
            self.resource_templates.is_empty() &&
            self.prompts.is_empty()
    }

    /// Definitions rendered for external prompt templating
    pub fn to_json(&self) -> Value {
        json!({
            "tools": self.tools,
            "resources": self.resources,
            "resource_templates": self.resource_templates,
            "prompts": self.prompts,
        })
    }
}

impl AddAssign for ClientRegistry {
    fn add_assign(&mut self, other: Self) {
        self.tools.extend(other.tools);
        self.resources.extend(other.resources);
        self.resource_templates.extend(other.resource_templates);
        self.prompts.extend(other.prompts);
    }
}

impl Add for ClientRegistry {
    type Output = ClientRegistry;

    fn add(mut self, other: Self) -> Self::Output {
        self += other;
        self
    }
}
