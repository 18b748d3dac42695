//! Registry of invocable primitives held by a server

use std::ops::{ Add, AddAssign };

use crate::errors::Error;
use crate::protocol::Definition;
use crate::registry::primitives::{ Capability, Prompt, Resource, ResourceEntry, ResourceTemplate, Tool };

/// Tools, resources (concrete or templated) and prompts a server can invoke.
///
/// Lookups return the first match, so when two registries are merged the left
/// operand's entries take precedence.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    tools: Vec<Tool>,
    resources: Vec<ResourceEntry>,
    prompts: Vec<Prompt>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(&mut self, tool: Tool) {
        tracing::debug!("Registering tool '{}'", tool.name());
        self.tools.push(tool);
    }

    pub fn register_resource(&mut self, resource: Resource) {
        tracing::debug!("Registering resource '{}'", resource.uri());
        self.resources.push(ResourceEntry::Static(resource));
    }

    pub fn register_resource_template(&mut self, template: ResourceTemplate) {
        tracing::debug!("Registering resource template '{}'", template.uri_template());
        self.resources.push(ResourceEntry::Template(template));
    }

    pub fn register_prompt(&mut self, prompt: Prompt) {
        tracing::debug!("Registering prompt '{}'", prompt.name());
        self.prompts.push(prompt);
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    /// Concrete resources in registration order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter_map(|entry| {
            match entry {
                ResourceEntry::Static(resource) => Some(resource),
                ResourceEntry::Template(_) => None,
            }
        })
    }

    /// Resource templates in registration order
    pub fn resource_templates(&self) -> impl Iterator<Item = &ResourceTemplate> {
        self.resources.iter().filter_map(|entry| {
            match entry {
                ResourceEntry::Template(template) => Some(template),
                ResourceEntry::Static(_) => None,
            }
        })
    }

    pub fn find_tool(&self, name: &str) -> Result<&Tool, Error> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| Error::ToolNotFound(format!("Tool '{}' not found", name)))
    }

    pub fn find_prompt(&self, name: &str) -> Result<&Prompt, Error> {
        self.prompts
            .iter()
            .find(|prompt| prompt.name() == name)
            .ok_or_else(|| Error::PromptNotFound(format!("Prompt '{}' not found", name)))
    }

    /// Find the entry serving `uri`: exact URI match first, then template match
    pub fn find_resource(&self, uri: &str) -> Result<&ResourceEntry, Error> {
        let exact = self.resources.iter().find(|entry| {
            matches!(entry, ResourceEntry::Static(resource) if resource.uri() == uri)
        });
        if let Some(entry) = exact {
            return Ok(entry);
        }

        self.resources
            .iter()
            .find(|entry| {
                matches!(entry, ResourceEntry::Template(template) if template.matches(uri))
            })
            .ok_or_else(|| Error::ResourceNotFound(format!("Resource '{}' not found", uri)))
    }

    /// Every capability as its data-only definition
    pub fn definitions(&self) -> Vec<Definition> {
        self.tools
            .iter()
            .map(Capability::definition)
            .chain(self.resources.iter().map(ResourceEntry::definition))
            .chain(self.prompts.iter().map(Capability::definition))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.resources.is_empty() && self.prompts.is_empty()
    }
}

impl AddAssign for ServerRegistry {
    fn add_assign(&mut self, other: Self) {
        self.tools.extend(other.tools);
        self.resources.extend(other.resources);
        self.prompts.extend(other.prompts);
    }
}

impl Add for ServerRegistry {
    type Output = ServerRegistry;

    fn add(mut self, other: Self) -> Self::Output {
        self += other;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::primitives::ParamType;
    use serde_json::Value;

    fn resource(uri: &str, text: &'static str) -> Resource {
        Resource::new(uri, "r", "A resource.", move || Ok(text.to_string())).unwrap()
    }

    fn template(uri: &str, text: &'static str) -> ResourceTemplate {
        ResourceTemplate::new(uri, "t", "A template.", move |_| Ok(text.to_string())).unwrap()
    }

    fn tool(name: &str, answer: i64) -> Tool {
        Tool::new(name, "A tool.", &[("x", ParamType::Any)], move |_| Ok(answer)).unwrap()
    }

    #[test]
    fn test_exact_resource_beats_template() {
        let mut registry = ServerRegistry::new();
        registry.register_resource_template(template("file://todos/{date}", "templated"));
        registry.register_resource(resource("file://todos/today", "exact"));

        match registry.find_resource("file://todos/today").unwrap() {
            ResourceEntry::Static(r) => assert_eq!(r.invoke().unwrap(), "exact"),
            other => panic!("unexpected entry: {:?}", other),
        }
        match registry.find_resource("file://todos/2025-05-03").unwrap() {
            ResourceEntry::Template(t) => assert_eq!(t.invoke("file://todos/2025-05-03").unwrap(), "templated"),
            other => panic!("unexpected entry: {:?}", other),
        }
        assert!(matches!(registry.find_resource("file://other/x"), Err(Error::ResourceNotFound(_))));
    }

    #[test]
    fn test_not_found_errors() {
        let registry = ServerRegistry::new();
        assert!(matches!(registry.find_tool("add"), Err(Error::ToolNotFound(_))));
        assert!(matches!(registry.find_prompt("partner"), Err(Error::PromptNotFound(_))));
    }

    #[test]
    fn test_merge_keeps_first_match() {
        let mut left = ServerRegistry::new();
        left.register_tool(tool("answer", 1));
        let mut right = ServerRegistry::new();
        right.register_tool(tool("answer", 2));
        right.register_resource(resource("names://sheepadoodle", "Otis"));

        let merged = left + right;
        assert_eq!(merged.tools().len(), 2);
        let found = merged.find_tool("answer").unwrap();
        let mut args = serde_json::Map::new();
        args.insert("x".into(), Value::Null);
        assert_eq!(found.invoke(&args).unwrap(), Value::from(1));
        assert_eq!(merged.definitions().len(), 3);
    }
}
