//! Method dispatch
//!
//! A static table maps every request method to its handler. Handlers look the
//! target up in the [`ServerRegistry`], invoke it, and wrap the return value in
//! the typed result for that method.

use std::sync::Arc;
use tracing::debug;

use crate::errors::Error;
use crate::protocol::{
    CallToolResult,
    GetPromptResult,
    Implementation,
    InitializeResult,
    ListPromptsResult,
    ListResourceTemplatesResult,
    ListResourcesResult,
    ListToolsResult,
    Method,
    PROTOCOL_VERSION,
    ReadResourceResult,
    Request,
    ResourceContents,
    ServerCapabilities,
    ServerResult,
    TextResourceContents,
};
use crate::registry::{ Capability, ResourceEntry, ServerRegistry, value_to_text };

/// A route handler. `None` means the method has no behaviour and yields no result.
type Handler = fn(&Router, Request) -> Result<Option<ServerResult>, Error>;

/// Every request method and its handler
const ROUTES: &[(Method, Handler)] = &[
    (Method::Initialize, Router::initialize),
    (Method::Ping, Router::reserved),
    (Method::ToolsList, Router::list_tools),
    (Method::ToolsCall, Router::call_tool),
    (Method::ResourcesList, Router::list_resources),
    (Method::ResourcesRead, Router::read_resource),
    (Method::ResourcesTemplatesList, Router::list_resource_templates),
    (Method::ResourcesSubscribe, Router::reserved),
    (Method::ResourcesUnsubscribe, Router::reserved),
    (Method::PromptsList, Router::list_prompts),
    (Method::PromptsGet, Router::get_prompt),
    (Method::LoggingSetLevel, Router::reserved),
    (Method::RootsList, Router::reserved),
    (Method::SamplingCreateMessage, Router::reserved),
    (Method::CompletionComplete, Router::reserved),
];

fn route_mismatch(method: Method) -> Error {
    Error::Internal(format!("Route '{}' received a request of another kind", method))
}

/// Turns typed requests into typed results against one registry
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<ServerRegistry>,
    server_info: Implementation,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
}

impl Router {
    pub fn new(
        registry: Arc<ServerRegistry>,
        server_info: Implementation,
        capabilities: ServerCapabilities,
        instructions: Option<String>
    ) -> Self {
        Self { registry, server_info, capabilities, instructions }
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Dispatch a request through the route table
    pub fn dispatch(&self, request: Request) -> Result<Option<ServerResult>, Error> {
        let method = request.method();
        let (_, handler) = ROUTES.iter()
            .find(|(route, _)| *route == method)
            .ok_or_else(|| Error::MethodNotFound(format!("Method '{}' not found", method)))?;
        debug!("Dispatching {}", method);
        handler(self, request)
    }

    fn initialize(&self, _request: Request) -> Result<Option<ServerResult>, Error> {
        Ok(
            Some(
                ServerResult::Initialize(InitializeResult {
                    capabilities: self.capabilities.clone(),
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    server_info: self.server_info.clone(),
                    instructions: self.instructions.clone(),
                })
            )
        )
    }

    fn reserved(&self, request: Request) -> Result<Option<ServerResult>, Error> {
        debug!("No behaviour behind {}", request.method());
        Ok(None)
    }

    fn list_tools(&self, _request: Request) -> Result<Option<ServerResult>, Error> {
        let tools = self.registry
            .tools()
            .iter()
            .map(|tool| tool.tool_definition())
            .collect();
        Ok(Some(ServerResult::ListTools(ListToolsResult { tools })))
    }

    fn call_tool(&self, request: Request) -> Result<Option<ServerResult>, Error> {
        let Request::CallTool(params) = request else {
            return Err(route_mismatch(Method::ToolsCall));
        };
        let tool = self.registry.find_tool(&params.name)?;
        let value = tool.invoke(&params.arguments)?;
        Ok(Some(ServerResult::CallTool(CallToolResult::text(value_to_text(&value)))))
    }

    fn list_resources(&self, _request: Request) -> Result<Option<ServerResult>, Error> {
        let resources = self.registry
            .resources()
            .map(|resource| resource.resource_definition())
            .collect();
        Ok(Some(ServerResult::ListResources(ListResourcesResult { resources })))
    }

    fn list_resource_templates(&self, _request: Request) -> Result<Option<ServerResult>, Error> {
        let resource_templates = self.registry
            .resource_templates()
            .map(|template| template.template_definition())
            .collect();
        Ok(
            Some(
                ServerResult::ListResourceTemplates(ListResourceTemplatesResult { resource_templates })
            )
        )
    }

    fn read_resource(&self, request: Request) -> Result<Option<ServerResult>, Error> {
        let Request::ReadResource(params) = request else {
            return Err(route_mismatch(Method::ResourcesRead));
        };

        let (text, mime_type) = match self.registry.find_resource(&params.uri)? {
            ResourceEntry::Static(resource) => (resource.invoke()?, resource.mime_type()),
            ResourceEntry::Template(template) => {
                (template.invoke(&params.uri)?, template.mime_type())
            }
        };

        Ok(
            Some(
                ServerResult::ReadResource(ReadResourceResult {
                    resource: ResourceContents {
                        uri: params.uri.clone(),
                        contents: TextResourceContents {
                            uri: params.uri.clone(),
                            text,
                            mime_type: mime_type.to_string(),
                        },
                    },
                })
            )
        )
    }

    fn list_prompts(&self, _request: Request) -> Result<Option<ServerResult>, Error> {
        let prompts = self.registry
            .prompts()
            .iter()
            .map(|prompt| prompt.prompt_definition())
            .collect();
        Ok(Some(ServerResult::ListPrompts(ListPromptsResult { prompts })))
    }

    fn get_prompt(&self, request: Request) -> Result<Option<ServerResult>, Error> {
        let Request::GetPrompt(params) = request else {
            return Err(route_mismatch(Method::PromptsGet));
        };
        let prompt = self.registry.find_prompt(&params.name)?;
        let messages = prompt.invoke(&params.arguments)?.into_messages();
        Ok(
            Some(
                ServerResult::GetPrompt(GetPromptResult {
                    messages,
                    description: Some(prompt.description().to_string()),
                })
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ ClientCapabilities, InitializeParams };
    use crate::registry::{ ParamType, Prompt, Resource, ResourceTemplate, Tool, argument };
    use serde_json::{ Map, json };
    use std::collections::HashSet;

    fn router() -> Router {
        let mut registry = ServerRegistry::new();
        registry.register_tool(
            Tool::new("add", "Add two numbers.", &[
                ("a", ParamType::Int),
                ("b", ParamType::Int),
            ], |args| Ok(argument::<i64>(args, "a")? + argument::<i64>(args, "b")?)).unwrap()
        );
        registry.register_resource(
            Resource::new("names://sheepadoodle", "sheepadoodle", "Name of the dog.", || {
                Ok("Otis".to_string())
            }).unwrap()
        );
        registry.register_resource_template(
            ResourceTemplate::new("notes://{title}", "notes", "A note by title.", |params| {
                Ok(format!("note: {}", params["title"]))
            }).unwrap()
        );
        registry.register_prompt(
            Prompt::new("partner", "Suggest partners.", vec![], |_| Ok("Suggest partners")).unwrap()
        );
        Router::new(
            Arc::new(registry),
            Implementation::new("test-server", "0.1.0"),
            ServerCapabilities::default(),
            None
        )
    }

    #[test]
    fn test_route_table_covers_every_request_method() {
        let routed: HashSet<Method> = ROUTES.iter()
            .map(|(method, _)| *method)
            .collect();
        let requests: HashSet<Method> = Method::requests().iter().copied().collect();
        assert_eq!(routed, requests);
        assert_eq!(ROUTES.len(), Method::requests().len());
    }

    #[test]
    fn test_call_tool() {
        let mut args = Map::new();
        args.insert("a".into(), json!(9801));
        args.insert("b".into(), json!(1444));
        let result = router().dispatch(Request::call_tool("add", args)).unwrap();
        assert_eq!(result, Some(ServerResult::CallTool(CallToolResult::text("11245"))));
    }

    #[test]
    fn test_unknown_targets() {
        let router = router();
        assert!(
            matches!(router.dispatch(Request::call_tool("nope", Map::new())), Err(Error::ToolNotFound(_)))
        );
        assert!(
            matches!(
                router.dispatch(Request::read_resource("names://nobody")),
                Err(Error::ResourceNotFound(_))
            )
        );
        assert!(
            matches!(
                router.dispatch(Request::get_prompt("nope", Map::new())),
                Err(Error::PromptNotFound(_))
            )
        );
    }

    #[test]
    fn test_read_resource_shapes() {
        let router = router();
        let Some(ServerResult::ReadResource(result)) = router
            .dispatch(Request::read_resource("notes://Summary%20of%20my%20Job"))
            .unwrap() else {
            panic!("expected a read result");
        };
        assert_eq!(result.resource.uri, "notes://Summary%20of%20my%20Job");
        assert_eq!(result.resource.contents.text, "note: Summary of my Job");
        assert_eq!(result.resource.contents.mime_type, "text/plain");
    }

    #[test]
    fn test_lists_split_resources_and_templates() {
        let router = router();
        let Some(ServerResult::ListResources(resources)) = router.dispatch(Request::ListResources).unwrap() else {
            panic!("expected resources");
        };
        assert_eq!(resources.resources.len(), 1);
        let Some(ServerResult::ListResourceTemplates(templates)) = router
            .dispatch(Request::ListResourceTemplates)
            .unwrap() else {
            panic!("expected templates");
        };
        assert_eq!(templates.resource_templates[0].uri_template, "notes://{title}");
    }

    #[test]
    fn test_prompt_description_and_reserved_methods() {
        let router = router();
        let Some(ServerResult::GetPrompt(prompt)) = router
            .dispatch(Request::get_prompt("partner", Map::new()))
            .unwrap() else {
            panic!("expected prompt");
        };
        assert_eq!(prompt.description.as_deref(), Some("Suggest partners."));
        assert_eq!(prompt.joined_text(), "Suggest partners");

        assert_eq!(router.dispatch(Request::ping()).unwrap(), None);

        let init = router
            .dispatch(
                Request::Initialize(InitializeParams {
                    capabilities: ClientCapabilities::default(),
                    client_info: Implementation::new("c", "1"),
                    protocol_version: PROTOCOL_VERSION.into(),
                })
            )
            .unwrap();
        assert!(matches!(init, Some(ServerResult::Initialize(_))));
    }
}
