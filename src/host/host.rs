//! Host agent loop
//!
//! The host owns a set of clients and the aggregate of their registries. It
//! streams model output through a [`StreamScanner`], forwards any embedded
//! request to the client that owns its target, and feeds the result back into
//! the conversation as an `<observation>` until the model produces an
//! `<answer>`.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };
use std::sync::Arc;
use tracing::{ debug, info, warn };

use crate::client::Client;
use crate::errors::Error;
use crate::host::scanner::{ DEFAULT_MAX_BUFFER, StreamScanner };
use crate::protocol::{ CallToolResult, Content, Request, ServerResult };
use crate::registry::ClientRegistry;

const ANSWER_OPEN: &str = "<answer>";
const ANSWER_CLOSE: &str = "</answer>";

/// One message in the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Ordered conversation history
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn add_new(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.add(ChatMessage::new(role, content));
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// The language model the host drives. Each call streams one response as text
/// fragments.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn stream(
        &self,
        messages: &[ChatMessage]
    ) -> Result<BoxStream<'static, Result<String, Error>>, Error>;
}

/// Configuration for the host
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Upper bound on model round-trips per query
    pub max_turns: usize,
    /// Scanner buffer cap in bytes
    pub max_buffer: usize,
    pub system_prompt: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_buffer: DEFAULT_MAX_BUFFER,
            system_prompt: None,
        }
    }
}

impl HostConfig {
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// How one streamed model response ended
#[derive(Debug)]
pub enum StreamOutcome {
    /// The model produced `<answer>...</answer>`
    Answer { text: String, answer: String },
    /// The model embedded a request; the stream was abandoned there
    Request { text: String, request: Result<Request, Error> },
    /// The stream ended with neither
    Finished { text: String },
}

/// Orchestrates clients and the model
pub struct Host {
    model: Arc<dyn LanguageModel>,
    config: HostConfig,
    clients: Vec<Arc<Client>>,
    registry: ClientRegistry,
    store: MessageStore,
}

impl Host {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self::with_config(model, HostConfig::default())
    }

    pub fn with_config(model: Arc<dyn LanguageModel>, config: HostConfig) -> Self {
        Self {
            model,
            config,
            clients: Vec::new(),
            registry: ClientRegistry::new(),
            store: MessageStore::new(),
        }
    }

    /// Add a client, running its handshake if it has not run yet, and merge its
    /// registry into the aggregate.
    pub async fn add_client(&mut self, client: Arc<Client>) -> Result<(), Error> {
        if !client.is_initialized().await {
            client.initialize().await?;
        }
        self.registry += client.registry().await;
        self.clients.push(client);
        info!("Host now has {} clients", self.clients.len());
        Ok(())
    }

    pub fn clients(&self) -> &[Arc<Client>] {
        &self.clients
    }

    /// Clients that completed their handshake
    pub async fn initialized_clients(&self) -> Vec<Arc<Client>> {
        let mut ready = Vec::new();
        for client in &self.clients {
            if client.is_initialized().await {
                ready.push(client.clone());
            }
        }
        ready
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// The aggregate registry as JSON, for rendering into a system prompt
    pub fn definitions(&self) -> Value {
        self.registry.to_json()
    }

    pub fn history(&self) -> &MessageStore {
        &self.store
    }

    /// Find the first initialized client owning the request's target
    pub async fn route(&self, request: &Request) -> Result<Arc<Client>, Error> {
        for client in self.initialized_clients().await {
            if client.registry().await.owns(request) {
                return Ok(client);
            }
        }
        Err(match request {
            Request::CallTool(params) => Error::ToolNotFound(format!("Tool '{}' not found", params.name)),
            Request::GetPrompt(params) => {
                Error::PromptNotFound(format!("Prompt '{}' not found", params.name))
            }
            Request::ReadResource(params) => {
                Error::ResourceNotFound(format!("Resource '{}' not found", params.uri))
            }
            other => Error::InvalidRequest(format!("The host does not route '{}'", other.method())),
        })
    }

    /// Forward a request to its owning client
    pub async fn process_request(&self, request: Request) -> Result<ServerResult, Error> {
        let client = self.route(&request).await?;
        debug!("Routing {} to its owning client", request.method());
        client.request(request).await
    }

    /// Drain one model response, stopping at the first answer or request
    pub async fn process_stream(
        &self,
        mut stream: BoxStream<'static, Result<String, Error>>
    ) -> Result<StreamOutcome, Error> {
        let mut scanner = StreamScanner::new(self.config.max_buffer);
        let mut text = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            text.push_str(&chunk);

            if let Some(answer) = extract_answer(&text) {
                return Ok(StreamOutcome::Answer { answer, text });
            }

            if let Some(value) = scanner.push(&chunk) {
                debug!("Found embedded request: {}", value);
                let method = value
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let request = Request::from_parts(&method, value.get("params").cloned());
                return Ok(StreamOutcome::Request { text, request });
            }
        }

        Ok(StreamOutcome::Finished { text })
    }

    /// Run the agent loop on a user prompt and return the final answer
    pub async fn query(&mut self, prompt: &str) -> Result<String, Error> {
        self.store.clear();
        if let Some(system_prompt) = &self.config.system_prompt {
            self.store.add(ChatMessage::system(system_prompt.clone()));
        }
        self.store.add(ChatMessage::user(prompt));

        for turn in 0..self.config.max_turns {
            debug!("Agent turn {}", turn + 1);
            let stream = self.model.stream(self.store.messages()).await?;

            match self.process_stream(stream).await? {
                StreamOutcome::Answer { text, answer } => {
                    self.store.add(ChatMessage::assistant(text));
                    return Ok(answer);
                }
                StreamOutcome::Finished { text } => {
                    self.store.add(ChatMessage::assistant(text.clone()));
                    return Ok(text.trim().to_string());
                }
                StreamOutcome::Request { text, request } => {
                    self.store.add(ChatMessage::assistant(text));
                    let outcome = match request {
                        Ok(request) => self.process_request(request).await,
                        Err(e) => Err(e),
                    };
                    let observation = self.observe(outcome)?;
                    self.store.add(ChatMessage::user(format!("<observation>{}</observation>", observation)));
                }
            }
        }

        Err(Error::Internal(format!("No answer after {} turns", self.config.max_turns)))
    }

    /// Fetch a prompt from its owning client and run the agent loop on its text
    pub async fn run_prompt(&mut self, name: &str, arguments: Map<String, Value>) -> Result<String, Error> {
        match self.process_request(Request::get_prompt(name, arguments)).await? {
            ServerResult::GetPrompt(result) => {
                let text = result.joined_text();
                self.query(&text).await
            }
            other => Err(Error::Protocol(format!("Unexpected {}", other.kind()))),
        }
    }

    /// Render a round-trip outcome as observation text. Protocol errors become
    /// `isError` results so the model can retry; transport failures end the loop.
    fn observe(&self, outcome: Result<ServerResult, Error>) -> Result<String, Error> {
        match outcome {
            Ok(result) => Ok(serde_json::to_string_pretty(&result)?),
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                warn!("Request failed, reporting to the model: {}", e);
                let result = CallToolResult {
                    content: vec![Content::text(format!("[{}] {}", e.to_code(), e))],
                    is_error: true,
                };
                Ok(serde_json::to_string_pretty(&result)?)
            }
        }
    }
}

fn extract_answer(text: &str) -> Option<String> {
    let start = text.find(ANSWER_OPEN)? + ANSWER_OPEN.len();
    let end = text[start..].find(ANSWER_CLOSE)? + start;
    Some(text[start..end].trim().to_string())
}
