//! MCP Lite
//!
//! A lightweight tool-calling RPC engine speaking a dialect of the Model Context
//! Protocol (MCP). Servers expose named tools, addressable resources and
//! parameterized prompts; clients mirror them after a handshake; a host drives a
//! language model and routes the requests it embeds in its output to the owning
//! client. Envelopes travel over an in-process, a stdio or an SSE transport.

pub mod client;
pub mod errors;
pub mod host;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

// Re-export commonly used items
pub use client::{ Client, ClientConfig, ClientState };
pub use errors::Error;
pub use host::{ Host, HostConfig, LanguageModel };
pub use registry::{ ClientRegistry, ParamType, Prompt, Resource, ResourceTemplate, ServerRegistry, Tool };
pub use server::{ Server, ServerBuilder };
pub use transport::{ DirectTransport, MessageHandler, SseTransport, StdioTransport, Transport };
