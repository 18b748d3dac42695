//! Capability registries
//!
//! The server side holds invocable primitives; the client side holds the
//! definitions it mirrored from its peer. Both merge by concatenation.

pub mod client_registry;
pub mod primitives;
pub mod server_registry;
pub mod uri_template;

pub use client_registry::ClientRegistry;
pub use primitives::{
    Capability,
    ParamType,
    Prompt,
    PromptOutput,
    Resource,
    ResourceEntry,
    ResourceTemplate,
    Tool,
    argument,
    value_to_text,
};
pub use server_registry::ServerRegistry;
pub use uri_template::UriTemplate;
