//! Server module
//!
//! The [`Server`] turns inbound envelopes into replies; the [`Router`] maps each
//! typed request onto the registry.

pub mod router;
pub mod server;

pub use router::Router;
pub use server::{ Server, ServerBuilder, default_capabilities };
