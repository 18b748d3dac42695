//! Protocol message model
//!
//! The untyped JSON-RPC envelope, the closed method set, and the typed
//! request/result/notification variants layered on top of it.

pub mod jsonrpc;
pub mod messages;
pub mod method;
pub mod types;

pub use jsonrpc::*;
pub use messages::*;
pub use method::Method;
pub use types::*;
