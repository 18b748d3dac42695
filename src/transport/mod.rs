//! Transport module for protocol communication
//!
//! A transport moves one serialized envelope to the other party and hands back
//! the serialized reply, or nothing when the envelope was a notification.
//! Three implementations are provided: [`DirectTransport`] (in-process),
//! [`StdioTransport`] (child process over pipes) and [`SseTransport`] (HTTP POST
//! plus an event stream). The server halves live in [`stdio_server`] and
//! [`sse_server`].

use async_trait::async_trait;

use crate::errors::Error;

pub mod direct;
pub mod sse;
pub mod sse_server;
pub mod stdio;
pub mod stdio_server;

pub use direct::DirectTransport;
pub use sse::{ SseOptions, SseTransport };
pub use sse_server::{ SseServerOptions, SseServerTransport };
pub use stdio::{ StdioOptions, StdioTransport };

/// Header carrying the client session id on the SSE transport
pub const CLIENT_ID_HEADER: &str = "X-Client-ID";

/// Handler for messages arriving on a server-side transport
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one serialized envelope
    ///
    /// # Returns
    /// * `Ok(Some(response))` - A serialized reply for the sender
    /// * `Ok(None)` - No reply (the message was a notification)
    /// * `Err(error)` - The message could not be handled at all
    async fn handle_message(&self, client_id: &str, message: &str) -> Result<Option<String>, Error>;
}

/// Transport trait for the client side of a session
///
/// Implementations allow at most one outstanding request at a time; replies are
/// matched to requests by order.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the channel
    async fn start(&self) -> Result<(), Error>;

    /// Close the channel and release its resources
    async fn stop(&self) -> Result<(), Error>;

    /// Send one serialized envelope and wait for the reply, if one is expected
    async fn send(&self, message: &str) -> Result<Option<String>, Error>;
}
