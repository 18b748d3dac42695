//! Client Implementation
//!
//! A [`Client`] speaks to exactly one server over one transport. The helpers
//! below build the transport, run the handshake and hand back a ready client.

pub mod client;

pub use client::{ Client, ClientConfig, ClientState };

use std::sync::Arc;

use crate::errors::Error;
use crate::server::Server;
use crate::transport::{ DirectTransport, SseOptions, SseTransport, StdioOptions, StdioTransport };

/// Connect to a server child process over stdio
pub async fn connect_stdio(options: StdioOptions, config: ClientConfig) -> Result<Client, Error> {
    let client = Client::with_config(Arc::new(StdioTransport::new(options)), config);
    client.initialize().await?;
    Ok(client)
}

/// Connect to an SSE server at `base_url`
pub async fn connect_sse(
    base_url: &str,
    options: SseOptions,
    config: ClientConfig
) -> Result<Client, Error> {
    let transport = SseTransport::new(base_url, options)?;
    let client = Client::with_config(Arc::new(transport), config);
    client.initialize().await?;
    Ok(client)
}

/// Connect to an in-process server
pub async fn connect_direct(server: Server, config: ClientConfig) -> Result<Client, Error> {
    let client = Client::with_config(Arc::new(DirectTransport::new(Arc::new(server))), config);
    client.initialize().await?;
    Ok(client)
}
