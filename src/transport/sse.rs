//! SSE Client Transport
//!
//! Envelopes are POSTed to `{base}/mcp`. The server does not answer in the POST
//! body; it pushes the reply onto this client's event stream at
//! `{base}/mcp/events`, which a background task keeps open and drains into a
//! local queue. A send waits on that queue with a bounded timeout.
//!
//! Replies carry no correlation beyond arrival order, so only one request may be
//! outstanding per session. A second concurrent send fails fast with a transport
//! error.

use async_trait::async_trait;
use futures_util::stream::StreamExt;
use log::{ debug, error, info, warn };
use reqwest::{ Client as HttpClient, RequestBuilder };
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Duration;
use tokio::sync::{ Mutex, mpsc };
use tokio::task::JoinHandle;

use crate::errors::Error;
use crate::protocol::expects_reply;
use crate::transport::{ CLIENT_ID_HEADER, Transport };

/// Buffer size for the reply queue
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Options for the SSE client transport
#[derive(Clone, Debug)]
pub struct SseOptions {
    /// How long a send waits for its reply
    pub request_timeout: Duration,
    /// Delay before reopening a dropped event stream
    pub reconnect_delay: Duration,
    /// Session id sent in the `X-Client-ID` header
    pub client_id: String,
    /// Value of the `Origin` header, if any
    pub origin: Option<String>,
    /// Extra headers sent with every request
    pub custom_headers: HashMap<String, String>,
}

impl Default for SseOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
            client_id: uuid::Uuid::new_v4().to_string(),
            origin: None,
            custom_headers: HashMap::new(),
        }
    }
}

impl SseOptions {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(name.into(), value.into());
        self
    }

    fn apply(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request.header(CLIENT_ID_HEADER, &self.client_id);
        if let Some(origin) = &self.origin {
            request = request.header("Origin", origin);
        }
        for (name, value) in &self.custom_headers {
            request = request.header(name, value);
        }
        request
    }
}

/// Incremental parser for `text/event-stream` bodies
///
/// Network chunks may end inside a multi-byte character, so bytes are buffered
/// until a full line is available and only whole lines are decoded.
#[derive(Debug, Default)]
struct EventParser {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline
    scanned: usize,
    event_type: String,
    event_data: String,
}

impl EventParser {
    /// Feed a chunk; returns every event completed by it as `(type, data)`
    fn push(&mut self, chunk: &[u8]) -> Vec<(String, String)> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=self.scanned + offset).collect();
            self.scanned = 0;
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);

            if line.is_empty() {
                // Blank line ends the event
                if !self.event_data.is_empty() {
                    let event_type = std::mem::take(&mut self.event_type);
                    events.push((event_type, std::mem::take(&mut self.event_data)));
                }
                self.event_type.clear();
            } else if let Some(data) = line.strip_prefix("data:") {
                if !self.event_data.is_empty() {
                    self.event_data.push('\n');
                }
                self.event_data.push_str(data.trim());
            } else if let Some(event) = line.strip_prefix("event:") {
                self.event_type = event.trim().to_string();
            }
        }
        self.scanned = self.buffer.len();

        events
    }
}

/// Client-side implementation of the SSE transport
pub struct SseTransport {
    messages_url: String,
    events_url: String,
    http_client: HttpClient,
    options: SseOptions,
    tx: mpsc::Sender<String>,
    queue: Mutex<mpsc::Receiver<String>>,
    running: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Create a transport for the server at `base_url` (e.g. `http://127.0.0.1:8000`)
    pub fn new(base_url: &str, options: SseOptions) -> Result<Self, Error> {
        let base_url = base_url.trim_end_matches('/');
        let http_client = HttpClient::builder()
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        Ok(Self {
            messages_url: format!("{}/mcp", base_url),
            events_url: format!("{}/mcp/events", base_url),
            http_client,
            options,
            tx,
            queue: Mutex::new(rx),
            running: Arc::new(AtomicBool::new(false)),
            listener: Mutex::new(None),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.options.client_id
    }

    /// Keep the event stream open while the transport is running
    async fn listen(
        http_client: HttpClient,
        events_url: String,
        options: SseOptions,
        tx: mpsc::Sender<String>,
        running: Arc<AtomicBool>
    ) {
        while running.load(Ordering::SeqCst) {
            info!("Connecting to SSE endpoint: {}", events_url);
            let request = options.apply(
                http_client.get(&events_url).header("Accept", "text/event-stream")
            );

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!("Connected to SSE endpoint");
                    match Self::process_stream(response, &tx).await {
                        Ok(()) => info!("SSE stream ended"),
                        Err(e) => error!("Error processing SSE stream: {}", e),
                    }
                }
                Ok(response) => {
                    error!("SSE connection failed with status {}", response.status());
                }
                Err(e) => {
                    error!("Failed to connect to SSE endpoint: {}", e);
                }
            }

            if !running.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(options.reconnect_delay).await;
        }
        debug!("SSE listener stopped");
    }

    async fn process_stream(response: reqwest::Response, tx: &mpsc::Sender<String>) -> Result<(), Error> {
        let mut stream = response.bytes_stream();
        let mut parser = EventParser::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Transport(format!("Error reading SSE stream: {}", e)))?;

            for (event_type, data) in parser.push(&chunk) {
                match event_type.as_str() {
                    "message" | "" => {
                        debug!("Received message event: {}", data);
                        tx
                            .send(data).await
                            .map_err(|_| Error::Transport("Reply queue closed".to_string()))?;
                    }
                    "keep-alive" => {}
                    other => debug!("Ignoring SSE event '{}'", other),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn start(&self) -> Result<(), Error> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        *listener = Some(
            tokio::spawn(
                Self::listen(
                    self.http_client.clone(),
                    self.events_url.clone(),
                    self.options.clone(),
                    self.tx.clone(),
                    self.running.clone()
                )
            )
        );
        info!("SSE transport started for client {}", self.options.client_id);
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
        info!("SSE transport stopped");
        Ok(())
    }

    async fn send(&self, message: &str) -> Result<Option<String>, Error> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(Error::Transport("SSE transport is not started".to_string()));
        }
        let mut queue = self.queue
            .try_lock()
            .map_err(|_| {
                Error::Transport("Another request is already in flight on this SSE session".to_string())
            })?;

        while let Ok(stale) = queue.try_recv() {
            warn!("Discarding unclaimed SSE reply: {}", stale);
        }

        let request = self.options
            .apply(self.http_client.post(&self.messages_url))
            .header("Content-Type", "application/json")
            .timeout(self.options.request_timeout)
            .body(message.to_string());
        let response = request
            .send().await
            .map_err(|e| Error::Transport(format!("Failed to send message: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(
                Error::Transport(format!("Failed to send message, received status {}: {}", status, text))
            );
        }

        if !expects_reply(message) {
            return Ok(None);
        }

        match tokio::time::timeout(self.options.request_timeout, queue.recv()).await {
            Err(_) => {
                Err(
                    Error::Timeout(
                        format!("No reply on the event stream within {:?}", self.options.request_timeout)
                    )
                )
            }
            Ok(None) => Err(Error::Transport("Reply queue closed".to_string())),
            Ok(Some(reply)) => Ok(Some(reply)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_parser_handles_split_chunks() {
        let mut parser = EventParser::default();
        assert!(parser.push(b"event: mess").is_empty());
        assert!(parser.push(b"age\ndata: {\"id\":1}").is_empty());
        let events = parser.push(b"\n\nevent: keep-alive\ndata: ping\n\n");
        assert_eq!(events, vec![
            ("message".to_string(), "{\"id\":1}".to_string()),
            ("keep-alive".to_string(), "ping".to_string()),
        ]);
    }

    #[test]
    fn test_event_parser_crlf_and_multiline_data() {
        let mut parser = EventParser::default();
        let events = parser.push(b"data: a\r\ndata: b\r\n\r\n");
        assert_eq!(events, vec![(String::new(), "a\nb".to_string())]);
    }

    #[test]
    fn test_event_parser_keeps_characters_split_across_chunks() {
        let body = "data: caf\u{e9} \u{1f415}\n\n".as_bytes();
        let mut parser = EventParser::default();
        let mut events = Vec::new();
        for byte in body.chunks(1) {
            events.extend(parser.push(byte));
        }
        assert_eq!(events, vec![(String::new(), "caf\u{e9} \u{1f415}".to_string())]);
    }

    #[tokio::test]
    async fn test_send_before_start_is_transport_error() {
        let transport = SseTransport::new("http://127.0.0.1:9", SseOptions::default()).unwrap();
        assert!(transport.send("{}").await.unwrap_err().is_transport());
    }
}
