//! Server-side implementation of the SSE transport
//!
//! - Accepts envelopes from clients as HTTP POST requests at `/mcp`
//! - Streams replies to clients as SSE `message` events at `/mcp/events`
//!
//! Both endpoints identify the session with the `X-Client-ID` header and create
//! the session's reply queue on first contact, so a reply computed before the
//! client opened its stream is delivered once it does.
//!
//! Sessions are bounded. Each queue holds at most `reply_queue_capacity`
//! replies, a session is dropped when its event stream closes, and sessions
//! without a stream expire after `session_idle_timeout`. A POST without a client
//! id is answered with a fresh id but opens no session, so its reply is dropped.

use axum::{
    Json,
    Router,
    extract::State,
    http::{ HeaderMap, StatusCode },
    response::{ IntoResponse, Response, Sse, sse::Event },
    routing::{ get, post },
};
use http::{ HeaderValue, Method };
use log::{ debug, error, info, warn };
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{ Mutex, RwLock, mpsc };
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_http::cors::{ AllowOrigin, Any, CorsLayer };

use crate::errors::{ Error, internal_error };
use crate::transport::{ CLIENT_ID_HEADER, MessageHandler };

/// Configuration options for the SSE server
#[derive(Debug, Clone)]
pub struct SseServerOptions {
    /// Address to bind the server to. Port 0 picks a free port.
    pub bind_address: String,
    /// Origins allowed to connect; `None` allows any
    pub allowed_origins: Option<Vec<String>>,
    /// Interval between keep-alive events
    pub keep_alive_interval: Duration,
    /// Replies buffered per session before new ones are dropped
    pub reply_queue_capacity: usize,
    /// Most sessions tracked at once
    pub max_sessions: usize,
    /// How long a session without an open stream is kept
    pub session_idle_timeout: Duration,
}

impl Default for SseServerOptions {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            allowed_origins: None,
            keep_alive_interval: Duration::from_secs(15),
            reply_queue_capacity: 64,
            max_sessions: 1024,
            session_idle_timeout: Duration::from_secs(300),
        }
    }
}

impl SseServerOptions {
    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(origins);
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn with_reply_queue_capacity(mut self, capacity: usize) -> Self {
        self.reply_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }
}

/// Reply queue of one client session
#[derive(Clone)]
struct ClientQueue {
    tx: mpsc::Sender<String>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl ClientQueue {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self { tx, rx: Arc::new(Mutex::new(rx)) }
    }

    /// An open event stream holds the receiver for its whole life
    fn is_streaming(&self) -> bool {
        self.rx.try_lock().is_err()
    }
}

struct Session {
    queue: ClientQueue,
    last_seen: Instant,
}

/// Application state for the SSE server
struct AppState {
    handler: Arc<dyn MessageHandler>,
    clients: RwLock<HashMap<String, Session>>,
    options: SseServerOptions,
}

impl AppState {
    /// The queue for `client_id`, created on first use; `None` when the session table is full
    async fn queue(&self, client_id: &str) -> Option<ClientQueue> {
        let now = Instant::now();
        let mut clients = self.clients.write().await;
        if let Some(session) = clients.get_mut(client_id) {
            session.last_seen = now;
            return Some(session.queue.clone());
        }

        let idle_timeout = self.options.session_idle_timeout;
        clients.retain(|id, session| {
            let keep = session.queue.is_streaming() || now.duration_since(session.last_seen) < idle_timeout;
            if !keep {
                info!("Expiring idle SSE client session: {}", id);
            }
            keep
        });

        if clients.len() >= self.options.max_sessions {
            warn!("Refusing SSE client session {}: {} sessions open", client_id, clients.len());
            return None;
        }

        info!("New SSE client session: {}", client_id);
        let queue = ClientQueue::new(self.options.reply_queue_capacity);
        clients.insert(client_id.to_string(), Session { queue: queue.clone(), last_seen: now });
        Some(queue)
    }

    /// Forget `client_id` if its session still owns `rx`
    async fn close(&self, client_id: &str, rx: &Arc<Mutex<mpsc::Receiver<String>>>) {
        let mut clients = self.clients.write().await;
        if clients.get(client_id).is_some_and(|session| Arc::ptr_eq(&session.queue.rx, rx)) {
            clients.remove(client_id);
            debug!("Removed SSE client session: {}", client_id);
        }
    }

    fn origin_allowed(&self, headers: &HeaderMap) -> bool {
        let Some(allowed) = &self.options.allowed_origins else {
            return true;
        };
        headers
            .get("origin")
            .and_then(|origin| origin.to_str().ok())
            .is_some_and(|origin| allowed.iter().any(|a| a == origin))
    }
}

fn client_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Server-side implementation of the SSE transport
pub struct SseServerTransport {
    options: SseServerOptions,
    state: Arc<AppState>,
    local_addr: RwLock<Option<SocketAddr>>,
    server_handle: Mutex<Option<JoinHandle<Result<(), Error>>>>,
}

impl SseServerTransport {
    pub fn new(handler: Arc<dyn MessageHandler>, options: SseServerOptions) -> Self {
        let state = Arc::new(AppState {
            handler,
            clients: RwLock::new(HashMap::new()),
            options: options.clone(),
        });
        Self {
            options,
            state,
            local_addr: RwLock::new(None),
            server_handle: Mutex::new(None),
        }
    }

    /// Build the HTTP routes for this transport
    pub fn router(&self) -> Router {
        let allow_origin = match &self.options.allowed_origins {
            None => AllowOrigin::from(Any),
            Some(origins) =>
                AllowOrigin::list(
                    origins.iter().filter_map(|origin| HeaderValue::from_str(origin).ok())
                ),
        };
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
            .allow_origin(allow_origin);

        Router::new()
            .route("/mcp", post(handle_client_message))
            .route("/mcp/events", get(handle_event_stream))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Bind and serve in the background; returns the bound address
    pub async fn start(&self) -> Result<SocketAddr, Error> {
        let mut handle = self.server_handle.lock().await;
        if handle.is_some() {
            warn!("SSE server already started");
            let local_addr = *self.local_addr.read().await;
            return local_addr.ok_or_else(|| Error::Transport("SSE server address unknown".to_string()));
        }

        let addr = self.options.bind_address
            .parse::<SocketAddr>()
            .map_err(|e| Error::Transport(format!("Invalid bind address: {}", e)))?;
        let listener = tokio::net::TcpListener
            ::bind(addr).await
            .map_err(|e| Error::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.write().await = Some(local_addr);

        let app = self.router();
        *handle = Some(
            tokio::spawn(async move {
                info!("Starting SSE server on {}", local_addr);
                axum
                    ::serve(listener, app.into_make_service()).await
                    .map_err(|e| Error::Transport(format!("Server error: {}", e)))
            })
        );
        Ok(local_addr)
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// Block until the server task finishes
    pub async fn wait(&self) -> Result<(), Error> {
        let Some(handle) = self.server_handle.lock().await.take() else {
            return Ok(());
        };
        handle.await.map_err(|e| Error::Transport(format!("Server task failed: {}", e)))?
    }

    pub async fn stop(&self) -> Result<(), Error> {
        if let Some(handle) = self.server_handle.lock().await.take() {
            handle.abort();
            info!("SSE server stopped");
        }
        Ok(())
    }
}

/// Handle a message from a client
async fn handle_client_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String
) -> Response {
    if !state.origin_allowed(&headers) {
        warn!("Rejected message from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    let (client_id, queue) = match client_id_from(&headers) {
        Some(client_id) =>
            match state.queue(&client_id).await {
                Some(queue) => (client_id, Some(queue)),
                None => {
                    return StatusCode::SERVICE_UNAVAILABLE.into_response();
                }
            }
        None => (uuid::Uuid::new_v4().to_string(), None),
    };

    let reply = match state.handler.handle_message(&client_id, &body).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Error processing message from client {}: {}", client_id, e);
            serde_json::to_string(&internal_error(None, &e.to_string())).ok()
        }
    };

    match (reply, queue) {
        (Some(reply), Some(queue)) =>
            match queue.tx.try_send(reply) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Reply queue for client {} is full, dropping reply", client_id);
                }
                Err(TrySendError::Closed(_)) => {
                    error!("Reply queue for client {} is closed", client_id);
                }
            }
        (Some(_), None) => warn!("Dropping reply for client {} without a session", client_id),
        (None, _) => debug!("No response needed for message from client {}", client_id),
    }

    Json(json!({ "client_id": client_id })).into_response()
}

/// Stream a client's replies as SSE events
async fn handle_event_stream(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !state.origin_allowed(&headers) {
        warn!("Rejected event stream from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    let client_id = client_id_from(&headers).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let Some(queue) = state.queue(&client_id).await else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let Ok(mut rx) = queue.rx.clone().try_lock_owned() else {
        warn!("Client {} already has an open event stream", client_id);
        return StatusCode::CONFLICT.into_response();
    };
    info!("SSE stream opened for client {}", client_id);

    let keep_alive = state.options.keep_alive_interval;
    let stream =
        async_stream::stream! {
        let _closed = scopeguard::guard((state, client_id.clone(), queue.rx), |(state, id, rx)| {
            info!("SSE stream closed for client {}", id);
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { state.close(&id, &rx).await });
            }
        });

        yield Ok::<_, Infallible>(Event::default().event("connected").data(client_id.clone()));

        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + keep_alive, keep_alive);
        loop {
            tokio::select! {
                reply = rx.recv() => {
                    match reply {
                        Some(reply) => {
                            yield Ok::<_, Infallible>(Event::default().event("message").data(reply));
                        }
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    yield Ok::<_, Infallible>(Event::default().event("keep-alive").data("{}"));
                }
            }
        }
    };

    Sse::new(stream).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use futures::StreamExt;
    use http::Request;
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle_message(&self, _client_id: &str, message: &str) -> Result<Option<String>, Error> {
            if message == "fail" {
                return Err(Error::Internal("handler exploded".into()));
            }
            Ok(Some(format!("reply to {}", message)))
        }
    }

    fn transport(options: SseServerOptions) -> SseServerTransport {
        SseServerTransport::new(Arc::new(Echo), options)
    }

    fn post(client_id: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/mcp");
        if let Some(id) = client_id {
            builder = builder.header(CLIENT_ID_HEADER, id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn read_until(body: Body, needle: &str) -> String {
        let mut stream = body.into_data_stream();
        let mut seen = String::new();
        while let Some(Ok(chunk)) = stream.next().await {
            seen.push_str(&String::from_utf8_lossy(&chunk));
            if seen.contains(needle) {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_post_assigns_client_id() {
        let app = transport(SseServerOptions::default()).router();
        let response = app.oneshot(post(None, "hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value["client_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn test_reply_is_delivered_on_event_stream() {
        let app = transport(SseServerOptions::default()).router();
        app.clone().oneshot(post(Some("abc"), "hello")).await.unwrap();

        let events = Request::builder()
            .uri("/mcp/events")
            .header(CLIENT_ID_HEADER, "abc")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(events).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let seen = tokio::time
            ::timeout(Duration::from_secs(5), read_until(response.into_body(), "reply to hello")).await
            .unwrap();
        assert!(seen.contains("event: message"));
        assert!(seen.contains("data: reply to hello"));
    }

    #[tokio::test]
    async fn test_handler_failure_enqueues_error_envelope() {
        let app = transport(SseServerOptions::default()).router();
        app.clone().oneshot(post(Some("xyz"), "fail")).await.unwrap();

        let events = Request::builder()
            .uri("/mcp/events")
            .header(CLIENT_ID_HEADER, "xyz")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(events).await.unwrap();
        let seen = tokio::time
            ::timeout(Duration::from_secs(5), read_until(response.into_body(), "-32603")).await
            .unwrap();
        assert!(seen.contains("\"id\":null"));
    }

    fn events(client_id: &str) -> Request<Body> {
        Request::builder().uri("/mcp/events").header(CLIENT_ID_HEADER, client_id).body(Body::empty()).unwrap()
    }

    async fn session_count(server: &SseServerTransport) -> usize {
        server.state.clients.read().await.len()
    }

    #[tokio::test]
    async fn test_anonymous_posts_open_no_sessions() {
        let server = transport(SseServerOptions::default());
        let app = server.router();
        for _ in 0..1000 {
            let response = app.clone().oneshot(post(None, &"x".repeat(1024))).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(session_count(&server).await, 0);
    }

    #[tokio::test]
    async fn test_session_is_removed_when_stream_closes() {
        let server = transport(SseServerOptions::default());
        let app = server.router();

        let response = app.clone().oneshot(events("gone")).await.unwrap();
        let mut body = response.into_body().into_data_stream();
        assert!(body.next().await.is_some());
        assert_eq!(session_count(&server).await, 1);

        drop(body);
        tokio::time
            ::timeout(Duration::from_secs(5), async {
                while session_count(&server).await > 0 {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }).await
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_sessions_expire_and_table_is_capped() {
        let options = SseServerOptions::default().with_session_idle_timeout(Duration::ZERO);
        let server = transport(options);
        let app = server.router();
        app.clone().oneshot(post(Some("first"), "hello")).await.unwrap();
        app.clone().oneshot(post(Some("second"), "hello")).await.unwrap();
        assert_eq!(session_count(&server).await, 1);

        let options = SseServerOptions::default().with_max_sessions(2);
        let server = transport(options);
        let app = server.router();
        for id in ["a", "b"] {
            assert_eq!(app.clone().oneshot(post(Some(id), "hello")).await.unwrap().status(), StatusCode::OK);
        }
        let refused = app.clone().oneshot(post(Some("c"), "hello")).await.unwrap();
        assert_eq!(refused.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(app.oneshot(post(Some("a"), "again")).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_full_reply_queue_drops_newest() {
        let options = SseServerOptions::default().with_reply_queue_capacity(2);
        let app = transport(options).router();
        for n in 0..5 {
            app.clone().oneshot(post(Some("slow"), &format!("m{}", n))).await.unwrap();
        }

        let response = app.oneshot(events("slow")).await.unwrap();
        let seen = tokio::time
            ::timeout(Duration::from_secs(5), read_until(response.into_body(), "reply to m1")).await
            .unwrap();
        assert!(seen.contains("reply to m0"));
        assert!(!seen.contains("reply to m2"));
    }

    #[tokio::test]
    async fn test_disallowed_origin_is_forbidden() {
        let options = SseServerOptions::default().with_allowed_origins(
            vec!["http://localhost:3000".to_string()]
        );
        let app = transport(options).router();

        let missing = app.clone().oneshot(post(None, "hello")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::FORBIDDEN);

        let wrong = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("Origin", "http://evil.example")
            .body(Body::from("hello"))
            .unwrap();
        assert_eq!(app.clone().oneshot(wrong).await.unwrap().status(), StatusCode::FORBIDDEN);

        let right = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("Origin", "http://localhost:3000")
            .body(Body::from("hello"))
            .unwrap();
        assert_eq!(app.oneshot(right).await.unwrap().status(), StatusCode::OK);
    }
}
