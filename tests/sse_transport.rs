//! SSE client against the SSE server on a loopback port

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use mcp_lite::client::connect_sse;
use mcp_lite::registry::argument;
use mcp_lite::transport::{ SseOptions, SseServerOptions, SseServerTransport, SseTransport, Transport };
use mcp_lite::{ ClientConfig, ParamType, Server, Tool };

fn server() -> Server {
    let echo = Tool::new("echo", "Echo a string.", &[("text", ParamType::Str)], |args| {
        argument::<String>(args, "text")
    }).unwrap();
    Server::builder().with_name("sse-test").with_tool(echo).build().unwrap()
}

async fn start_server() -> (SseServerTransport, String) {
    let transport = SseServerTransport::new(
        Arc::new(server()),
        SseServerOptions::default()
            .with_bind_address("127.0.0.1:0")
            .with_keep_alive_interval(Duration::from_millis(200))
    );
    let addr = transport.start().await.unwrap();
    (transport, format!("http://{}", addr))
}

#[tokio::test]
async fn test_session_round_trip() {
    let (server, base_url) = start_server().await;

    let options = SseOptions::default().with_request_timeout(Duration::from_secs(5));
    let client = connect_sse(&base_url, options, ClientConfig::default()).await.unwrap();

    assert_eq!(client.server_info().await.unwrap().server_info.name, "sse-test");

    let arguments = json!({"text": "over the wire"}).as_object().cloned().unwrap();
    let result = client.call_tool("echo", arguments).await.unwrap();
    assert_eq!(result.joined_text(), "over the wire");

    let err = client.call_tool("missing", serde_json::Map::new()).await.unwrap_err();
    assert_eq!(err.to_code(), -32007);

    client.close().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_large_non_ascii_payload_survives_chunking() {
    let (server, base_url) = start_server().await;

    let options = SseOptions::default().with_request_timeout(Duration::from_secs(10));
    let client = connect_sse(&base_url, options, ClientConfig::default()).await.unwrap();

    for n in [5_000, 40_000, 200_001] {
        let text = format!("{}\u{1f415}", "\u{e9}".repeat(n));
        let arguments = json!({ "text": text }).as_object().cloned().unwrap();
        let result = client.call_tool("echo", arguments).await.unwrap();
        let echoed = result.joined_text();
        assert!(!echoed.contains('\u{fffd}'));
        assert_eq!(echoed, text);
    }

    client.close().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_notification_gets_no_reply() {
    let (server, base_url) = start_server().await;

    let transport = SseTransport::new(&base_url, SseOptions::default()).unwrap();
    transport.start().await.unwrap();
    let reply = transport
        .send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await
        .unwrap();
    assert!(reply.is_none());

    transport.stop().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let options = SseOptions::default().with_request_timeout(Duration::from_millis(500));
    let transport = SseTransport::new("http://127.0.0.1:9", options).unwrap();
    transport.start().await.unwrap();

    let err = transport.send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await.unwrap_err();
    assert!(err.is_transport());

    transport.stop().await.unwrap();
}
