//! Stdio transport against real child processes

use serde_json::{ Map, json };
use std::time::Duration;
use tokio::time::timeout;

use mcp_lite::client::connect_stdio;
use mcp_lite::transport::{ StdioOptions, StdioTransport, Transport };
use mcp_lite::{ ClientConfig, Error };

fn demo_server() -> StdioOptions {
    StdioOptions::new(env!("CARGO_BIN_EXE_mcp-lite-demo-server")).with_env("MCP_LITE_LOG", "warn")
}

#[tokio::test]
async fn test_demo_server_session() {
    let client = connect_stdio(demo_server(), ClientConfig::default()).await.unwrap();

    let registry = client.registry().await;
    assert!(registry.find_tool("add").is_some());
    assert!(registry.find_prompt("partner").is_some());

    let arguments = json!({"a": 9801, "b": 1444}).as_object().cloned().unwrap();
    let result = client.call_tool("add", arguments).await.unwrap();
    assert_eq!(result.joined_text(), "11245");

    let name = client.read_resource("names://sheepadoodle").await.unwrap();
    assert_eq!(name.resource.contents.text, "Otis");

    let err = client.call_tool("divide", Map::new()).await.unwrap_err();
    assert_eq!(err.to_code(), -32007);

    client.ping().await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_child_that_exits_at_startup() {
    let transport = StdioTransport::new(
        StdioOptions::new("sh")
            .with_args(["-c", "echo broken >&2; exit 1"])
            .with_startup_grace(Duration::from_millis(500))
    );
    let err = timeout(Duration::from_secs(10), transport.start()).await
        .expect("start must not hang")
        .unwrap_err();
    assert!(err.is_transport());
    assert!(err.to_string().contains("broken"));
}

#[tokio::test]
async fn test_child_that_exits_before_replying() {
    let transport = StdioTransport::new(StdioOptions::new("sh").with_args(["-c", "read line; exit 0"]));
    transport.start().await.unwrap();

    let request = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
    let err = timeout(Duration::from_secs(10), transport.send(request)).await
        .expect("send must not hang")
        .unwrap_err();
    assert!(err.is_transport(), "expected a transport error, got {:?}", err);
    assert!(!matches!(err, Error::Rpc(_)));

    transport.stop().await.unwrap();
}
