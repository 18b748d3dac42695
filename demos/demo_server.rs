//! Demo capability server speaking newline-delimited JSON on stdin/stdout.
//!
//! Exposes one tool, one resource, one resource template and one prompt. Run it
//! directly or spawn it through a `StdioTransport`. Pass `--sse <addr>` to serve
//! over HTTP instead.

use anyhow::Result;
use log::info;
use mcp_lite::protocol::PromptArgument;
use mcp_lite::registry::argument;
use mcp_lite::transport::SseServerOptions;
use mcp_lite::{ ParamType, Prompt, Server, Tool };

fn build_server() -> Result<Server> {
    let add = Tool::new(
        "add",
        "Add two integers.",
        &[
            ("a", ParamType::Int),
            ("b", ParamType::Int),
        ],
        |args| {
            let a: i64 = argument(args, "a")?;
            let b: i64 = argument(args, "b")?;
            Ok(a + b)
        }
    )?;

    let partner = Prompt::new(
        "partner",
        "Suggest organizations that could endorse a learning program.",
        vec![
            PromptArgument {
                name: "topic".to_string(),
                description: "Subject of the learning program".to_string(),
                required: true,
            },
            PromptArgument {
                name: "number".to_string(),
                description: "How many partners to list".to_string(),
                required: false,
            }
        ],
        |args| {
            let topic: String = argument(args, "topic")?;
            let number = args
                .get("number")
                .map(mcp_lite::registry::value_to_text)
                .unwrap_or_else(|| "5".to_string());
            Ok(
                format!(
                    "Please come up with a top {} list of organizations that would be ideal partners for endorsing a learning program on the following topic: {}",
                    number,
                    topic
                )
            )
        }
    )?;

    let server = Server::builder()
        .with_name("mcp-lite-demo")
        .with_instructions("Arithmetic, a dog's name, a todo list and a partner prompt.")
        .with_tool(add)
        .with_resource("names://sheepadoodle", "sheepadoodle", "Name of the sheepadoodle.", |_| {
            Ok("Otis".to_string())
        })
        .with_resource("file://todos/{date}", "todos", "Todo list for a given date.", |params| {
            let date = params.get("date").map(String::as_str).unwrap_or("today");
            Ok(format!("Todos for {}:\n- walk Otis\n- review pull requests", date))
        })
        .with_prompt(partner)
        .build()?;
    Ok(server)
}

#[tokio::main]
async fn main() -> Result<()> {
    mcp_lite::logging::init();
    let server = build_server()?;

    let args: Vec<String> = std::env::args().collect();
    match args.iter().position(|arg| arg == "--sse") {
        Some(index) => {
            let address = args
                .get(index + 1)
                .cloned()
                .unwrap_or_else(|| SseServerOptions::default().bind_address);
            info!("Starting demo server on http://{}", address);
            server.serve_sse(SseServerOptions::default().with_bind_address(address)).await?;
        }
        None => {
            info!("Starting demo server on stdio");
            server.serve_stdio().await?;
        }
    }
    Ok(())
}
