//! Server side of the stdio transport
//!
//! Reads one envelope per line, hands it to the [`MessageHandler`], and writes a
//! line back only when the handler produced a reply. A line that is not UTF-8
//! or exceeds [`MAX_LINE_LENGTH`] is answered with a parse error and skipped.

use bytes::BytesMut;
use futures::StreamExt;
use log::{ debug, error, info, warn };
use std::sync::Arc;
use tokio::io::{ AsyncRead, AsyncWrite, AsyncWriteExt };
use tokio_util::codec::{ Decoder, FramedRead, LinesCodec, LinesCodecError };

use crate::errors::{ Error, internal_error, parse_error };
use crate::transport::MessageHandler;

const STDIO_CLIENT_ID: &str = "stdio";

/// Longest inbound line accepted, in bytes
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// One inbound line, or the reason it could not be read
#[derive(Debug, PartialEq)]
enum Line {
    Text(String),
    Rejected(String),
}

/// [`LinesCodec`] that surfaces bad lines as items so the stream keeps going
struct LineFramer {
    inner: LinesCodec,
}

impl LineFramer {
    fn new(max_length: usize) -> Self {
        Self { inner: LinesCodec::new_with_max_length(max_length) }
    }

    fn lift(decoded: Result<Option<String>, LinesCodecError>) -> Result<Option<Line>, std::io::Error> {
        match decoded {
            Ok(line) => Ok(line.map(Line::Text)),
            Err(LinesCodecError::Io(e)) => Err(e),
            Err(e) => Ok(Some(Line::Rejected(e.to_string()))),
        }
    }
}

impl Decoder for LineFramer {
    type Item = Line;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, std::io::Error> {
        Self::lift(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, std::io::Error> {
        Self::lift(self.inner.decode_eof(buf))
    }
}

/// Serve newline-delimited envelopes from `reader` until it reaches EOF
pub async fn serve_lines<R, W>(
    handler: Arc<dyn MessageHandler>,
    reader: R,
    mut writer: W
)
    -> Result<(), Error>
    where R: AsyncRead + Unpin, W: AsyncWrite + Unpin
{
    let mut lines = FramedRead::new(reader, LineFramer::new(MAX_LINE_LENGTH));

    while let Some(line) = lines.next().await {
        let line = line.map_err(|e| Error::Transport(format!("Failed to read line: {}", e)))?;
        let reply = match line {
            Line::Rejected(reason) => {
                warn!("Rejecting unreadable line: {}", reason);
                Some(serde_json::to_string(&parse_error(&reason))?)
            }
            Line::Text(line) if line.trim().is_empty() => None,
            Line::Text(line) => {
                debug!("<- {}", line);
                match handler.handle_message(STDIO_CLIENT_ID, &line).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        error!("Handler failed: {}", e);
                        Some(serde_json::to_string(&internal_error(None, &e.to_string()))?)
                    }
                }
            }
        };

        if let Some(reply) = reply {
            debug!("-> {}", reply);
            writer.write_all(reply.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    info!("Input closed, stopping stdio server");
    Ok(())
}

/// Serve on the process's own stdin and stdout
pub async fn serve_stdio(handler: Arc<dyn MessageHandler>) -> Result<(), Error> {
    info!("Serving on stdio");
    serve_lines(handler, tokio::io::stdin(), tokio::io::stdout()).await
}
