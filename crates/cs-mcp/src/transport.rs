//! Newline-delimited JSON-RPC transport.
//!
//! One request per line in, one response per line out. Blank lines are
//! skipped and notifications produce no output. A line that is not valid
//! UTF-8 or JSON gets a parse error and the session continues. The loop
//! ends at EOF.

use crate::server::{McpServer, McpServerError, McpServerResult};
use crate::types::{McpError, McpRequest, McpResponse, RequestId};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// Serve requests from `reader` until EOF, writing responses to `writer`.
pub async fn serve<R, W>(server: &McpServer, mut reader: R, mut writer: W) -> McpServerResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut handled: u64 = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let response = match decode(line) {
            Ok(request) => {
                debug!(method = %request.method, "Request received");
                server.handle_request(request).await
            }
            Err(response) => Some(response),
        };

        if let Some(response) = response {
            let mut output = serde_json::to_vec(&response)
                .map_err(|e| McpServerError::Internal(e.to_string()))?;
            output.push(b'\n');
            writer.write_all(&output).await?;
            writer.flush().await?;
        }
        handled += 1;
    }

    info!(messages = handled, "Input closed, transport stopping");
    Ok(())
}

/// Serve over the process's stdin and stdout.
pub async fn serve_stdio(server: &McpServer) -> McpServerResult<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(server, stdin, stdout).await
}

fn decode(line: &[u8]) -> Result<McpRequest, McpResponse> {
    let value: serde_json::Value = serde_json::from_slice(line).map_err(|e| {
        warn!(error = %e, "Unparseable message");
        McpResponse::error(RequestId::Null, McpError::parse_error())
    })?;

    // Keep the caller's id on the error when it is usable.
    let id = value
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<RequestId>(id).ok())
        .unwrap_or_default();

    serde_json::from_value::<McpRequest>(value)
        .ok()
        .filter(|request| request.jsonrpc == "2.0")
        .ok_or_else(|| {
            warn!("Message is not a JSON-RPC 2.0 request");
            McpResponse::error(id, McpError::invalid_request())
        })
}
