//! Line-delimited stdio transport
//!
//! One JSON-RPC request per input line, one response per output line. Each
//! line is handled on its own task; a single writer keeps output lines whole.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::{gateway::ToolGateway, Result};

pub async fn serve_stdio(gateway: Arc<ToolGateway>) -> Result<()> {
    info!("Serving tool gateway on stdio");
    serve_lines(gateway, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Serves requests read from `input` until EOF, writing responses to `output`.
pub async fn serve_lines<R, W>(gateway: Arc<ToolGateway>, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let gateway = gateway.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let Some(response) = gateway.handle_bytes(line.as_bytes()).await else {
                return;
            };
            match serde_json::to_string(&response) {
                Ok(text) => {
                    if tx.send(text).await.is_err() {
                        error!("stdio writer closed before response was sent");
                    }
                }
                Err(e) => error!("Failed to serialize response: {}", e),
            }
        });
    }

    // in-flight handlers hold their own senders; the writer drains until they finish
    drop(tx);
    writer
        .await
        .map_err(|e| crate::Error::Internal(format!("stdio writer task failed: {}", e)))??;
    Ok(())
}
