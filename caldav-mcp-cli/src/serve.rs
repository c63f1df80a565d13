//! Line-delimited JSON-RPC loop over stdin/stdout.

use std::future::Future;

use anyhow::Result;
use caldav_mcp_core::{Connector, Gateway};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

use crate::dispatch::Dispatcher;

/// Read requests until EOF or `shutdown` resolves, writing one response line per
/// non-blank input line. Lines are read as bytes so a line that is not UTF-8
/// gets an error response instead of ending the loop. Returns the number of
/// responses written.
pub async fn run<C, R, W, S>(
    dispatcher: &mut Dispatcher<C>,
    mut reader: R,
    mut writer: W,
    shutdown: S,
) -> Result<usize>
where
    C: Connector,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut line = Vec::new();
    tokio::pin!(shutdown);
    let mut written = 0;

    loop {
        line.clear();
        let read = tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, stopping");
                break;
            }
            read = reader.read_until(b'\n', &mut line) => read?,
        };
        if read == 0 {
            break;
        }

        if let Some(response) = dispatcher.handle_bytes(&line).await {
            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
            written += 1;
        }
    }

    Ok(written)
}

/// Serve on the process's stdio until EOF or Ctrl-C.
pub async fn serve_stdio<C: Connector>(gateway: Gateway<C>) -> Result<()> {
    let mut dispatcher = Dispatcher::new(gateway);
    dispatcher.connect().await;
    info!("Serving JSON-RPC on stdin");

    let interrupted = async {
        // Without a signal handler, only EOF ends the loop
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let result = run(
        &mut dispatcher,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        interrupted,
    )
    .await;

    dispatcher.shutdown();
    let written = result?;
    info!("Handled {} requests", written);
    Ok(())
}
