//! JSON-lines message protocol
//!
//! Each input line is one [`ProbeMessage`]. `checkUrl` requests are answered
//! asynchronously, one response line each, in completion order. `cancelScan`
//! takes effect immediately and produces no output.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::scan::ScanSession;
use crate::verdict::ProbeVerdict;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProbeMessage {
    CheckUrl {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    CancelScan,
}

impl ProbeMessage {
    /// Decode one request line. URL validity is left to the probe, which
    /// answers unparseable URLs with an "Invalid URL format" verdict.
    pub fn decode(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Answer to a `checkUrl` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub verdict: ProbeVerdict,
}

impl ProbeResponse {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Serve requests from `reader` until EOF, then wait for outstanding checks.
pub async fn serve<R, W>(reader: R, mut writer: W, session: Arc<ScanSession>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let (tx, mut rx) = mpsc::unbounded_channel::<ProbeResponse>();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                dispatch(&line, &session, &tx);
            }
            Some(response) = rx.recv() => {
                write_response(&mut writer, &response).await?;
            }
        }
    }

    debug!("Input closed, waiting for outstanding checks");
    drop(tx);
    while let Some(response) = rx.recv().await {
        write_response(&mut writer, &response).await?;
    }
    Ok(())
}

fn dispatch(line: &str, session: &Arc<ScanSession>, tx: &mpsc::UnboundedSender<ProbeResponse>) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match ProbeMessage::decode(line) {
        Ok(ProbeMessage::CheckUrl { url, id }) => {
            let session = Arc::clone(session);
            let tx = tx.clone();
            tokio::spawn(async move {
                let verdict = session.check_url(&url).await;
                if tx.send(ProbeResponse { id, verdict }).is_err() {
                    warn!("Dropping response for {}: writer closed", url);
                }
            });
        }
        Ok(ProbeMessage::CancelScan) => {
            let cancelled = session.cancel_all();
            info!("Scan cancelled, {} probes signalled", cancelled);
        }
        Err(e) => warn!("Ignoring malformed message: {}", e),
    }
}

async fn write_response<W>(writer: &mut W, response: &ProbeResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = response.encode()?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
