//! JSON-lines transport: one `Op` per stdin line, one `Event` per stdout line.
//!
//! Operations run concurrently, so a long stage does not block `getWorkflow`
//! and a second stage on the same workflow is answered with a conflict.
//! Replies and progress events share one writer and arrive interleaved.

use color_eyre::eyre::Result;
use mdk_core::config::models::ServiceConfig;
use mdk_core::WorkflowService;
use mdk_protocol::ipc::{Event, Op};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 256;

pub async fn run(config: Arc<ServiceConfig>) -> Result<()> {
    let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = tokio::spawn(write_events(events_rx));

    let service = Arc::new(WorkflowService::new(config, events_tx.clone()).await?);
    info!("Serving on stdin/stdout");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let op: Op = match serde_json::from_str(line) {
            Ok(op) => op,
            Err(err) => {
                warn!(error = %err, "Malformed operation");
                let _ = events_tx
                    .send(Event::Error {
                        kind: "PARSE_ERROR".to_string(),
                        message: err.to_string(),
                    })
                    .await;
                continue;
            }
        };
        debug!(?op, "Received operation");

        if matches!(op, Op::Shutdown) {
            break;
        }

        let service = Arc::clone(&service);
        let events_tx = events_tx.clone();
        in_flight.spawn(async move {
            if let Some(event) = service.dispatch(op).await {
                let _ = events_tx.send(event).await;
            }
        });
    }

    while in_flight.join_next().await.is_some() {}
    drop(service);
    drop(events_tx);
    let _ = writer.await;

    info!("Transport closed");
    Ok(())
}

async fn write_events(mut rx: mpsc::Receiver<Event>) {
    let mut stdout = tokio::io::stdout();
    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "Cannot serialize event");
                continue;
            }
        };
        line.push('\n');
        if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            warn!("Client went away");
            break;
        }
    }
}
