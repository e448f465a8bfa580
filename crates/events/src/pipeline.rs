//! Source pipeline: follower -> decode -> predicate chain -> mutation.

use std::path::PathBuf;
use std::sync::Arc;

use delivery_core::{Event, NestedPath, PredicateChain};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;
use crate::follower::{follow, FollowerConfig};

/// Run one line through the pipeline.
///
/// `Ok(None)` means the event was dropped on purpose: no rule matched, or
/// the matched event has no string `raw` field.
pub fn process_line(
    line: &str,
    chain: &PredicateChain,
    content_path: &NestedPath,
) -> Result<Option<String>, SourceError> {
    let mut event = Event::decode(line).map_err(SourceError::Decode)?;

    let result = chain.evaluate(&event);
    if !result.forward {
        return Ok(None);
    }

    if let Some(mutation) = result.mutation {
        content_path
            .apply(&mut event, mutation.as_ref())
            .map_err(SourceError::Mutate)?;
    }

    Ok(event.into_payload())
}

/// Follow `path` and yield forwarding payloads, with per-line errors
/// reported in order on the same channel.
///
/// The returned sequence ends when the follower ends (cancellation or a
/// fatal open error, which is passed through as the last item).
pub fn connect_to_source(
    path: impl Into<PathBuf>,
    follower: FollowerConfig,
    chain: Arc<PredicateChain>,
    content_path: NestedPath,
    cancel: CancellationToken,
) -> mpsc::Receiver<Result<String, SourceError>> {
    let (tx, rx) = mpsc::channel(1);
    let mut lines = follow(path, follower, cancel);

    tokio::spawn(async move {
        while let Some(item) = lines.recv().await {
            let out = match item {
                Ok(line) => match process_line(&line, &chain, &content_path) {
                    Ok(Some(payload)) => Ok(payload),
                    Ok(None) => continue,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            if tx.send(out).await.is_err() {
                break;
            }
        }
    });

    rx
}

/// Drain a source sequence into the broadcaster inbox.
///
/// Per-line errors are logged and skipped. Returns the fatal error if the
/// source died, or `Ok(())` when the source ended or the inbox closed.
pub async fn forward_payloads(
    mut source: mpsc::Receiver<Result<String, SourceError>>,
    inbox: mpsc::Sender<String>,
) -> Result<(), SourceError> {
    let mut forwarded: u64 = 0;

    while let Some(item) = source.recv().await {
        match item {
            Ok(payload) => {
                if inbox.send(payload).await.is_err() {
                    tracing::info!("Broadcaster inbox closed, stopping source forwarding");
                    break;
                }
                forwarded += 1;
                tracing::debug!(forwarded, "Event approved for delivery");
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping source line");
            }
        }
    }

    tracing::info!(forwarded, "Source forwarding finished");
    Ok(())
}
