use std::sync::Arc;

use elasticsearch::{Elasticsearch, http::request::JsonBody};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client;
use crate::document::Document;
use crate::error::{Result, TransferError};
use crate::progress::{ProgressSink, ProgressUnit};
use crate::transfer::TransferStats;

/// Documents accumulated before a batch is handed to a submission worker.
const BULK_FLUSH_DOCS: usize = 1000;

type SubmitHandle = JoinHandle<Result<()>>;

/// Consume the document stream and apply it as batched upserts against the
/// remote endpoint.
///
/// Records are appended to the bulk buffer in arrival order; full batches
/// are submitted through a bounded pool of concurrent workers sized to the
/// available parallelism. Submission acknowledgements may complete out of
/// order, but every write is an idempotent upsert keyed by document id, so
/// the final state is order-independent. The destination collection is the
/// configured name if given, else each record's own collection field.
pub async fn pump(
    client: Elasticsearch,
    dest_collection: Option<String>,
    mut rx: Receiver<Document>,
    progress: Arc<dyn ProgressSink>,
    unit: ProgressUnit,
    cancel: CancellationToken,
) -> Result<TransferStats> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    log::debug!("Remote sink using up to {} bulk submission worker(s)", workers);

    let mut in_flight: FuturesUnordered<SubmitHandle> = FuturesUnordered::new();
    let mut batch: Vec<JsonBody<Value>> = Vec::with_capacity(BULK_FLUSH_DOCS * 2);
    let mut batch_docs = 0usize;
    let mut stats = TransferStats::default();

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                // Still push what we have, best-effort, before surfacing the
                // cancellation so the endpoint is not left mid-batch.
                flush_on_cancel(&client, std::mem::take(&mut batch), &mut in_flight).await;
                return Err(TransferError::Cancelled);
            }
            received = rx.recv() => received,
        };
        let Some(doc) = received else { break };

        // The payload has to be re-validated here because the bulk body is
        // assembled line by line; a broken record is skipped, not fatal.
        let payload: Value = match serde_json::from_str(doc.payload.get()) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("skipping record {}: {e}", doc.id);
                continue;
            }
        };

        let index = dest_collection.as_deref().unwrap_or(&doc.collection);
        let bytes = doc.payload_len();
        batch.push(json!({ "index": { "_index": index, "_id": doc.id } }).into());
        batch.push(payload.into());
        batch_docs += 1;
        stats.items += 1;
        stats.bytes += bytes;
        progress.add(match unit {
            ProgressUnit::Items => 1,
            ProgressUnit::Bytes => bytes,
        });

        if batch_docs >= BULK_FLUSH_DOCS {
            submit(&client, std::mem::take(&mut batch), &mut in_flight);
            batch_docs = 0;

            if in_flight.len() >= workers {
                // Pool is full: wait for one worker before accepting more,
                // surfacing any fatal submission failure promptly.
                if let Some(joined) = in_flight.next().await {
                    joined??;
                }
            }
        }
    }

    // Stream ended: forced flush of the partial batch, then drain the pool.
    if !batch.is_empty() {
        submit(&client, std::mem::take(&mut batch), &mut in_flight);
    }
    while let Some(joined) = in_flight.next().await {
        joined??;
    }

    log::info!("Wrote {} document(s) to the remote endpoint", stats.items);
    Ok(stats)
}

fn submit(
    client: &Elasticsearch,
    batch: Vec<JsonBody<Value>>,
    in_flight: &mut FuturesUnordered<SubmitHandle>,
) {
    if batch.is_empty() {
        return;
    }
    log::debug!("Submitting bulk batch of {} document(s)", batch.len() / 2);
    let client = client.clone();
    in_flight.push(tokio::spawn(async move {
        client::bulk_write(&client, batch).await
    }));
}

async fn flush_on_cancel(
    client: &Elasticsearch,
    batch: Vec<JsonBody<Value>>,
    in_flight: &mut FuturesUnordered<SubmitHandle>,
) {
    if !batch.is_empty() {
        if let Err(e) = client::bulk_write(client, batch).await {
            log::warn!("best-effort flush after cancellation failed: {e}");
        }
    }
    while let Some(joined) = in_flight.next().await {
        match joined {
            Ok(Err(e)) => log::warn!("bulk submission failed during drain: {e}"),
            Err(e) => log::warn!("bulk submission task failed during drain: {e}"),
            Ok(Ok(())) => {}
        }
    }
}
