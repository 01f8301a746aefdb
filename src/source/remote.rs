use elasticsearch::{ClearScrollParts, Elasticsearch, ScrollParts, SearchParts};
use serde::Deserialize;
use serde_json::{Map, Value, json, value::RawValue};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::client;
use crate::document::Document;
use crate::error::{Result, TransferError};
use crate::job::TimeFilter;

/// Server-side format string matching the CLI's accepted timestamp format.
const RANGE_FORMAT: &str = "yyyy.MM.dd HH:mm:ss";
/// How long the server keeps the scroll cursor alive between pages.
const SCROLL_TTL: &str = "10m";

/// Build the range query restricting a scan to `(start, end]` on the
/// filtered field.
pub fn range_query(filter: &TimeFilter) -> Value {
    let mut bounds = Map::new();
    bounds.insert("format".to_string(), json!(RANGE_FORMAT));
    if let Some(start) = &filter.start {
        bounds.insert("gt".to_string(), json!(start));
    }
    if let Some(end) = &filter.end {
        bounds.insert("lte".to_string(), json!(end));
    }

    let mut field = Map::new();
    field.insert(filter.field.clone(), Value::Object(bounds));

    json!({ "range": field })
}

/// Confirm the collection exists and count the documents the scan will
/// visit, using the same filter the scan will use.
pub async fn preflight(
    client: &Elasticsearch,
    collection: &str,
    filter: Option<&TimeFilter>,
) -> Result<u64> {
    if !client::collection_exists(client, collection).await? {
        return Err(TransferError::CollectionNotFound(collection.to_string()));
    }
    let total = client::count_documents(client, collection, filter.map(range_query)).await?;
    log::debug!("Collection {} holds {} matching document(s)", collection, total);
    Ok(total)
}

#[derive(Deserialize)]
struct ScrollPage {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: PageHits,
}

#[derive(Deserialize)]
struct PageHits {
    hits: Vec<PageHit>,
}

#[derive(Deserialize)]
struct PageHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: Option<Box<RawValue>>,
}

/// Stream every document in a remote collection, preserving server order
/// within and across pages, without holding more than one page in memory.
///
/// Reacts to the shared cancellation signal while waiting to emit a record
/// and propagates it as `Cancelled` so the coordinator reports the
/// originating failure, not this task.
pub async fn pump(
    client: Elasticsearch,
    collection: String,
    filter: Option<TimeFilter>,
    page_size: i64,
    tx: Sender<Document>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut body = json!({ "size": page_size });
    if let Some(filter) = &filter {
        body["query"] = range_query(filter);
    }
    log::debug!("Initiating scroll over {} with page size {}", collection, page_size);

    let response = client
        .search(SearchParts::Index(&[&collection]))
        .scroll(SCROLL_TTL)
        .body(&body)
        .send()
        .await?;
    let mut page = parse_page(response).await?;

    let mut scroll_id: Option<String> = None;
    let mut emitted = 0u64;

    loop {
        if let Some(id) = page.scroll_id.take() {
            scroll_id = Some(id);
        }

        let hits = page.hits.hits;
        if hits.is_empty() {
            log::debug!("Scan of {} finished, no more documents", collection);
            break;
        }

        for hit in hits {
            let Some(payload) = hit.source else {
                log::warn!("skipping record {} with no payload", hit.id);
                continue;
            };
            let doc = Document {
                collection: hit.index,
                id: hit.id,
                payload,
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    clear_scroll(&client, scroll_id.as_deref()).await;
                    return Err(TransferError::Cancelled);
                }
                sent = tx.send(doc) => {
                    if sent.is_err() {
                        // Consumer gone; the cause is already recorded there.
                        clear_scroll(&client, scroll_id.as_deref()).await;
                        return Err(TransferError::Cancelled);
                    }
                    emitted += 1;
                }
            }
        }

        let Some(id) = scroll_id.as_deref() else {
            log::debug!("Server returned no scroll cursor for {}, stopping", collection);
            break;
        };

        let scroll_body = json!({
            "scroll": SCROLL_TTL,
            "scroll_id": id
        });
        let next = client
            .scroll(ScrollParts::None)
            .body(scroll_body)
            .send()
            .await;
        page = match next {
            Ok(response) => match parse_page(response).await {
                Ok(page) => page,
                Err(e) => {
                    clear_scroll(&client, scroll_id.as_deref()).await;
                    return Err(e);
                }
            },
            Err(e) => {
                clear_scroll(&client, scroll_id.as_deref()).await;
                return Err(e.into());
            }
        };
    }

    clear_scroll(&client, scroll_id.as_deref()).await;
    log::info!("Retrieved {} document(s) from {}", emitted, collection);
    Ok(())
}

async fn parse_page(response: elasticsearch::http::response::Response) -> Result<ScrollPage> {
    let status = response.status_code();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(TransferError::RemoteUnavailable(format!(
            "page fetch failed with status {status}: {detail}"
        )));
    }
    response.json().await.map_err(|e| {
        TransferError::RemoteUnavailable(format!("failed to parse result page: {e}"))
    })
}

/// Release the server-side cursor. Best-effort on every exit path.
async fn clear_scroll(client: &Elasticsearch, scroll_id: Option<&str>) {
    let Some(id) = scroll_id else { return };
    let body = json!({ "scroll_id": [id] });
    if let Err(e) = client
        .clear_scroll(ClearScrollParts::None)
        .body(body)
        .send()
        .await
    {
        log::warn!("Failed to clear scroll cursor: {e}");
    } else {
        log::debug!("Cleared scroll cursor");
    }
}
