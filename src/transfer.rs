use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client;
use crate::error::{Result, TransferError};
use crate::job::{Endpoint, TransferJob, TransferMode};
use crate::progress::{ProgressSink, ProgressUnit};
use crate::schema;
use crate::{sink, source};

/// Counters reported by the consumer side when a transfer completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferStats {
    pub items: u64,
    pub bytes: u64,
}

/// Run one transfer to completion.
///
/// The schema moves first, synchronously; then exactly one producer task and
/// one consumer task stream documents through a single-slot channel under a
/// shared cancellation signal. Whichever task fails first cancels the other,
/// and its error is the one reported. Partial output is retained; re-running
/// is safe because remote writes are idempotent upserts.
pub async fn run(job: &TransferJob, progress: Arc<dyn ProgressSink>) -> Result<TransferStats> {
    let stats = match job.mode()? {
        TransferMode::RemoteToFile => export(job, Arc::clone(&progress)).await?,
        TransferMode::FileToRemote => import(job, Arc::clone(&progress)).await?,
        TransferMode::RemoteToRemote => copy(job, Arc::clone(&progress)).await?,
    };
    progress.finish();
    Ok(stats)
}

/// remote → file
async fn export(job: &TransferJob, progress: Arc<dyn ProgressSink>) -> Result<TransferStats> {
    let (Endpoint::Remote(src), Endpoint::File(dst)) = (&job.source, &job.dest) else {
        unreachable!("mode already resolved");
    };

    // Fail on a clobbered destination before touching the remote side.
    let out = sink::file::SinkOutput::create(dst.path.as_deref(), job.overwrite)?;

    let client = client::create_client(src)?;
    let total =
        source::remote::preflight(&client, &src.collection, job.time_filter.as_ref()).await?;
    progress.expect(total);

    log::debug!("Entering schema transfer phase");
    let schema = schema::fetch_schema(&client, &src.collection).await?;
    match &dst.path {
        Some(path) => schema::write_schema_to_file(path, &schema)?,
        None => log::warn!("no destination path, schema not written alongside stdout"),
    }

    log::debug!("Entering streaming phase");
    let (tx, rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();

    let producer = {
        let cancel = cancel.clone();
        let collection = src.collection.clone();
        let filter = job.time_filter.clone();
        let page_size = job.page_size;
        tokio::spawn(async move {
            let res =
                source::remote::pump(client, collection, filter, page_size, tx, cancel.clone())
                    .await;
            if res.is_err() {
                cancel.cancel();
            }
            res
        })
    };

    let consumer = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let res = sink::file::write_documents(rx, out, &*progress, &cancel);
            if res.is_err() {
                cancel.cancel();
            }
            res
        })
    };

    join_pipeline(producer, consumer).await
}

/// file → remote
async fn import(job: &TransferJob, progress: Arc<dyn ProgressSink>) -> Result<TransferStats> {
    let (Endpoint::File(src), Endpoint::Remote(dst)) = (&job.source, &job.dest) else {
        unreachable!("mode already resolved");
    };

    let client = client::create_client(dst)?;

    log::debug!("Entering schema transfer phase");
    let schema = match &src.path {
        Some(path) => schema::read_schema_from_file(path)?,
        None => {
            return Err(TransferError::InvalidJob(
                "a source file path is required to locate the schema companion".into(),
            ));
        }
    };
    schema::apply_schema_to_remote(&client, &dst.collection, &schema).await?;

    if let Some(path) = &src.path {
        // Byte-based expectation, best-effort: the bar tracks payload bytes
        // against the on-disk size.
        if let Ok(meta) = std::fs::metadata(path) {
            progress.expect(meta.len());
        }
    }

    log::debug!("Entering streaming phase");
    let reader = source::file::open_source(src.path.as_deref())?;
    let (tx, rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();

    let producer = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let res = source::file::pump(reader, tx, cancel.clone());
            if res.is_err() {
                cancel.cancel();
            }
            res
        })
    };

    let consumer = {
        let cancel = cancel.clone();
        let dest_collection = Some(dst.collection.clone());
        tokio::spawn(async move {
            let res = sink::remote::pump(
                client,
                dest_collection,
                rx,
                progress,
                ProgressUnit::Bytes,
                cancel.clone(),
            )
            .await;
            if res.is_err() {
                cancel.cancel();
            }
            res
        })
    };

    join_pipeline(producer, consumer).await
}

/// remote → remote
async fn copy(job: &TransferJob, progress: Arc<dyn ProgressSink>) -> Result<TransferStats> {
    let (Endpoint::Remote(src), Endpoint::Remote(dst)) = (&job.source, &job.dest) else {
        unreachable!("mode already resolved");
    };

    let src_client = client::create_client(src)?;
    let dst_client = client::create_client(dst)?;

    let total =
        source::remote::preflight(&src_client, &src.collection, job.time_filter.as_ref()).await?;
    progress.expect(total);

    log::debug!("Entering schema transfer phase");
    let schema = schema::fetch_schema(&src_client, &src.collection).await?;
    schema::apply_schema_to_remote(&dst_client, &dst.collection, &schema).await?;

    log::debug!("Entering streaming phase");
    let (tx, rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();

    let producer = {
        let cancel = cancel.clone();
        let collection = src.collection.clone();
        let filter = job.time_filter.clone();
        let page_size = job.page_size;
        tokio::spawn(async move {
            let res = source::remote::pump(
                src_client,
                collection,
                filter,
                page_size,
                tx,
                cancel.clone(),
            )
            .await;
            if res.is_err() {
                cancel.cancel();
            }
            res
        })
    };

    let consumer = {
        let cancel = cancel.clone();
        let dest_collection = Some(dst.collection.clone());
        tokio::spawn(async move {
            let res = sink::remote::pump(
                dst_client,
                dest_collection,
                rx,
                progress,
                ProgressUnit::Items,
                cancel.clone(),
            )
            .await;
            if res.is_err() {
                cancel.cancel();
            }
            res
        })
    };

    join_pipeline(producer, consumer).await
}

/// Join both pipeline tasks and surface the first real failure.
pub async fn join_pipeline(
    producer: JoinHandle<Result<()>>,
    consumer: JoinHandle<Result<TransferStats>>,
) -> Result<TransferStats> {
    let (produced, consumed) = tokio::join!(producer, consumer);
    let produced = produced.unwrap_or_else(|e| Err(e.into()));
    let consumed = consumed.unwrap_or_else(|e| Err(e.into()));
    first_error(produced, consumed)
}

/// First error wins: a task that observed the cancellation signal reports
/// `Cancelled`, which is demoted in favor of whichever error triggered it.
fn first_error(
    produced: Result<()>,
    consumed: Result<TransferStats>,
) -> Result<TransferStats> {
    match (produced, consumed) {
        (Ok(()), Ok(stats)) => Ok(stats),
        (Ok(()), Err(e)) => Err(e),
        (Err(TransferError::Cancelled), Err(e)) => Err(e),
        (Err(e), _) => Err(e),
    }
}
