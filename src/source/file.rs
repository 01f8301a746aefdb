use std::fs::File;
use std::io::{BufRead, BufReader, stdin};
use std::path::Path;

use flate2::read::GzDecoder;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::document::Document;
use crate::error::{Result, TransferError};
use crate::job::path_is_gzip;

/// Open the byte source for a data file, decompressing transparently when
/// the path carries the gzip suffix. No path means standard input.
pub fn open_source(path: Option<&Path>) -> Result<Box<dyn BufRead + Send>> {
    match path {
        None => {
            log::debug!("Reading documents from stdin");
            Ok(Box::new(BufReader::new(stdin())))
        }
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                TransferError::Io(std::io::Error::new(
                    e.kind(),
                    format!("unable to open source file {}: {e}", path.display()),
                ))
            })?;
            if path_is_gzip(path) {
                log::debug!("Reading gzip-compressed documents from {}", path.display());
                Ok(Box::new(BufReader::new(GzDecoder::new(BufReader::new(
                    file,
                )))))
            } else {
                log::debug!("Reading documents from {}", path.display());
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

/// Stream every document from a local byte source, one per line.
///
/// Runs on the blocking pool and hands records to the async side through the
/// channel. End of stream is the normal terminal condition; a line that does
/// not decode is logged and skipped. Reacts to the shared cancellation
/// signal between records, and treats a closed channel as cancellation (the
/// consumer is gone and has already recorded the cause).
pub fn pump(
    reader: impl BufRead,
    tx: Sender<Document>,
    cancel: CancellationToken,
) -> Result<()> {
    read_lines(reader, &tx, &cancel)
    // The reader (and any decompressor wrapped inside it) is released here on
    // both the normal and abort paths.
}

fn read_lines(
    mut reader: impl BufRead,
    tx: &Sender<Document>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut line = String::new();
    let mut emitted = 0u64;
    let mut skipped = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }

        let record = line.trim_end_matches(['\n', '\r']);
        if record.is_empty() {
            continue;
        }

        let doc: Document = match serde_json::from_str(record) {
            Ok(doc) => doc,
            Err(e) => {
                skipped += 1;
                log::warn!("skipping malformed record: {e}");
                continue;
            }
        };

        if tx.blocking_send(doc).is_err() {
            return Err(TransferError::Cancelled);
        }
        emitted += 1;
    }

    if skipped > 0 {
        log::warn!("{skipped} malformed record(s) were skipped");
    }
    log::debug!("File source finished after {emitted} document(s)");
    Ok(())
}
