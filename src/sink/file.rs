use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write, stdout};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use crate::document::Document;
use crate::error::{Result, TransferError};
use crate::job::path_is_gzip;
use crate::progress::ProgressSink;
use crate::transfer::TransferStats;

/// Destination byte stream for the file sink, compressing when the path
/// carries the gzip suffix.
pub enum SinkOutput {
    Plain(BufWriter<Box<dyn Write + Send>>),
    Gzip(BufWriter<GzEncoder<Box<dyn Write + Send>>>),
}

impl SinkOutput {
    /// Open the destination path for writing, or standard output if no path
    /// is given. The file is created fresh unless `overwrite` is set.
    pub fn create(path: Option<&Path>, overwrite: bool) -> Result<SinkOutput> {
        match path {
            None => {
                log::debug!("Writing documents to stdout");
                Ok(SinkOutput::plain(Box::new(stdout())))
            }
            Some(path) => {
                let mut open_options = OpenOptions::new();
                open_options.write(true).create(true);
                if overwrite {
                    log::debug!("Destination file will be overwritten if it exists");
                    open_options.truncate(true);
                } else {
                    open_options.create_new(true);
                }

                let file = open_options.open(path).map_err(|e| {
                    let detail = if !overwrite && path.exists() {
                        format!(
                            "destination file '{}' already exists, use --overwrite to replace it",
                            path.display()
                        )
                    } else {
                        format!("unable to create destination file {}: {e}", path.display())
                    };
                    TransferError::Io(io::Error::new(e.kind(), detail))
                })?;

                let writer: Box<dyn Write + Send> = Box::new(file);
                if path_is_gzip(path) {
                    log::debug!("Writing gzip-compressed documents to {}", path.display());
                    Ok(SinkOutput::gzip(writer))
                } else {
                    log::debug!("Writing documents to {}", path.display());
                    Ok(SinkOutput::plain(writer))
                }
            }
        }
    }

    pub fn plain(writer: Box<dyn Write + Send>) -> SinkOutput {
        SinkOutput::Plain(BufWriter::new(writer))
    }

    pub fn gzip(writer: Box<dyn Write + Send>) -> SinkOutput {
        SinkOutput::Gzip(BufWriter::new(GzEncoder::new(writer, Compression::default())))
    }

    /// Flush buffered data and, for compressed output, write the gzip
    /// trailer before the underlying stream is released.
    pub fn finish(self) -> io::Result<()> {
        match self {
            SinkOutput::Plain(mut writer) => writer.flush(),
            SinkOutput::Gzip(writer) => {
                let encoder = writer.into_inner().map_err(|e| e.into_error())?;
                let mut inner = encoder.finish()?;
                inner.flush()
            }
        }
    }
}

impl Write for SinkOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SinkOutput::Plain(w) => w.write(buf),
            SinkOutput::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SinkOutput::Plain(w) => w.flush(),
            SinkOutput::Gzip(w) => w.flush(),
        }
    }
}

/// Consume the document stream, one JSON line per record.
///
/// Runs on the blocking pool. A record that fails to serialize is logged
/// and skipped; a write failure is fatal. On both stream end and
/// cancellation the writer is flushed and the compressor closed so the
/// output carries a valid trailer.
pub fn write_documents(
    mut rx: Receiver<Document>,
    mut out: SinkOutput,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<TransferStats> {
    let mut stats = TransferStats::default();

    loop {
        if cancel.is_cancelled() {
            if let Err(e) = out.finish() {
                log::warn!("failed to finalize output after cancellation: {e}");
            }
            return Err(TransferError::Cancelled);
        }

        let Some(doc) = rx.blocking_recv() else { break };

        let mut line = match serde_json::to_vec(&doc) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("skipping record {}: {e}", doc.id);
                continue;
            }
        };
        line.push(b'\n');
        out.write_all(&line)?;

        stats.items += 1;
        stats.bytes += line.len() as u64;
        progress.add(1);
    }

    out.finish()?;
    log::debug!("File sink finished after {} document(s)", stats.items);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read};

    use flate2::read::GzDecoder;
    use serde_json::value::RawValue;
    use tokio::sync::mpsc;

    use crate::progress::NoProgress;

    fn doc(id: &str, payload: &str) -> Document {
        Document {
            collection: "events".into(),
            id: id.into(),
            payload: RawValue::from_string(payload.to_string()).unwrap(),
        }
    }

    fn run_sink(out: SinkOutput, docs: Vec<Document>) -> TransferStats {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let writer = std::thread::spawn(move || write_documents(rx, out, &NoProgress, &cancel));
        for d in docs {
            tx.blocking_send(d).unwrap();
        }
        drop(tx);
        writer.join().unwrap().unwrap()
    }

    #[test]
    fn writes_one_newline_terminated_line_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let out = SinkOutput::create(Some(&path), false).unwrap();

        let stats = run_sink(out, vec![doc("a", "{}"), doc("b", r#"{"n":1}"#)]);
        assert_eq!(stats.items, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            r#"{"collection":"events","id":"b","payload":{"n":1}}"#
        );
    }

    #[test]
    fn gzip_output_carries_a_valid_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json.gz");
        let out = SinkOutput::create(Some(&path), false).unwrap();

        run_sink(out, vec![doc("a", "{}")]);

        // A truncated gzip stream fails here, so reading to the end proves
        // the trailer was written before close.
        let mut decoded = String::new();
        GzDecoder::new(std::fs::File::open(&path).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        let mut lines = BufReader::new(decoded.as_bytes()).lines();
        let first = lines.next().unwrap().unwrap();
        assert_eq!(first, r#"{"collection":"events","id":"a","payload":{}}"#);
    }

    #[test]
    fn refuses_to_clobber_an_existing_file_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "occupied\n").unwrap();

        assert!(SinkOutput::create(Some(&path), false).is_err());
        assert!(SinkOutput::create(Some(&path), true).is_ok());
    }
}
