//! Pipeline properties that hold without any server: file round trips,
//! backpressure through the single-slot channel, and first-error-wins
//! cancellation.

use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use elasticferry::document::Document;
use elasticferry::error::TransferError;
use elasticferry::progress::NoProgress;
use elasticferry::sink::file::{SinkOutput, write_documents};
use elasticferry::source::file::{open_source, pump};
use elasticferry::transfer::join_pipeline;

fn doc(id: &str, payload: &str) -> Document {
    Document {
        collection: "events".into(),
        id: id.into(),
        payload: RawValue::from_string(payload.to_string()).unwrap(),
    }
}

/// Drive a batch of documents through the file sink into `path`.
fn write_to_file(path: &std::path::Path, docs: Vec<Document>) {
    let out = SinkOutput::create(Some(path), false).unwrap();
    let (tx, rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let sink = std::thread::spawn(move || write_documents(rx, out, &NoProgress, &cancel));
    for d in docs {
        tx.blocking_send(d).unwrap();
    }
    drop(tx);
    sink.join().unwrap().unwrap();
}

/// Read every document back out of `path` through the file source.
fn read_from_file(path: &std::path::Path) -> Vec<Document> {
    let reader = open_source(Some(path)).unwrap();
    let (tx, mut rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let source = std::thread::spawn(move || pump(reader, tx, cancel));

    let mut docs = Vec::new();
    while let Some(d) = rx.blocking_recv() {
        docs.push(d);
    }
    source.join().unwrap().unwrap();
    docs
}

fn assert_round_trip(file_name: &str) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(file_name);

    let originals: Vec<Document> = (0..250)
        .map(|i| doc(&format!("doc-{i}"), &format!(r#"{{"n":{i},"tag":"even odd"}}"#)))
        .collect();
    write_to_file(&path, originals.clone());

    let restored = read_from_file(&path);
    assert_eq!(restored.len(), originals.len());
    for (orig, back) in originals.iter().zip(&restored) {
        assert_eq!(back.collection, orig.collection);
        assert_eq!(back.id, orig.id);
        assert_eq!(back.payload.get(), orig.payload.get());
    }
}

#[test]
fn file_round_trip_preserves_documents_in_order() {
    assert_round_trip("events.json");
}

#[test]
fn gzipped_file_round_trip_preserves_documents_in_order() {
    assert_round_trip("events.json.gz");
}

/// BufRead wrapper that records how many bytes the reader has consumed, so a
/// test can observe how far ahead the producer has run.
struct CountingReader<R> {
    inner: R,
    consumed: Arc<AtomicUsize>,
}

impl<R: BufRead> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.consumed.fetch_add(amt, Ordering::SeqCst);
        self.inner.consume(amt);
    }
}

#[test]
fn slow_sink_throttles_the_source_to_one_record_ahead() {
    // 100 identical fixed-width lines make consumed bytes a line counter.
    let line = "{\"collection\":\"events\",\"id\":\"x\",\"payload\":{\"n\":0}}\n";
    let input: String = line.repeat(100);
    let line_len = line.len();

    let consumed = Arc::new(AtomicUsize::new(0));
    let reader = CountingReader {
        inner: io::Cursor::new(input),
        consumed: Arc::clone(&consumed),
    };

    let (tx, mut rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let source = std::thread::spawn(move || pump(reader, tx, cancel));

    // Accept five records, then give the producer time to run as far ahead
    // as the channel lets it.
    for _ in 0..5 {
        rx.blocking_recv().unwrap();
    }
    std::thread::sleep(std::time::Duration::from_millis(100));

    // Five accepted, one parked in the channel slot, one in the producer's
    // hand blocked on send. More than that means the channel is buffering.
    let lines_consumed = consumed.load(Ordering::SeqCst) / line_len;
    assert!(
        lines_consumed <= 7,
        "source consumed {lines_consumed} lines after 5 were accepted"
    );

    while rx.blocking_recv().is_some() {}
    source.join().unwrap().unwrap();
}

/// Writer that fails once a byte budget is exhausted, standing in for a full
/// disk partway through a transfer.
struct FailingWriter {
    written: usize,
    limit: usize,
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() > self.limit {
            return Err(io::Error::other("disk full"));
        }
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn sink_failure_stops_the_source_and_is_the_reported_error() {
    let line = "{\"collection\":\"events\",\"id\":\"x\",\"payload\":{\"n\":0}}\n";
    let total_lines = 1000;
    let input: String = line.repeat(total_lines);

    let consumed = Arc::new(AtomicUsize::new(0));
    let reader = CountingReader {
        inner: io::Cursor::new(input),
        consumed: Arc::clone(&consumed),
    };

    // Room for roughly five lines before the sink starts failing.
    let out = SinkOutput::plain(Box::new(FailingWriter {
        written: 0,
        limit: line.len() * 5,
    }));

    let (tx, rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();

    let producer = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let res = pump(reader, tx, cancel.clone());
            if res.is_err() {
                cancel.cancel();
            }
            res
        })
    };
    let consumer = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let res = write_documents(rx, out, &NoProgress, &cancel);
            if res.is_err() {
                cancel.cancel();
            }
            res
        })
    };

    let err = join_pipeline(producer, consumer).await.unwrap_err();

    // The root cause surfaces, not a derived cancellation error.
    match err {
        TransferError::Io(e) => assert!(e.to_string().contains("disk full")),
        other => panic!("expected the sink's I/O error, got {other:?}"),
    }

    // The source stopped close to the failure point instead of draining all
    // 1000 records.
    let lines_consumed = consumed.load(Ordering::SeqCst) / line.len();
    assert!(
        lines_consumed < total_lines / 2,
        "source kept producing after the sink failed ({lines_consumed} lines)"
    );
}
