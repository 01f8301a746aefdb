use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// What a progress increment counts. The file sink reports items, the remote
/// sink reports items or bytes depending on how the expected total was seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    Items,
    Bytes,
}

/// Reporting capability injected into the consumer side of the pipeline.
///
/// The core never knows how progress is rendered; the CLI layer decides
/// between a terminal bar and a no-op. Counters are advanced only by the
/// consumer task, so implementations see single-writer traffic.
pub trait ProgressSink: Send + Sync {
    /// Seed the expected total from a pre-flight count or file size.
    /// Best-effort, not authoritative.
    fn expect(&self, total: u64);
    fn add(&self, n: u64);
    fn finish(&self);
}

/// Terminal progress bar drawing to stderr, so primary output can be
/// redirected to a file.
pub struct TransferBar {
    bar: ProgressBar,
}

impl TransferBar {
    pub fn stderr() -> TransferBar {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}) {eta}",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        TransferBar { bar }
    }
}

impl ProgressSink for TransferBar {
    fn expect(&self, total: u64) {
        self.bar.set_length(total);
    }

    fn add(&self, n: u64) {
        self.bar.inc(n);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

/// Progress sink for quiet mode.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn expect(&self, _total: u64) {}
    fn add(&self, _n: u64) {}
    fn finish(&self) {}
}
