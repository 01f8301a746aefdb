pub mod cli;
pub mod client;
pub mod document;
pub mod error;
pub mod job;
pub mod progress;
pub mod schema;
pub mod sink;
pub mod source;
pub mod transfer;

use std::sync::Arc;
use std::time::Instant;

use bytesize::ByteSize;

use crate::progress::{NoProgress, ProgressSink, TransferBar};

pub async fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let args = cli::Cli::parse();

    // Configure logger based on debug flag
    if args.debug {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
        log::debug!("Debug logging enabled");
    } else {
        env_logger::init();
    }

    // Enable colors if not in quiet mode
    if !args.quiet {
        console::set_colors_enabled(true);
        log::debug!("Console colors enabled");
    }

    let job = job::TransferJob::from_command(&args.command)?;

    let progress: Arc<dyn ProgressSink> = if args.quiet {
        Arc::new(NoProgress)
    } else {
        Arc::new(TransferBar::stderr())
    };

    let start_time = Instant::now();
    let stats = transfer::run(&job, progress).await?;
    let elapsed = start_time.elapsed();

    log::info!(
        "Transfer completed: {} documents ({}) in {:.2?} ({:.0} docs/sec, {}/sec)",
        stats.items,
        ByteSize(stats.bytes),
        elapsed,
        stats.items as f64 / elapsed.as_secs_f64(),
        ByteSize((stats.bytes as f64 / elapsed.as_secs_f64()) as u64)
    );

    Ok(())
}
