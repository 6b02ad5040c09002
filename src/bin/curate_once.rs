//! One curation pass from the command line.
//!
//! `--dry-run` keeps records in memory and logs the message instead of posting.
//! `--limit N` caps scorer calls (default 3, 0 = no cap).

use anyhow::Context;
use clap::Parser;
use feed_curator::bootstrap::{BuildOptions, Runtime};
use feed_curator::CancelToken;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "curate-once")]
#[command(about = "Run the feed curator once and exit")]
struct Args {
    /// Log the message instead of posting; nothing is persisted
    #[arg(long)]
    dry_run: bool,

    /// Maximum items sent to the scorer (0 = no cap)
    #[arg(short, long, default_value_t = 3)]
    limit: usize,

    /// Header label; defaults to today's date (UTC)
    #[arg(long)]
    label: Option<String>,

    /// Abort the run after this many seconds
    #[arg(long, default_value_t = 540)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    feed_curator::logging::try_init();
    let args = Args::parse();

    let rt = Runtime::from_env(BuildOptions {
        dry_run: args.dry_run,
        max_evaluations: args.limit,
    })
    .await?;

    let cancel = CancelToken::with_timeout(Duration::from_secs(args.timeout_secs));
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            ctrl_c.cancel();
        }
    });

    let label = args
        .label
        .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string());
    let outcome = rt
        .curator
        .run_once(&label, &cancel)
        .await
        .context("curation run failed")?;

    println!("{}", outcome.message());
    Ok(())
}
