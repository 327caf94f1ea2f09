//! NFT transfer ingestion.
//!
//! Pulls NFT transfer events from a paginated HTTP API and delivers them to a
//! sink, either as a bounded historical backfill ([`run_bulk`]) or by following
//! the chain head block by block ([`run_stream`]).

pub mod etl;

pub use async_trait::async_trait;
pub use tokio;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use etl::chain::{ChainClient, HeadSubscription};
use etl::error::{PipelineError, PipelineResult};
use etl::extractor::{RetryPolicy, TransferFetcher};
use etl::paginator::{Paginator, Termination};
use etl::sink::Sink;
use etl::transfer::QueryScope;
use etl::watcher::{BlockWatcher, WatchSummary};
use etl::BatchAccumulator;

pub const DEFAULT_START_BLOCK: u64 = 0;
pub const DEFAULT_END_BLOCK: u64 = 18_000_000;
pub const DEFAULT_BATCH_CAPACITY: usize = 100_000;

/// Bulk (backfill) mode configuration.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub from_block: u64,
    pub to_block: u64,

    /// Records per sink write
    pub batch_capacity: usize,

    /// Cursor printed by an earlier, interrupted run over the same range
    pub resume_cursor: Option<String>,

    pub retry_policy: RetryPolicy,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            from_block: DEFAULT_START_BLOCK,
            to_block: DEFAULT_END_BLOCK,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            resume_cursor: None,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl BulkConfig {
    pub fn new(from_block: u64, to_block: u64) -> Self {
        Self {
            from_block,
            to_block,
            ..Self::default()
        }
    }

    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    pub fn with_resume_cursor(mut self, cursor: Option<String>) -> Self {
        self.resume_cursor = cursor;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.from_block > self.to_block {
            return Err(PipelineError::Config(format!(
                "start block {} is after end block {}",
                self.from_block, self.to_block
            )));
        }
        if self.batch_capacity == 0 {
            return Err(PipelineError::Config(
                "batch capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scope(&self) -> QueryScope {
        QueryScope::range(self.from_block, self.to_block)
    }
}

/// What a finished bulk run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    pub termination: Termination,
    pub pages: u64,
    pub transfers: u64,
    pub fetch_calls: u64,
    /// Sink writes, remainder included
    pub flushes: u64,
    pub records_written: u64,
    /// Resume point for `--cursor` when the run was cancelled
    pub last_cursor: Option<String>,
}

/// Backfills one block range into `sink` through a bounded batch.
///
/// The trailing partial batch is flushed when the range is exhausted, when
/// the run is cancelled, and when a fetch aborts the run; in the last case the
/// fetch error is still returned. A sink failure stops the run without any
/// further writes.
pub async fn run_bulk<S: Sink>(
    fetcher: &dyn TransferFetcher,
    sink: S,
    config: &BulkConfig,
    cancel: CancellationToken,
) -> PipelineResult<BulkReport> {
    config.validate()?;

    let scope = config.scope();
    let mut batch = BatchAccumulator::new(sink, config.batch_capacity)?;

    tracing::info!(
        target: "nft_ingest::bulk",
        scope = %scope,
        batch_capacity = config.batch_capacity,
        resume = config.resume_cursor.is_some(),
        "Starting bulk ingestion"
    );

    let result = Paginator::new(fetcher, &config.retry_policy, scope, cancel)
        .with_cursor(config.resume_cursor.clone())
        .run(&mut batch)
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err @ (PipelineError::Fetch { .. } | PipelineError::RetriesExhausted { .. })) => {
            if let Err(flush_err) = batch.flush_remainder().await {
                tracing::error!(
                    target: "nft_ingest::bulk",
                    "Failed to flush remaining transfers after fetch error: {}",
                    flush_err
                );
            }
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    batch.flush_remainder().await?;

    if outcome.termination == Termination::Cancelled {
        tracing::info!(
            target: "nft_ingest::bulk",
            cursor = outcome.last_cursor.as_deref().unwrap_or(""),
            "Bulk ingestion cancelled, resume with --cursor"
        );
    }

    let report = BulkReport {
        termination: outcome.termination,
        pages: outcome.pages,
        transfers: outcome.transfers,
        fetch_calls: outcome.fetch_calls,
        flushes: batch.flush_count(),
        records_written: batch.records_written(),
        last_cursor: outcome.last_cursor,
    };

    tracing::info!(
        target: "nft_ingest::bulk",
        transfers = report.transfers,
        flushes = report.flushes,
        fetch_calls = report.fetch_calls,
        "Bulk ingestion finished"
    );

    Ok(report)
}

/// Follows the chain head, ingesting every new block into `sink`.
///
/// Returns only on cancellation or on a fatal error; the head subscription
/// task is stopped either way.
pub async fn run_stream<S>(
    fetcher: &dyn TransferFetcher,
    chain: &dyn ChainClient,
    mut subscription: HeadSubscription,
    sink: &mut S,
    retry_policy: &RetryPolicy,
    cancel: CancellationToken,
) -> PipelineResult<WatchSummary>
where
    S: Sink + ?Sized,
{
    let watcher = BlockWatcher::new(fetcher, chain, retry_policy, cancel);
    let result = watcher.run(subscription.receiver(), sink).await;

    subscription.shutdown().await;

    match &result {
        Ok(summary) => tracing::info!(
            target: "nft_ingest::stream",
            blocks = summary.blocks,
            transfers = summary.transfers,
            "Stream ingestion stopped"
        ),
        Err(e) => tracing::error!(target: "nft_ingest::stream", "Stream ingestion failed: {}", e),
    }

    result
}

/// Cancels `token` on Ctrl+C or SIGTERM.
pub fn spawn_shutdown_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(target: "nft_ingest::main", "Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(target: "nft_ingest::main", "Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {
                tracing::info!(target: "nft_ingest::main", "Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            () = terminate => {
                tracing::info!(target: "nft_ingest::main", "Received SIGTERM, initiating graceful shutdown...");
            }
            () = token.cancelled() => return,
        }

        token.cancel();
    })
}
