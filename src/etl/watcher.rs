//! Stream mode: one paginator run per new block.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::etl::chain::{ChainClient, HeadNotification};
use crate::etl::error::{PipelineError, PipelineResult};
use crate::etl::extractor::{RetryPolicy, TransferFetcher};
use crate::etl::paginator::{Paginator, Termination};
use crate::etl::sink::{PageForwarder, Sink};
use crate::etl::transfer::QueryScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub blocks: u64,
    pub transfers: u64,
    pub termination: Termination,
}

/// Consumes head notifications strictly one at a time.
///
/// Each block is resolved against the chain and then paginated to completion
/// with a fresh cursor, forwarding every page directly to the sink. Blocks
/// never interleave. Cancellation is only observed between blocks.
pub struct BlockWatcher<'a> {
    fetcher: &'a dyn TransferFetcher,
    chain: &'a dyn ChainClient,
    retry_policy: &'a RetryPolicy,
    cancel: CancellationToken,
}

impl<'a> BlockWatcher<'a> {
    pub fn new(
        fetcher: &'a dyn TransferFetcher,
        chain: &'a dyn ChainClient,
        retry_policy: &'a RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            chain,
            retry_policy,
            cancel,
        }
    }

    /// Runs until the subscription fails or ends, a block aborts, or
    /// cancellation is requested.
    ///
    /// Only cancellation is a clean exit; the head stream is expected to be
    /// infinite, so its end is an error too.
    pub async fn run<S>(
        &self,
        heads: &mut mpsc::Receiver<HeadNotification>,
        sink: &mut S,
    ) -> PipelineResult<WatchSummary>
    where
        S: Sink + ?Sized,
    {
        let mut summary = WatchSummary {
            blocks: 0,
            transfers: 0,
            termination: Termination::Cancelled,
        };

        loop {
            let notification = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::info!(
                        target: "nft_ingest::etl::watcher",
                        blocks = summary.blocks,
                        transfers = summary.transfers,
                        "Block watcher cancelled"
                    );
                    return Ok(summary);
                }
                notification = heads.recv() => notification,
            };

            let head = match notification {
                Some(Ok(head)) => head,
                Some(Err(e)) => return Err(PipelineError::Subscription(e)),
                None => return Err(PipelineError::SubscriptionClosed),
            };

            let block = self
                .chain
                .block_by_hash(&head.hash)
                .await
                .map_err(PipelineError::Chain)?;

            tracing::info!(
                target: "nft_ingest::etl::watcher",
                block = block.number,
                hash = %block.hash,
                "New block"
            );

            let mut forwarder = PageForwarder::new(&mut *sink);
            let outcome = Paginator::new(
                self.fetcher,
                self.retry_policy,
                QueryScope::block(block.number),
                CancellationToken::new(),
            )
            .run(&mut forwarder)
            .await?;

            summary.blocks += 1;
            summary.transfers += outcome.transfers;
        }
    }
}
