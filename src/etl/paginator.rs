//! Cursor-driven pagination over one query scope.
//!
//! A [`Paginator`] fetches pages strictly one after another, following the
//! continuation cursor, and hands each page's transfers to a
//! [`TransferConsumer`] before asking for the next page. The cursor only
//! advances after the consumer accepted the whole page, so a retried page can
//! never be yielded twice.
//!
//! ```text
//! Start -> Fetching -> Continuing -> Fetching -> ... -> Exhausted
//!             |  ^          |
//!             v  |          +--> Cancelled
//!          RetryWait
//!             |
//!             +--> Aborted (error)
//! ```

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::etl::error::{FetchError, PipelineError, PipelineResult, SinkError};
use crate::etl::extractor::{RetryPolicy, TransferFetcher};
use crate::etl::transfer::{Page, QueryScope, Transfer};

/// Receives the transfers of each page, in API order.
#[async_trait]
pub trait TransferConsumer: Send {
    async fn consume(&mut self, transfers: Vec<Transfer>) -> Result<(), SinkError>;
}

/// How a paginator run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The scope has no more transfers.
    Exhausted,
    /// Cancellation was observed between two pages.
    Cancelled,
}

/// Summary of a finished paginator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationOutcome {
    pub termination: Termination,
    /// Pages that carried at least one transfer.
    pub pages: u64,
    pub transfers: u64,
    /// Fetch calls issued, retries included.
    pub fetch_calls: u64,
    /// Last non-empty cursor received; resuming from it continues the scope.
    pub last_cursor: Option<String>,
}

impl PaginationOutcome {
    fn new() -> Self {
        Self {
            termination: Termination::Exhausted,
            pages: 0,
            transfers: 0,
            fetch_calls: 0,
            last_cursor: None,
        }
    }
}

pub struct Paginator<'a> {
    fetcher: &'a dyn TransferFetcher,
    retry_policy: &'a RetryPolicy,
    scope: QueryScope,
    initial_cursor: Option<String>,
    cancel: CancellationToken,
}

impl<'a> Paginator<'a> {
    pub fn new(
        fetcher: &'a dyn TransferFetcher,
        retry_policy: &'a RetryPolicy,
        scope: QueryScope,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            retry_policy,
            scope,
            initial_cursor: None,
            cancel,
        }
    }

    /// Resumes the scope from a cursor returned by an earlier run.
    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.initial_cursor = cursor.filter(|c| !c.is_empty());
        self
    }

    /// Drives the scope to exhaustion or cancellation.
    ///
    /// Transport, decode and fatal-status errors abort the run immediately;
    /// so does a consumer error. Records already consumed stay consumed.
    pub async fn run<C>(self, consumer: &mut C) -> PipelineResult<PaginationOutcome>
    where
        C: TransferConsumer + ?Sized,
    {
        let mut outcome = PaginationOutcome::new();
        let mut cursor = self.initial_cursor.clone();
        outcome.last_cursor.clone_from(&cursor);

        tracing::debug!(
            target: "nft_ingest::etl::paginator",
            scope = %self.scope,
            resume = cursor.is_some(),
            "Starting pagination"
        );

        loop {
            let page = self.fetch_page(cursor.as_deref(), &mut outcome).await?;
            let Page {
                transfers,
                cursor: next_cursor,
                ..
            } = page;

            let Some(last) = transfers.last() else {
                tracing::debug!(
                    target: "nft_ingest::etl::paginator",
                    scope = %self.scope,
                    "Empty page, scope exhausted"
                );
                outcome.termination = Termination::Exhausted;
                return Ok(outcome);
            };

            let count = transfers.len();
            let last_block = last.block_number.clone();
            let last_timestamp = last.block_timestamp;

            consumer.consume(transfers).await?;

            outcome.pages += 1;
            outcome.transfers += count as u64;

            tracing::info!(
                target: "nft_ingest::etl::paginator",
                "{} txns with cursor {} @ {}",
                count,
                last_block,
                last_timestamp.to_rfc3339()
            );

            if next_cursor.is_empty() {
                tracing::info!(target: "nft_ingest::etl::paginator", "---");
                outcome.termination = Termination::Exhausted;
                return Ok(outcome);
            }

            outcome.last_cursor = Some(next_cursor.clone());
            cursor = Some(next_cursor);

            if self.cancel.is_cancelled() {
                tracing::info!(
                    target: "nft_ingest::etl::paginator",
                    scope = %self.scope,
                    "Cancellation requested, stopping pagination"
                );
                outcome.termination = Termination::Cancelled;
                return Ok(outcome);
            }
        }
    }

    /// One page, retrying the same scope and cursor as the policy allows.
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        outcome: &mut PaginationOutcome,
    ) -> PipelineResult<Page> {
        let mut retries: u32 = 0;

        loop {
            outcome.fetch_calls += 1;

            let err = match self.fetcher.fetch(&self.scope, cursor).await {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };

            if self.retry_policy.should_retry(&err, retries) {
                let delay = self.retry_policy.backoff(retries);
                retries = retries.saturating_add(1);

                tracing::warn!(
                    target: "nft_ingest::etl::paginator",
                    scope = %self.scope,
                    retry = retries,
                    delay = ?delay,
                    "API request failed (retrying): {}",
                    err
                );

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            return Err(self.abort(err, retries));
        }
    }

    fn abort(&self, source: FetchError, retries: u32) -> PipelineError {
        tracing::error!(
            target: "nft_ingest::etl::paginator",
            scope = %self.scope,
            "API request failed: {}",
            source
        );

        if self.retry_policy.is_retryable(&source) {
            PipelineError::RetriesExhausted {
                scope: self.scope,
                attempts: retries.saturating_add(1),
                source,
            }
        } else {
            PipelineError::Fetch {
                scope: self.scope,
                source,
            }
        }
    }
}
