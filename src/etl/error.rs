//! Error types for the ingestion pipeline.
//!
//! Every error here is terminal for the run that produced it. The only
//! failure the pipeline recovers from on its own is a retryable upstream
//! status, and that happens inside the paginator according to its
//! [`RetryPolicy`](crate::etl::extractor::RetryPolicy).

use thiserror::Error;

use super::transfer::QueryScope;

/// Failure of a single upstream round trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced a response (network, DNS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream asked the client to try again (HTTP 400).
    #[error("upstream returned retryable status {status}: {body}")]
    RetryableStatus { status: u16, body: String },

    /// Any other non-success status.
    #[error("upstream returned status {status}: {body}")]
    FatalStatus { status: u16, body: String },

    /// The body could not be decoded into a page.
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

/// Failure while handing records to a sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode transfer: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to build record batch: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("failed to write parquet: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("publish failed: {0}")]
    Publish(String),
}

/// Failure talking to the chain node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain transport error: {0}")]
    Transport(String),

    #[error("failed to decode chain response: {0}")]
    Decode(String),

    #[error("block {0} not found")]
    BlockNotFound(String),
}

/// Terminal error of a bulk or stream run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch for {scope} aborted: {source}")]
    Fetch {
        scope: QueryScope,
        #[source]
        source: FetchError,
    },

    #[error("fetch for {scope} gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        scope: QueryScope,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("sink write failed: {0}")]
    Sink(#[from] SinkError),

    #[error("block resolution failed: {0}")]
    Chain(#[source] ChainError),

    #[error("chain head subscription failed: {0}")]
    Subscription(#[source] ChainError),

    #[error("chain head subscription ended unexpectedly")]
    SubscriptionClosed,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
