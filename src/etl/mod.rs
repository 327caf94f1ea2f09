pub mod batch;
pub mod chain;
pub mod error;
pub mod extractor;
pub mod paginator;
pub mod sink;
pub mod transfer;
pub mod watcher;

pub use batch::BatchAccumulator;
pub use chain::{BlockHead, BlockRef, ChainClient, EthersChainClient, HeadSubscription};
pub use error::{ChainError, FetchError, PipelineError, PipelineResult, SinkError};
pub use extractor::{HttpTransferFetcher, RetryPolicy, TransferFetcher};
pub use paginator::{PaginationOutcome, Paginator, Termination, TransferConsumer};
pub use sink::{FileSink, PageForwarder, Sink, TopicSink};
pub use transfer::{Page, QueryScope, Transfer};
pub use watcher::{BlockWatcher, WatchSummary};
