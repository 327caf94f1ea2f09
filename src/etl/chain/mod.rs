//! Chain-head notifications and block resolution for stream mode.

pub mod node;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::{Block, H256};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::etl::error::ChainError;

pub use node::EthersChainClient;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A newly observed chain head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHead {
    pub number: u64,
    pub hash: String,
}

impl BlockHead {
    /// Reads number and hash off a header. Pending blocks carry neither.
    pub fn from_block<TX>(block: &Block<TX>) -> Result<Self, ChainError> {
        match (block.number, block.hash) {
            (Some(number), Some(hash)) => Ok(Self {
                number: number.as_u64(),
                hash: format!("{hash:#x}"),
            }),
            _ => Err(ChainError::Decode("header without number or hash".to_string())),
        }
    }
}

/// A block resolved against the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub number: u64,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Read access to the chain node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_by_hash(&self, hash: &str) -> Result<BlockRef, ChainError>;
}

#[async_trait]
impl<T: ChainClient + ?Sized> ChainClient for Arc<T> {
    async fn block_by_hash(&self, hash: &str) -> Result<BlockRef, ChainError> {
        (**self).block_by_hash(hash).await
    }
}

/// One item of the head stream. An `Err` is the last item the producer sends.
pub type HeadNotification = Result<BlockHead, ChainError>;

/// New-head subscription pumped into a bounded channel by a background task.
///
/// Heads arrive in the order the node announces them. A subscription failure
/// is delivered as an `Err` item and ends the producer, as does cancellation
/// or the end of the node's stream.
pub struct HeadSubscription {
    heads: mpsc::Receiver<HeadNotification>,
    task: JoinHandle<()>,
}

impl HeadSubscription {
    /// Subscribes to `newHeads` over the websocket provider.
    pub fn spawn(provider: Arc<Provider<Ws>>, capacity: usize, cancel: CancellationToken) -> Self {
        let (tx, heads) = mpsc::channel(capacity.max(1));

        let task = tokio::spawn(async move {
            let stream = match provider.subscribe_blocks().await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(target: "nft_ingest::etl::chain", "Failed to subscribe to new heads: {}", e);
                    let _ = tx.send(Err(ChainError::Transport(e.to_string()))).await;
                    return;
                }
            };

            tracing::info!(target: "nft_ingest::etl::chain", "Subscribed to new heads");

            let stream = stream.map(|block: Block<H256>| BlockHead::from_block(&block));
            forward_heads(std::pin::pin!(stream), tx, cancel).await;
        });

        Self { heads, task }
    }

    /// Pumps an already established head stream.
    pub fn from_stream<S>(stream: S, capacity: usize, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = HeadNotification> + Send + 'static,
    {
        let (tx, heads) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(async move {
            forward_heads(Box::pin(stream), tx, cancel).await;
        });
        Self { heads, task }
    }

    pub fn receiver(&mut self) -> &mut mpsc::Receiver<HeadNotification> {
        &mut self.heads
    }

    /// Stops the producer and waits for it to exit.
    pub async fn shutdown(self) {
        let Self { heads, task } = self;
        drop(heads);
        task.abort();

        if let Err(e) = task.await {
            if !e.is_cancelled() {
                tracing::warn!(target: "nft_ingest::etl::chain", "Head subscription task failed: {}", e);
            }
        }
    }
}

async fn forward_heads<S>(mut stream: S, tx: mpsc::Sender<HeadNotification>, cancel: CancellationToken)
where
    S: Stream<Item = HeadNotification> + Unpin,
{
    loop {
        let notification = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(target: "nft_ingest::etl::chain", "Head subscription cancelled");
                return;
            }
            next = stream.next() => match next {
                Some(notification) => notification,
                None => {
                    tracing::warn!(target: "nft_ingest::etl::chain", "Head stream ended");
                    return;
                }
            },
        };

        let failed = notification.is_err();
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            sent = tx.send(notification) => {
                if sent.is_err() {
                    tracing::debug!(target: "nft_ingest::etl::chain", "Head receiver dropped");
                    return;
                }
            }
        }

        if failed {
            return;
        }
    }
}
