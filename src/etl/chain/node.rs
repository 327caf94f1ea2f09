//! [`ChainClient`] backed by an ethers provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::{Block, H256};
use std::sync::Arc;

use super::{BlockHead, BlockRef, ChainClient};
use crate::etl::error::ChainError;

pub struct EthersChainClient<M> {
    provider: Arc<M>,
}

impl EthersChainClient<Provider<Ws>> {
    /// Opens the websocket connection shared by block lookups and the head
    /// subscription.
    pub async fn connect(url: &str) -> Result<Self, ChainError> {
        let ws = Ws::connect(url)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(Self::new(Arc::new(Provider::new(ws))))
    }
}

impl<M: Middleware> EthersChainClient<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> Arc<M> {
        self.provider.clone()
    }
}

fn block_ref(block: &Block<H256>) -> Result<BlockRef, ChainError> {
    let head = BlockHead::from_block(block)?;

    let timestamp = i64::try_from(block.timestamp)
        .ok()
        .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0))
        .ok_or_else(|| ChainError::Decode(format!("block timestamp {} out of range", block.timestamp)))?;

    Ok(BlockRef {
        number: head.number,
        hash: head.hash,
        timestamp,
    })
}

#[async_trait]
impl<M> ChainClient for EthersChainClient<M>
where
    M: Middleware + 'static,
{
    async fn block_by_hash(&self, hash: &str) -> Result<BlockRef, ChainError> {
        let id: H256 = hash
            .parse()
            .map_err(|e| ChainError::Decode(format!("invalid block hash {hash}: {e}")))?;

        let block = self
            .provider
            .get_block(id)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?
            .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;

        block_ref(&block)
    }
}
