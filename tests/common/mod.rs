//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use nft_ingest::etl::chain::{BlockHead, BlockRef, ChainClient};
use nft_ingest::etl::error::{ChainError, FetchError, SinkError};
use nft_ingest::etl::extractor::TransferFetcher;
use nft_ingest::etl::sink::Sink;
use nft_ingest::etl::transfer::{Page, QueryScope, Transfer};

pub fn timestamp(block: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + block as i64 * 12, 0).unwrap()
}

pub fn transfer(block: u64, n: u64) -> Transfer {
    Transfer {
        token_address: "0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d".to_string(),
        token_id: n.to_string(),
        from_address: "0x0000000000000000000000000000000000000000".to_string(),
        to_address: format!("0x{n:040x}"),
        contract_type: "ERC721".to_string(),
        price: String::new(),
        quantity: "1".to_string(),
        block_number: block.to_string(),
        block_timestamp: timestamp(block),
        block_hash: format!("0xb{block}"),
        transaction_hash: format!("0xt{block}_{n}"),
        transaction_type: "Single".to_string(),
    }
}

/// `count` transfers in `block`, numbered from `first`.
pub fn transfers(block: u64, first: u64, count: u64) -> Vec<Transfer> {
    (first..first + count).map(|n| transfer(block, n)).collect()
}

pub fn page(transfers: Vec<Transfer>, cursor: &str) -> Page {
    Page {
        page_size: transfers.len() as u64,
        page_number: 0,
        cursor: cursor.to_string(),
        transfers,
    }
}

pub fn bad_request() -> FetchError {
    FetchError::RetryableStatus {
        status: 400,
        body: "{\"message\":\"rate limited\"}".to_string(),
    }
}

type Key = (QueryScope, Option<String>);

/// Replays scripted responses per `(scope, cursor)` and records every call.
///
/// Unscripted requests get an empty page, which ends the scope.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<Key, VecDeque<Result<Page, FetchError>>>>,
    calls: Mutex<Vec<Key>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(
        self,
        scope: QueryScope,
        cursor: Option<&str>,
        response: Result<Page, FetchError>,
    ) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry((scope, cursor.map(str::to_string)))
            .or_default()
            .push_back(response);
        self
    }

    /// Scripts a chain of pages; page `i` is served for cursor `c{i}` and
    /// points at `c{i+1}`, the last one carries an empty cursor.
    pub fn pages(mut self, scope: QueryScope, pages: Vec<Vec<Transfer>>) -> Self {
        let count = pages.len();
        for (i, transfers) in pages.into_iter().enumerate() {
            let cursor = (i > 0).then(|| format!("c{i}"));
            let next = if i + 1 == count {
                String::new()
            } else {
                format!("c{}", i + 1)
            };
            self = self.respond(scope, cursor.as_deref(), Ok(page(transfers, &next)));
        }
        self
    }

    pub fn calls(&self) -> Vec<Key> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferFetcher for ScriptedFetcher {
    async fn fetch(&self, scope: &QueryScope, cursor: Option<&str>) -> Result<Page, FetchError> {
        let key = (*scope, cursor.map(str::to_string));
        self.calls.lock().unwrap().push(key.clone());

        self.responses
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Page::default()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Write(Vec<Transfer>),
    Flush,
}

/// Records writes and flushes in order.
#[derive(Default)]
pub struct MemorySink {
    pub events: Vec<SinkEvent>,
    pub fail_writes: bool,
}

impl MemorySink {
    pub fn writes(&self) -> Vec<Vec<Transfer>> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Write(batch) => Some(batch.clone()),
                SinkEvent::Flush => None,
            })
            .collect()
    }

    pub fn records(&self) -> Vec<Transfer> {
        self.writes().concat()
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&mut self, transfers: &[Transfer]) -> Result<(), SinkError> {
        if self.fail_writes {
            return Err(SinkError::Io(std::io::Error::other("disk full")));
        }
        self.events.push(SinkEvent::Write(transfers.to_vec()));
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.events.push(SinkEvent::Flush);
        Ok(())
    }
}

/// Resolves `0xh{n}` to block `n`.
pub struct StaticChain;

pub fn head(number: u64) -> BlockHead {
    BlockHead {
        number,
        hash: format!("0xh{number}"),
    }
}

#[async_trait]
impl ChainClient for StaticChain {
    async fn block_by_hash(&self, hash: &str) -> Result<BlockRef, ChainError> {
        let number = hash
            .strip_prefix("0xh")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;

        Ok(BlockRef {
            number,
            hash: hash.to_string(),
            timestamp: timestamp(number),
        })
    }
}
