//! Command-line configuration for the NFT transfer ingester

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use nft_ingest::etl::chain::DEFAULT_CHANNEL_CAPACITY;
use nft_ingest::etl::extractor::http::DEFAULT_API_URL;
use nft_ingest::etl::extractor::{Credentials, FetcherConfig, RetryPolicy};
use nft_ingest::etl::sink::topic::DEFAULT_TOPIC;
use nft_ingest::etl::sink::Compression;
use nft_ingest::{DEFAULT_BATCH_CAPACITY, DEFAULT_END_BLOCK, DEFAULT_START_BLOCK};

/// Upper bound for the delay between retries once backoff is enabled.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// NFT transfer ingester
///
/// Backfills historical NFT transfers into files, or follows the chain head
/// and publishes the transfers of every new block to a topic.
#[derive(Parser, Debug)]
#[command(name = "nft-ingest")]
#[command(about = "Ingest NFT transfer events from the NFT API", long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub api: ApiArgs,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Args, Debug)]
pub struct ApiArgs {
    /// API key
    #[arg(long, env = "INFURA_API_KEY")]
    pub key: String,

    /// API key secret
    #[arg(long, env = "INFURA_API_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Chain ID used in API paths
    #[arg(long, default_value = "1")]
    pub network: String,

    /// Base URL of the NFT API
    #[arg(long, env = "NFT_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Timeout for one API round trip, in seconds
    #[arg(long, default_value = "30")]
    pub request_timeout_secs: u64,

    /// Maximum retries per page on a retryable status (unbounded when unset)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Initial delay between retries in milliseconds, doubled on every retry
    /// (0 = retry immediately)
    #[arg(long, default_value = "0")]
    pub retry_backoff_ms: u64,

    /// Also retry network errors and timeouts
    #[arg(long)]
    pub retry_transport_errors: bool,
}

impl ApiArgs {
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig::new(
            self.network.clone(),
            Credentials::new(self.key.clone(), self.secret.clone()),
        )
        .with_api_url(self.api_url.clone())
        .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        };

        if self.retry_backoff_ms > 0 {
            policy.initial_backoff = Duration::from_millis(self.retry_backoff_ms);
            policy.max_backoff = MAX_RETRY_BACKOFF;
            policy.backoff_multiplier = 2.0;
        }

        policy.with_transport_retries(self.retry_transport_errors)
    }
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Backfill a block range into local files
    Bulk(BulkArgs),

    /// Follow the chain head and publish every new block's transfers
    Stream(StreamArgs),
}

#[derive(Args, Debug)]
pub struct BulkArgs {
    /// First block of the range (inclusive)
    #[arg(long, default_value_t = DEFAULT_START_BLOCK)]
    pub start: u64,

    /// Last block of the range (inclusive)
    #[arg(long, default_value_t = DEFAULT_END_BLOCK)]
    pub end: u64,

    /// Transfers per output file
    #[arg(long, default_value_t = DEFAULT_BATCH_CAPACITY)]
    pub batch: usize,

    /// Resume from a cursor printed by an interrupted run over the same range
    #[arg(long)]
    pub cursor: Option<String>,

    /// Directory receiving the output files
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Parquet column compression (none, snappy or zstd)
    #[arg(long, default_value = "snappy")]
    pub compression: Compression,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Ethereum websocket endpoint (defaults to Infura mainnet with the API key)
    #[arg(long, env = "ETH_WS_URL")]
    pub ws_url: Option<String>,

    /// New heads buffered while a block is being ingested
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub head_buffer: usize,

    /// Kafka bootstrap servers; transfers go to stdout when unset
    #[arg(long, env = "KAFKA_BROKER_URL")]
    pub broker_url: Option<String>,

    /// Broker auth token
    #[arg(long, env = "KAFKA_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Topic receiving one message per transfer
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub topic: String,
}

impl StreamArgs {
    pub fn ws_url(&self, key: &str) -> String {
        self.ws_url
            .clone()
            .unwrap_or_else(|| format!("wss://mainnet.infura.io/ws/v3/{key}"))
    }
}
