//! nft-ingest - NFT transfer ingestion
//!
//! # Usage
//!
//! ```bash
//! # Backfill blocks 12,000,000..=12,100,000 into snappy-compressed Parquet files
//! nft-ingest --key $KEY --secret $SECRET bulk --start 12000000 --end 12100000
//!
//! # Resume an interrupted backfill from its last cursor
//! nft-ingest bulk --start 12000000 --end 12100000 --cursor <cursor>
//!
//! # Follow the chain head and publish to Kafka (build with --features kafka)
//! nft-ingest stream --broker-url localhost:9092 --topic nft-transfers
//! ```

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use config::{BulkArgs, Config, Mode, StreamArgs};
use nft_ingest::etl::chain::{EthersChainClient, HeadSubscription};
use nft_ingest::etl::extractor::{HttpTransferFetcher, RetryPolicy};
use nft_ingest::etl::sink::{FileSink, FileSinkConfig, Sink, StdoutPublisher, TopicSink};
use nft_ingest::BulkConfig;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(config).await {
        tracing::error!(target: "nft_ingest::main", "{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(target: "nft_ingest::main", "Starting NFT transfer ingestion");
    tracing::info!(target: "nft_ingest::main", "API URL: {}", config.api.api_url);
    tracing::info!(target: "nft_ingest::main", "Network: {}", config.api.network);

    let cancel = CancellationToken::new();
    let shutdown = nft_ingest::spawn_shutdown_listener(cancel.clone());

    let fetcher = HttpTransferFetcher::new(config.api.fetcher_config())
        .context("Failed to create API client")?;
    let retry_policy = config.api.retry_policy();

    let result = match config.mode {
        Mode::Bulk(args) => run_bulk(&fetcher, args, retry_policy, cancel).await,
        Mode::Stream(args) => {
            run_stream(&fetcher, &config.api.key, args, retry_policy, cancel).await
        }
    };

    shutdown.abort();
    result
}

async fn run_bulk(
    fetcher: &HttpTransferFetcher,
    args: BulkArgs,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!(target: "nft_ingest::main", "Block range: {}..={}", args.start, args.end);
    tracing::info!(target: "nft_ingest::main", "Batch size: {}", args.batch);
    tracing::info!(target: "nft_ingest::main", "Output: {}", args.output_dir.display());

    let bulk = BulkConfig::new(args.start, args.end)
        .with_batch_capacity(args.batch)
        .with_resume_cursor(args.cursor)
        .with_retry_policy(retry_policy);
    bulk.validate()?;

    let sink = FileSink::create(
        FileSinkConfig::new(&args.output_dir).with_compression(args.compression),
    )
    .await
    .with_context(|| format!("Failed to prepare {}", args.output_dir.display()))?;

    let report = nft_ingest::run_bulk(fetcher, sink, &bulk, cancel).await?;

    tracing::info!(
        target: "nft_ingest::main",
        "Done: {} transfers in {} files ({:?})",
        report.records_written,
        report.flushes,
        report.termination
    );
    Ok(())
}

async fn run_stream(
    fetcher: &HttpTransferFetcher,
    api_key: &str,
    args: StreamArgs,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
) -> Result<()> {
    let mut sink = topic_sink(&args)?;
    tracing::info!(target: "nft_ingest::main", "Topic: {}", args.topic);

    let chain = EthersChainClient::connect(&args.ws_url(api_key))
        .await
        .context("Failed to connect to the Ethereum node")?;
    let subscription = HeadSubscription::spawn(chain.provider(), args.head_buffer, cancel.child_token());

    let summary = nft_ingest::run_stream(
        fetcher,
        &chain,
        subscription,
        sink.as_mut(),
        &retry_policy,
        cancel,
    )
    .await?;

    tracing::info!(
        target: "nft_ingest::main",
        "Done: {} transfers from {} blocks",
        summary.transfers,
        summary.blocks
    );
    Ok(())
}

fn topic_sink(args: &StreamArgs) -> Result<Box<dyn Sink>> {
    match &args.broker_url {
        Some(brokers) => kafka_sink(brokers, args.auth_token.clone(), &args.topic),
        None => {
            tracing::info!(target: "nft_ingest::main", "No broker configured, publishing to stdout");
            Ok(Box::new(TopicSink::new(StdoutPublisher::stdout(), &args.topic)))
        }
    }
}

#[cfg(feature = "kafka")]
fn kafka_sink(brokers: &str, auth_token: Option<String>, topic: &str) -> Result<Box<dyn Sink>> {
    use nft_ingest::etl::sink::{KafkaConfig, KafkaPublisher};

    tracing::info!(target: "nft_ingest::main", "Broker: {}", brokers);
    let publisher = KafkaPublisher::new(&KafkaConfig::new(brokers).with_auth_token(auth_token))
        .context("Failed to connect to broker")?;
    Ok(Box::new(TopicSink::new(publisher, topic)))
}

#[cfg(not(feature = "kafka"))]
fn kafka_sink(_brokers: &str, _auth_token: Option<String>, _topic: &str) -> Result<Box<dyn Sink>> {
    anyhow::bail!("--broker-url requires a build with the `kafka` feature")
}
