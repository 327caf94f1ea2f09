//! File sink: one new Parquet file per write.
//!
//! Each batch becomes a file named `{prefix}_{unix_millis}_{sequence:06}.parquet`
//! holding a single row group. The file is written under a `.tmp` name and
//! renamed into place, so a reader never observes a half-written batch.

use arrow::array::{ArrayRef, StringArray, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parquet::arrow::ArrowWriter;
use parquet::basic::ZstdLevel;
use parquet::file::properties::WriterProperties;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use super::Sink;
use crate::etl::error::SinkError;
use crate::etl::transfer::Transfer;

pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Column codec for the written files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    None,
    #[default]
    Snappy,
    Zstd {
        level: i32,
    },
}

impl Compression {
    fn codec(self) -> Result<parquet::basic::Compression, SinkError> {
        Ok(match self {
            Self::None => parquet::basic::Compression::UNCOMPRESSED,
            Self::Snappy => parquet::basic::Compression::SNAPPY,
            Self::Zstd { level } => parquet::basic::Compression::ZSTD(ZstdLevel::try_new(level)?),
        })
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Ok(Self::None),
            "snappy" => Ok(Self::Snappy),
            "zstd" => Ok(Self::Zstd {
                level: DEFAULT_ZSTD_LEVEL,
            }),
            other => Err(format!(
                "unknown compression '{other}' (expected none, snappy or zstd)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub compression: Compression,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: "transfers".to_string(),
            compression: Compression::default(),
        }
    }
}

impl FileSinkConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// Arrow schema of a transfer row. Every field except the timestamp stays
/// the string the API returned.
pub fn transfer_schema() -> SchemaRef {
    let utf8 = |name: &str| Field::new(name, DataType::Utf8, false);

    Arc::new(Schema::new(vec![
        utf8("token_address"),
        utf8("token_id"),
        utf8("from_address"),
        utf8("to_address"),
        utf8("contract_type"),
        utf8("price"),
        utf8("quantity"),
        utf8("block_number"),
        Field::new(
            "block_timestamp",
            DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into())),
            false,
        ),
        utf8("block_hash"),
        utf8("transaction_hash"),
        utf8("transaction_type"),
    ]))
}

fn utf8_column(transfers: &[Transfer], field: fn(&Transfer) -> &str) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(transfers.iter().map(field)))
}

fn to_record_batch(schema: &SchemaRef, transfers: &[Transfer]) -> Result<RecordBatch, SinkError> {
    let timestamps = transfers
        .iter()
        .map(|t| {
            t.block_timestamp.timestamp_nanos_opt().ok_or_else(|| {
                ArrowError::InvalidArgumentError(format!(
                    "block timestamp {} out of range",
                    t.block_timestamp
                ))
            })
        })
        .collect::<Result<Vec<i64>, _>>()?;

    let columns: Vec<ArrayRef> = vec![
        utf8_column(transfers, |t| t.token_address.as_str()),
        utf8_column(transfers, |t| t.token_id.as_str()),
        utf8_column(transfers, |t| t.from_address.as_str()),
        utf8_column(transfers, |t| t.to_address.as_str()),
        utf8_column(transfers, |t| t.contract_type.as_str()),
        utf8_column(transfers, |t| t.price.as_str()),
        utf8_column(transfers, |t| t.quantity.as_str()),
        utf8_column(transfers, |t| t.block_number.as_str()),
        Arc::new(TimestampNanosecondArray::from(timestamps).with_timezone("UTC")),
        utf8_column(transfers, |t| t.block_hash.as_str()),
        utf8_column(transfers, |t| t.transaction_hash.as_str()),
        utf8_column(transfers, |t| t.transaction_type.as_str()),
    ];

    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

pub struct FileSink {
    config: FileSinkConfig,
    schema: SchemaRef,
    properties: WriterProperties,
    sequence: u64,
    written: Vec<PathBuf>,
}

impl FileSink {
    /// Creates the output directory if needed.
    pub async fn create(config: FileSinkConfig) -> Result<Self, SinkError> {
        let properties = WriterProperties::builder()
            .set_compression(config.compression.codec()?)
            .build();

        tokio::fs::create_dir_all(&config.output_dir).await?;

        tracing::debug!(
            target: "nft_ingest::etl::sink::file",
            output_dir = %config.output_dir.display(),
            compression = ?config.compression,
            "File sink ready"
        );

        Ok(Self {
            config,
            schema: transfer_schema(),
            properties,
            sequence: 0,
            written: Vec::new(),
        })
    }

    /// Files produced so far, in write order.
    pub fn written_files(&self) -> &[PathBuf] {
        &self.written
    }

    fn next_path(&mut self) -> PathBuf {
        self.sequence += 1;
        let name = format!(
            "{}_{}_{:06}.parquet",
            self.config.file_prefix,
            chrono::Utc::now().timestamp_millis(),
            self.sequence
        );
        self.config.output_dir.join(name)
    }

    fn encode(&self, transfers: &[Transfer]) -> Result<Vec<u8>, SinkError> {
        let batch = to_record_batch(&self.schema, transfers)?;

        let mut buf = Vec::new();
        let mut writer =
            ArrowWriter::try_new(&mut buf, self.schema.clone(), Some(self.properties.clone()))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(buf)
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn write(&mut self, transfers: &[Transfer]) -> Result<(), SinkError> {
        let data = self.encode(transfers)?;

        let path = self.next_path();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(
            target: "nft_ingest::etl::sink::file",
            path = %path.display(),
            records = transfers.len(),
            bytes = data.len(),
            "Persisted batch"
        );

        self.written.push(path);
        Ok(())
    }
}
