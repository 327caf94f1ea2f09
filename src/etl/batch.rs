//! Bounded batching in front of a sink.
//!
//! The batch never holds `capacity` records for longer than the flush that
//! empties it. A flush hands the whole batch to the sink and clears it, even
//! when the sink fails: there is no staging area, so a failed flush loses
//! the in-flight batch and the run must stop.

use async_trait::async_trait;

use crate::etl::error::{PipelineError, SinkError};
use crate::etl::paginator::TransferConsumer;
use crate::etl::sink::Sink;
use crate::etl::transfer::Transfer;

/// Upper bound for the up-front allocation; large capacities grow on demand.
const MAX_PREALLOCATED: usize = 1 << 16;

pub struct BatchAccumulator<S> {
    sink: S,
    capacity: usize,
    batch: Vec<Transfer>,
    flushes: u64,
    records_written: u64,
}

impl<S: Sink> BatchAccumulator<S> {
    pub fn new(sink: S, capacity: usize) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::Config(
                "batch capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            sink,
            capacity,
            batch: Vec::with_capacity(capacity.min(MAX_PREALLOCATED)),
            flushes: 0,
            records_written: 0,
        })
    }

    /// Appends one record, flushing synchronously if the batch became full.
    pub async fn offer(&mut self, transfer: Transfer) -> Result<(), SinkError> {
        self.batch.push(transfer);
        self.flush_if_full().await?;
        Ok(())
    }

    /// Flushes when the batch reached capacity. Returns whether it flushed.
    pub async fn flush_if_full(&mut self) -> Result<bool, SinkError> {
        if self.batch.len() < self.capacity {
            return Ok(false);
        }

        self.flush().await?;
        Ok(true)
    }

    /// Flushes a partial trailing batch. No-op when nothing is buffered, so
    /// calling it twice writes at most once.
    pub async fn flush_remainder(&mut self) -> Result<usize, SinkError> {
        if self.batch.is_empty() {
            return Ok(0);
        }

        self.flush().await
    }

    async fn flush(&mut self) -> Result<usize, SinkError> {
        let next = Vec::with_capacity(self.capacity.min(MAX_PREALLOCATED));
        let batch = std::mem::replace(&mut self.batch, next);
        let count = batch.len();

        self.sink.write(&batch).await?;
        self.sink.flush().await?;

        self.flushes += 1;
        self.records_written += count as u64;

        tracing::info!(
            target: "nft_ingest::etl::batch",
            "Wrote batch of {} transfers to {}",
            count,
            self.sink.name()
        );

        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Number of successful flushes so far.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[async_trait]
impl<S: Sink> TransferConsumer for BatchAccumulator<S> {
    async fn consume(&mut self, transfers: Vec<Transfer>) -> Result<(), SinkError> {
        for transfer in transfers {
            self.offer(transfer).await?;
        }
        Ok(())
    }
}
