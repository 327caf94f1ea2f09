pub mod file;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod topic;

use async_trait::async_trait;

use crate::etl::error::SinkError;
use crate::etl::paginator::TransferConsumer;
use crate::etl::transfer::Transfer;

pub use file::{Compression, FileSink, FileSinkConfig};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaPublisher};
pub use topic::{JsonLinesPublisher, Message, Publisher, StdoutPublisher, TopicSink};

/// Append-only destination for transfers.
///
/// Sinks are owned exclusively by one pipeline run, so they take `&mut self`
/// and need no interior locking. Any error is terminal for the run.
#[async_trait]
pub trait Sink: Send {
    /// Name used in progress lines
    fn name(&self) -> &str;

    /// Appends the transfers, in order.
    async fn write(&mut self, transfers: &[Transfer]) -> Result<(), SinkError>;

    /// Makes everything written so far durable or delivered.
    ///
    /// Sinks that persist synchronously in `write` keep the default.
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn write(&mut self, transfers: &[Transfer]) -> Result<(), SinkError> {
        (**self).write(transfers).await
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush().await
    }
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for &mut S {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn write(&mut self, transfers: &[Transfer]) -> Result<(), SinkError> {
        (**self).write(transfers).await
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush().await
    }
}

/// Forwards every page straight to a sink: one write and one flush per page.
///
/// Used by stream mode, where pages are small and go out as soon as they
/// arrive.
pub struct PageForwarder<'a, S: ?Sized> {
    sink: &'a mut S,
}

impl<'a, S: Sink + ?Sized> PageForwarder<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl<S: Sink + ?Sized> TransferConsumer for PageForwarder<'_, S> {
    async fn consume(&mut self, transfers: Vec<Transfer>) -> Result<(), SinkError> {
        self.sink.write(&transfers).await?;
        self.sink.flush().await?;
        Ok(())
    }
}
