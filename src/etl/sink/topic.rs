//! Topic sink: one message per transfer on a pub/sub topic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use std::io::Write;

use super::Sink;
use crate::etl::error::SinkError;
use crate::etl::transfer::Transfer;

pub const DEFAULT_TOPIC: &str = "nft-transfers";

/// A single message ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: String,
    pub payload: Vec<u8>,
    pub event_time: DateTime<Utc>,
}

impl Message {
    pub fn from_transfer(transfer: &Transfer) -> Result<Self, SinkError> {
        Ok(Self {
            key: transfer.dedup_key(),
            payload: serde_json::to_vec(transfer)?,
            event_time: transfer.block_timestamp,
        })
    }
}

/// Message-bus client used by [`TopicSink`].
///
/// `send` may buffer; `flush` returns only once everything sent before it has
/// been delivered.
#[async_trait]
pub trait Publisher: Send {
    async fn send(&mut self, topic: &str, message: Message) -> Result<(), SinkError>;

    async fn flush(&mut self) -> Result<(), SinkError>;
}

pub struct TopicSink<P> {
    publisher: P,
    topic: String,
    published: u64,
}

impl<P: Publisher> TopicSink<P> {
    pub fn new(publisher: P, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            published: 0,
        }
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

#[async_trait]
impl<P: Publisher> Sink for TopicSink<P> {
    fn name(&self) -> &str {
        &self.topic
    }

    async fn write(&mut self, transfers: &[Transfer]) -> Result<(), SinkError> {
        for transfer in transfers {
            let message = Message::from_transfer(transfer)?;
            self.publisher.send(&self.topic, message).await?;
            self.published += 1;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.publisher.flush().await?;

        tracing::debug!(
            target: "nft_ingest::etl::sink::topic",
            topic = %self.topic,
            published = self.published,
            "Publisher flushed"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct Line<'a> {
    topic: &'a str,
    key: &'a str,
    event_time: DateTime<Utc>,
    payload: &'a RawValue,
}

/// Writes each message as one JSON line. Used for dry runs without a broker.
pub struct JsonLinesPublisher<W> {
    writer: W,
}

pub type StdoutPublisher = JsonLinesPublisher<std::io::Stdout>;

impl JsonLinesPublisher<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> Publisher for JsonLinesPublisher<W> {
    async fn send(&mut self, topic: &str, message: Message) -> Result<(), SinkError> {
        let line = Line {
            topic,
            key: &message.key,
            event_time: message.event_time,
            payload: serde_json::from_slice(&message.payload)?,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}
