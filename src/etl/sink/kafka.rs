//! Kafka publisher (feature `kafka`).

use async_trait::async_trait;
use futures::future::join_all;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord};
use std::time::Duration;

use super::topic::{Message, Publisher};
use crate::etl::error::SinkError;

/// SASL username paired with a bearer-style auth token.
const TOKEN_USERNAME: &str = "token";

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated `host:port` list
    pub brokers: String,

    /// Sent as the SASL/PLAIN password when present
    pub auth_token: Option<String>,

    pub delivery_timeout: Duration,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            auth_token: None,
            delivery_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }
}

/// Publishes through an rdkafka `FutureProducer`.
///
/// `send` enqueues and keeps the delivery future; `flush` awaits every
/// pending delivery and fails on the first rejected message.
pub struct KafkaPublisher {
    producer: FutureProducer,
    pending: Vec<DeliveryFuture>,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self, SinkError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("acks", "all")
            .set(
                "message.timeout.ms",
                config.delivery_timeout.as_millis().to_string(),
            );

        if let Some(token) = &config.auth_token {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", TOKEN_USERNAME)
                .set("sasl.password", token);
        }

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| SinkError::Publish(format!("failed to create Kafka producer: {e}")))?;

        tracing::info!(
            target: "nft_ingest::etl::sink::kafka",
            brokers = %config.brokers,
            authenticated = config.auth_token.is_some(),
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            pending: Vec::new(),
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn send(&mut self, topic: &str, message: Message) -> Result<(), SinkError> {
        let record = FutureRecord::to(topic)
            .key(&message.key)
            .payload(&message.payload)
            .timestamp(message.event_time.timestamp_millis());

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| SinkError::Publish(e.to_string()))?;
        self.pending.push(delivery);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();

        for result in join_all(pending).await {
            match result {
                Ok(Ok(_)) => {}
                Ok(Err((e, _))) => return Err(SinkError::Publish(e.to_string())),
                Err(_) => {
                    return Err(SinkError::Publish(
                        "delivery report dropped by producer".to_string(),
                    ))
                }
            }
        }

        tracing::debug!(
            target: "nft_ingest::etl::sink::kafka",
            delivered = count,
            "Kafka deliveries confirmed"
        );
        Ok(())
    }
}
