//! Job announcement broker
//!
//! A fan-out topic: every subscription bound when a message is published gets
//! its own copy, and each copy must be acknowledged exactly once. Backends
//! are selected at runtime from the broker URL (`memory` or `nats://...`).
//!
//! ```text
//! orchestrator ──publish──▶ <prefix>.<service_name> ──┬──▶ worker (vk)
//!                                                     ├──▶ worker (instagram)
//!                                                     └──▶ worker (tiktok)
//! ```

mod memory;
mod nats;

pub use memory::MemoryBroker;
pub use nats::NatsBroker;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::BrokerConfig;
use crate::events::JobAnnouncement;
use crate::platform::Platform;

/// Broker transport errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection failed: {0}")]
    Connect(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Ack failed: {0}")]
    Ack(String),

    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Unsupported broker URL: {0}")]
    UnsupportedUrl(String),
}

/// Which announcements a subscription receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Every announcement; the consumer filters by `service_name`
    All,
    /// Only announcements for one platform (broker-side routing)
    Platform(Platform),
}

impl Binding {
    pub fn matches(&self, service_name: &str) -> bool {
        match self {
            Binding::All => true,
            Binding::Platform(platform) => platform.as_str() == service_name,
        }
    }
}

/// Publish side of the broker
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish raw bytes on the subject of `service_name`
    async fn publish_bytes(&self, service_name: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Open a new subscription; only messages published afterwards are delivered
    async fn subscribe(&self, binding: Binding) -> Result<Box<dyn Subscription>, BrokerError>;

    /// Publish one job announcement, returning once the broker accepted it
    async fn publish(&self, announcement: &JobAnnouncement) -> Result<(), BrokerError> {
        let payload = announcement.to_bytes()?;
        self.publish_bytes(&announcement.service_name, payload).await
    }
}

/// Stream of deliveries for one subscriber
#[async_trait]
pub trait Subscription: Send {
    /// Next delivery, or `None` once the subscription has ended
    async fn next(&mut self) -> Option<Result<Delivery, BrokerError>>;
}

/// Backend-specific acknowledgement handle
#[async_trait]
pub trait Acknowledge: Send {
    async fn ack(&mut self) -> Result<(), BrokerError>;
}

/// One received message
pub struct Delivery {
    pub subject: String,
    pub payload: Vec<u8>,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(subject: String, payload: Vec<u8>, acker: Box<dyn Acknowledge>) -> Self {
        Self { subject, payload, acker }
    }

    /// Acknowledge the message; consumes the delivery so it can only happen once
    pub async fn ack(mut self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Subject an announcement for `service_name` is published on
pub fn subject_for(prefix: &str, service_name: &str) -> String {
    format!("{}.{}", prefix, service_name)
}

/// Connect the backend named by `config.url`
///
/// `consumer_name` names the durable consumer for subscribing processes;
/// publishers pass `None`.
pub async fn connect(
    config: &BrokerConfig,
    consumer_name: Option<String>,
) -> Result<Arc<dyn Broker>, BrokerError> {
    if config.url == "memory" {
        return Ok(Arc::new(MemoryBroker::new(&config.subject_prefix)));
    }

    if config.url.starts_with("nats://") || config.url.starts_with("tls://") {
        let broker = NatsBroker::connect(config, consumer_name).await?;
        return Ok(Arc::new(broker));
    }

    Err(BrokerError::UnsupportedUrl(config.url.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_matches() {
        assert!(Binding::All.matches("vk"));
        assert!(Binding::All.matches("anything"));
        assert!(Binding::Platform(Platform::Vk).matches("vk"));
        assert!(!Binding::Platform(Platform::Vk).matches("tiktok"));
    }

    #[test]
    fn test_subject_for() {
        assert_eq!(subject_for("scrape.jobs", "tiktok"), "scrape.jobs.tiktok");
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let config = BrokerConfig {
            url: "amqp://localhost".to_string(),
            ..BrokerConfig::default()
        };
        let err = connect(&config, None).await.err().unwrap();
        assert!(matches!(err, BrokerError::UnsupportedUrl(_)));
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let config = BrokerConfig {
            url: "memory".to_string(),
            ..BrokerConfig::default()
        };
        assert!(connect(&config, None).await.is_ok());
    }
}
