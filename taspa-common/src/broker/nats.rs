//! NATS JetStream backend
//!
//! Announcements are stored in an interest-retention stream covering
//! `<prefix>.>`: a message stays until every consumer that existed when it
//! was published has acked it. Every worker sees every announcement it is
//! bound to as long as each process uses a distinct durable name (or none,
//! for an ephemeral consumer). Processes sharing a durable name split the
//! messages between them instead.

use async_nats::jetstream::{self, consumer, stream};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::info;

use super::{subject_for, Acknowledge, Binding, Broker, BrokerError, Delivery, Subscription};
use crate::config::BrokerConfig;

pub struct NatsBroker {
    js: jetstream::Context,
    stream_name: String,
    subject_prefix: String,
    consumer_name: Option<String>,
}

impl NatsBroker {
    /// Connect and make sure the announcement stream exists
    pub async fn connect(
        config: &BrokerConfig,
        consumer_name: Option<String>,
    ) -> Result<Self, BrokerError> {
        let client = async_nats::connect(config.url.as_str())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let js = jetstream::new(client);

        let stream_config = stream::Config {
            name: config.stream.clone(),
            subjects: vec![format!("{}.>", config.subject_prefix)],
            retention: stream::RetentionPolicy::Interest,
            ..Default::default()
        };
        js.get_or_create_stream(stream_config)
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        info!("JetStream stream '{}' ready at {}", config.stream, config.url);

        Ok(Self {
            js,
            stream_name: config.stream.clone(),
            subject_prefix: config.subject_prefix.clone(),
            consumer_name,
        })
    }

    fn filter_subject(&self, binding: Binding) -> String {
        match binding {
            Binding::All => format!("{}.>", self.subject_prefix),
            Binding::Platform(platform) => subject_for(&self.subject_prefix, platform.as_str()),
        }
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish_bytes(&self, service_name: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let subject = subject_for(&self.subject_prefix, service_name);

        // Second await waits for the stream's publish ack
        self.js
            .publish(subject, payload.into())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&self, binding: Binding) -> Result<Box<dyn Subscription>, BrokerError> {
        let stream = self
            .js
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        let consumer_config = consumer::pull::Config {
            durable_name: self.consumer_name.clone(),
            filter_subject: self.filter_subject(binding),
            ack_policy: consumer::AckPolicy::Explicit,
            deliver_policy: consumer::DeliverPolicy::New,
            ..Default::default()
        };

        let consumer = match &self.consumer_name {
            Some(name) => stream.get_or_create_consumer(name, consumer_config).await,
            None => stream.create_consumer(consumer_config).await,
        }
        .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        info!(
            consumer = ?self.consumer_name,
            filter = %self.filter_subject(binding),
            "JetStream consumer ready"
        );
        Ok(Box::new(NatsSubscription { messages }))
    }
}

struct NatsSubscription {
    messages: consumer::pull::Stream,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next(&mut self) -> Option<Result<Delivery, BrokerError>> {
        let message = match self.messages.next().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(BrokerError::Receive(e.to_string()))),
        };

        let subject = message.subject.to_string();
        let payload = message.payload.to_vec();
        Some(Ok(Delivery::new(subject, payload, Box::new(NatsAck { message: Some(message) }))))
    }
}

struct NatsAck {
    message: Option<jetstream::Message>,
}

#[async_trait]
impl Acknowledge for NatsAck {
    async fn ack(&mut self) -> Result<(), BrokerError> {
        match self.message.take() {
            Some(message) => message.ack().await.map_err(|e| BrokerError::Ack(e.to_string())),
            None => Ok(()),
        }
    }
}
