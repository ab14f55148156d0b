//! In-process fan-out broker
//!
//! Used by tests and single-process deployments. Each subscription owns an
//! unbounded queue; publish copies the message into every live queue whose
//! binding matches. Messages published while nobody is subscribed are gone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::{subject_for, Acknowledge, Binding, Broker, BrokerError, Delivery, Subscription};

#[derive(Debug)]
struct Message {
    subject: String,
    payload: Vec<u8>,
}

struct Subscriber {
    binding: Binding,
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicUsize,
    delivered: AtomicUsize,
    acked: AtomicUsize,
}

/// Fan-out broker living in process memory
#[derive(Clone)]
pub struct MemoryBroker {
    subject_prefix: String,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    counters: Arc<Counters>,
}

impl MemoryBroker {
    pub fn new(subject_prefix: &str) -> Self {
        Self {
            subject_prefix: subject_prefix.to_string(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Messages accepted by `publish`
    pub fn published(&self) -> usize {
        self.counters.published.load(Ordering::SeqCst)
    }

    /// Copies handed to subscriptions
    pub fn delivered(&self) -> usize {
        self.counters.delivered.load(Ordering::SeqCst)
    }

    /// Copies acknowledged by consumers
    pub fn acked(&self) -> usize {
        self.counters.acked.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions
    pub async fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }

    /// End every open subscription; their `next()` returns `None` once drained
    pub async fn close_subscriptions(&self) {
        self.subscribers.lock().await.clear();
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish_bytes(&self, service_name: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let subject = subject_for(&self.subject_prefix, service_name);
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|s| !s.tx.is_closed());

        let mut copies = 0;
        for subscriber in subscribers.iter().filter(|s| s.binding.matches(service_name)) {
            let message = Message { subject: subject.clone(), payload: payload.clone() };
            if subscriber.tx.send(message).is_ok() {
                copies += 1;
            }
        }

        self.counters.published.fetch_add(1, Ordering::SeqCst);
        self.counters.delivered.fetch_add(copies, Ordering::SeqCst);
        debug!(subject = %subject, copies, "Published announcement");
        Ok(())
    }

    async fn subscribe(&self, binding: Binding) -> Result<Box<dyn Subscription>, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(Subscriber { binding, tx });

        Ok(Box::new(MemorySubscription { rx, counters: Arc::clone(&self.counters) }))
    }
}

struct MemorySubscription {
    rx: mpsc::UnboundedReceiver<Message>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Option<Result<Delivery, BrokerError>> {
        let message = self.rx.recv().await?;
        let acker = MemoryAck { counters: Arc::clone(&self.counters), done: false };
        Some(Ok(Delivery::new(message.subject, message.payload, Box::new(acker))))
    }
}

struct MemoryAck {
    counters: Arc<Counters>,
    done: bool,
}

#[async_trait]
impl Acknowledge for MemoryAck {
    async fn ack(&mut self) -> Result<(), BrokerError> {
        if !self.done {
            self.done = true;
            self.counters.acked.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::JobAnnouncement;
    use crate::platform::Platform;

    fn announcement(job_id: i64, service_name: &str) -> JobAnnouncement {
        JobAnnouncement { job_id, service_name: service_name.to_string(), direction_id: 1 }
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_a_copy() {
        let broker = MemoryBroker::new("scrape.jobs");
        let mut a = broker.subscribe(Binding::All).await.unwrap();
        let mut b = broker.subscribe(Binding::All).await.unwrap();

        broker.publish(&announcement(1, "vk")).await.unwrap();

        let da = a.next().await.unwrap().unwrap();
        let db = b.next().await.unwrap().unwrap();
        assert_eq!(da.subject, "scrape.jobs.vk");
        assert_eq!(da.payload, db.payload);
        assert_eq!(broker.published(), 1);
        assert_eq!(broker.delivered(), 2);
    }

    #[tokio::test]
    async fn test_platform_binding_filters_at_broker() {
        let broker = MemoryBroker::new("scrape.jobs");
        let mut tiktok = broker.subscribe(Binding::Platform(Platform::Tiktok)).await.unwrap();

        broker.publish(&announcement(1, "vk")).await.unwrap();
        broker.publish(&announcement(2, "tiktok")).await.unwrap();

        let delivery = tiktok.next().await.unwrap().unwrap();
        let received = JobAnnouncement::from_bytes(&delivery.payload).unwrap();
        assert_eq!(received.job_id, 2);
        assert_eq!(broker.delivered(), 1);
    }

    #[tokio::test]
    async fn test_ack_is_counted_once() {
        let broker = MemoryBroker::new("scrape.jobs");
        let mut sub = broker.subscribe(Binding::All).await.unwrap();
        broker.publish(&announcement(1, "vk")).await.unwrap();

        sub.next().await.unwrap().unwrap().ack().await.unwrap();
        assert_eq!(broker.acked(), 1);
    }

    #[tokio::test]
    async fn test_close_ends_subscription() {
        let broker = MemoryBroker::new("scrape.jobs");
        let mut sub = broker.subscribe(Binding::All).await.unwrap();

        broker.close_subscriptions().await;
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let broker = MemoryBroker::new("scrape.jobs");
        let sub = broker.subscribe(Binding::All).await.unwrap();
        assert_eq!(broker.subscriber_count().await, 1);

        drop(sub);
        assert_eq!(broker.subscriber_count().await, 0);
    }
}
