//! Broker consumption loop
//!
//! Runs on its own task next to the HTTP server. Announcements are handled
//! one at a time in delivery order; every delivery is acknowledged exactly
//! once after handling, including malformed payloads and panicked jobs.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use taspa_common::broker::{self, Binding, Broker, Delivery};
use taspa_common::config::BrokerConfig;
use taspa_common::events::JobAnnouncement;
use taspa_common::Platform;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::job_runner::{JobRunner, Outcome};

/// Delay between reconnect/resubscribe attempts
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Durable consumer name unique to one worker instance
///
/// JetStream splits a durable consumer's messages between its subscribers,
/// so two processes sharing a name would each see only part of the stream.
/// Characters NATS rejects in consumer names are replaced with `-`.
pub fn default_consumer_name(platform: Platform, host: Option<&str>, port: u16) -> String {
    let name = match host.map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) => format!("taspa-worker-{}-{}-{}", platform, host, port),
        None => format!("taspa-worker-{}-{}", platform, port),
    };
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

/// Counters of the consume loop
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    malformed: AtomicU64,
    discarded: AtomicU64,
    skipped: AtomicU64,
    finished: AtomicU64,
    failed: AtomicU64,
    stopped: AtomicU64,
    panicked: AtomicU64,
    acked: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub malformed: u64,
    pub discarded: u64,
    pub skipped: u64,
    pub finished: u64,
    pub failed: u64,
    pub stopped: u64,
    pub panicked: u64,
    pub acked: u64,
}

impl StatsSnapshot {
    /// Jobs this worker claimed, whatever their end state
    pub fn claimed(&self) -> u64 {
        self.finished + self.failed + self.stopped + self.panicked
    }
}

impl ConsumerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Discarded => &self.discarded,
            Outcome::NotClaimed => &self.skipped,
            Outcome::Finished => &self.finished,
            Outcome::Failed => &self.failed,
            Outcome::Stopped => &self.stopped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Consumer {
    broker: Arc<dyn Broker>,
    runner: Arc<JobRunner>,
    binding: Binding,
    stats: Arc<ConsumerStats>,
    retry_delay: Duration,
}

impl Consumer {
    pub fn new(
        broker: Arc<dyn Broker>,
        runner: Arc<JobRunner>,
        binding: Binding,
        stats: Arc<ConsumerStats>,
    ) -> Self {
        Self { broker, runner, binding, stats, retry_delay: RETRY_DELAY }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Consume until cancelled, resubscribing whenever the subscription fails
    pub async fn run(&self, cancel: CancellationToken) {
        let platform = self.runner.platform();

        while !cancel.is_cancelled() {
            let mut subscription = match self.broker.subscribe(self.binding).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!(
                        platform = %platform,
                        "Subscribe failed, retrying in {:?}: {}", self.retry_delay, e
                    );
                    if !pause(&cancel, self.retry_delay).await {
                        break;
                    }
                    continue;
                }
            };
            info!(platform = %platform, binding = ?self.binding, "Subscribed to job announcements");

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = subscription.next() => next,
                };

                match next {
                    Some(Ok(delivery)) => self.process(delivery).await,
                    Some(Err(e)) => {
                        warn!(platform = %platform, "Receive failed: {}", e);
                        if !pause(&cancel, self.retry_delay).await {
                            break;
                        }
                    }
                    None => {
                        warn!(platform = %platform, "Subscription ended, resubscribing");
                        break;
                    }
                }
            }
        }

        info!(platform = %platform, "Consumer stopped");
    }

    /// Handle one delivery, then acknowledge it
    pub async fn process(&self, delivery: Delivery) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        match JobAnnouncement::from_bytes(&delivery.payload) {
            Ok(announcement) => self.dispatch(&announcement).await,
            Err(e) => {
                warn!(subject = %delivery.subject, "Discarding malformed announcement: {}", e);
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
            }
        }

        match delivery.ack().await {
            Ok(()) => {
                self.stats.acked.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => error!("Failed to acknowledge announcement: {}", e),
        }
    }

    async fn dispatch(&self, announcement: &JobAnnouncement) {
        let job_id = announcement.job_id;
        debug!(job_id, service_name = %announcement.service_name, "Announcement received");

        match AssertUnwindSafe(self.runner.handle(announcement)).catch_unwind().await {
            Ok(outcome) => self.stats.record(outcome),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(job_id, "Job processing panicked: {}", reason);
                self.stats.panicked.fetch_add(1, Ordering::Relaxed);

                let abort = AssertUnwindSafe(self.runner.abort(job_id, &reason)).catch_unwind();
                if abort.await.is_err() {
                    error!(job_id, "Recording the panicked job failed as well");
                }
            }
        }
    }
}

/// Connect the broker, retrying until it succeeds or `cancel` fires
pub async fn connect_with_retry(
    config: &BrokerConfig,
    consumer_name: &str,
    cancel: &CancellationToken,
) -> Option<Arc<dyn Broker>> {
    loop {
        match broker::connect(config, Some(consumer_name.to_string())).await {
            Ok(broker) => {
                info!(url = %config.url, consumer = consumer_name, "Broker connected");
                return Some(broker);
            }
            Err(e) => {
                warn!(
                    url = %config.url,
                    "Broker connection failed, retrying in {:?}: {}", RETRY_DELAY, e
                );
                if !pause(cancel, RETRY_DELAY).await {
                    return None;
                }
            }
        }
    }
}

/// Sleep for `delay`; false if cancelled first
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
