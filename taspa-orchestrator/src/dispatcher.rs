//! Job dispatch
//!
//! A job row is committed before its announcement is published. If the
//! publish fails the row is deleted again, so a `queued` job always has an
//! announcement and an announcement always has a job.

use sqlx::SqlitePool;
use taspa_common::broker::{Broker, BrokerError};
use taspa_common::db::{directions, jobs, Job};
use taspa_common::events::JobAnnouncement;
use taspa_common::Platform;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Direction not found: {0}")]
    UnknownDirection(i64),

    #[error("Job announcement could not be published: {0}")]
    Publish(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] taspa_common::Error),
}

/// Persist a `queued` job and announce it to the workers
pub async fn create_job(
    db: &SqlitePool,
    broker: &dyn Broker,
    platform: Platform,
    direction_id: i64,
) -> Result<Job, DispatchError> {
    if !directions::direction_exists(db, direction_id).await? {
        return Err(DispatchError::UnknownDirection(direction_id));
    }

    let job = jobs::insert_job(db, platform, direction_id).await?;

    let announcement = JobAnnouncement {
        job_id: job.id,
        service_name: job.service_name.clone(),
        direction_id,
    };

    if let Err(e) = broker.publish(&announcement).await {
        warn!(job_id = job.id, "Publish failed, removing job: {}", e);
        if let Err(delete_err) = jobs::delete_job(db, job.id).await {
            error!(job_id = job.id, "Failed to remove unannounced job: {}", delete_err);
        }
        return Err(DispatchError::Publish(e));
    }

    info!(job_id = job.id, platform = %platform, direction_id, "Job queued");
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use taspa_common::broker::{Binding, MemoryBroker, Subscription};
    use taspa_common::db::{directions::create_direction, open_in_memory, JobStatus};

    struct DownBroker;

    #[async_trait]
    impl Broker for DownBroker {
        async fn publish_bytes(&self, _: &str, _: Vec<u8>) -> Result<(), BrokerError> {
            Err(BrokerError::Publish("connection refused".to_string()))
        }

        async fn subscribe(&self, _: Binding) -> Result<Box<dyn Subscription>, BrokerError> {
            Err(BrokerError::Subscribe("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_create_publishes_once() {
        let db = open_in_memory().await.unwrap();
        let direction = create_direction(&db, "d").await.unwrap();
        let broker = MemoryBroker::new("scrape.jobs");
        let mut sub = broker.subscribe(Binding::All).await.unwrap();

        let job = create_job(&db, &broker, Platform::Vk, direction).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(broker.published(), 1);

        let delivery = sub.next().await.unwrap().unwrap();
        let announcement = JobAnnouncement::from_bytes(&delivery.payload).unwrap();
        assert_eq!(announcement.job_id, job.id);
        assert_eq!(announcement.service_name, "vk");
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_no_job() {
        let db = open_in_memory().await.unwrap();
        let direction = create_direction(&db, "d").await.unwrap();

        let err = create_job(&db, &DownBroker, Platform::Tiktok, direction).await.unwrap_err();
        assert!(matches!(err, DispatchError::Publish(_)));
        assert!(jobs::list_jobs(&db, 200).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_direction_publishes_nothing() {
        let db = open_in_memory().await.unwrap();
        let broker = MemoryBroker::new("scrape.jobs");

        let err = create_job(&db, &broker, Platform::Vk, 404).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownDirection(404)));
        assert_eq!(broker.published(), 0);
    }
}
