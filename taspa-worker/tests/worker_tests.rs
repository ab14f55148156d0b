//! Worker consumer tests against the in-memory broker and database

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use taspa_common::api::PlatformConfig;
use taspa_common::broker::{Binding, Broker, MemoryBroker};
use taspa_common::db::{directions, jobs, open_in_memory, JobStatus};
use taspa_common::events::{JobAnnouncement, LogEvent};
use taspa_common::Platform;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use taspa_worker::{
    build_router, AppState, ConfigSource, Consumer, ConsumerStats, JobRunner, Outcome,
    ProgressSink,
};

/// Records every event; optionally stops the job when a message matches
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
    stop_on: Option<(SqlitePool, &'static str)>,
}

impl RecordingSink {
    fn stopping(pool: SqlitePool, trigger: &'static str) -> Self {
        Self { events: Mutex::new(Vec::new()), stop_on: Some((pool, trigger)) }
    }

    fn messages(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.message.clone()).collect()
    }

    fn levels(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.level.clone()).collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn send(&self, event: LogEvent) {
        if let Some((pool, trigger)) = &self.stop_on {
            if event.message.contains(trigger) {
                jobs::stop_job(pool, event.job_id).await.unwrap();
            }
        }
        self.events.lock().unwrap().push(event);
    }
}

enum FakeConfig {
    Unavailable,
    Fixed(PlatformConfig),
    Panics,
}

#[async_trait]
impl ConfigSource for FakeConfig {
    async fn fetch(&self, _platform: Platform) -> Option<PlatformConfig> {
        match self {
            FakeConfig::Unavailable => None,
            FakeConfig::Fixed(config) => Some(config.clone()),
            FakeConfig::Panics => panic!("config source exploded"),
        }
    }
}

struct Fixture {
    db: SqlitePool,
    direction: i64,
    sink: Arc<RecordingSink>,
    runner: Arc<JobRunner>,
}

impl Fixture {
    async fn new(platform: Platform, sources: usize) -> Self {
        let db = open_in_memory().await.unwrap();
        Self::with_sink(platform, sources, db, None, FakeConfig::Unavailable).await
    }

    async fn with_sink(
        platform: Platform,
        sources: usize,
        db: SqlitePool,
        sink: Option<RecordingSink>,
        config: FakeConfig,
    ) -> Self {
        let direction = directions::create_direction(&db, "education").await.unwrap();
        for i in 0..sources {
            directions::add_source(&db, direction, platform.source_type(), &format!("src{}", i))
                .await
                .unwrap();
        }

        let sink = Arc::new(sink.unwrap_or_default());
        let runner = Arc::new(JobRunner::new(
            db.clone(),
            platform,
            sink.clone(),
            Arc::new(config),
        ));

        Self { db, direction, sink, runner }
    }

    async fn job(&self, platform: Platform) -> JobAnnouncement {
        let job = jobs::insert_job(&self.db, platform, self.direction).await.unwrap();
        JobAnnouncement {
            job_id: job.id,
            service_name: job.service_name,
            direction_id: job.direction_id,
        }
    }

    async fn status(&self, job_id: i64) -> JobStatus {
        jobs::job_status(&self.db, job_id).await.unwrap().unwrap()
    }

    async fn parent_count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.db)
            .await
            .unwrap()
    }
}

async fn wait_for_subscriber(broker: &MemoryBroker) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.subscriber_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

async fn wait_for_acks(stats: &ConsumerStats, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while stats.snapshot().acked < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_claims_own_platform_and_acks_everything() {
    let fixture = Fixture::new(Platform::Vk, 3).await;
    let broker = MemoryBroker::new("scrape.jobs");
    let stats = Arc::new(ConsumerStats::default());
    let consumer = Consumer::new(
        Arc::new(broker.clone()),
        fixture.runner.clone(),
        Binding::All,
        stats.clone(),
    );
    let mut subscription = broker.subscribe(Binding::All).await.unwrap();

    let mut vk_jobs = Vec::new();
    let mut other_jobs = Vec::new();
    let stream = [
        Platform::Vk,
        Platform::Tiktok,
        Platform::Vk,
        Platform::Instagram,
        Platform::Vk,
    ];
    for platform in stream {
        let announcement = fixture.job(platform).await;
        broker.publish(&announcement).await.unwrap();
        if platform == Platform::Vk {
            vk_jobs.push(announcement.job_id);
        } else {
            other_jobs.push(announcement.job_id);
        }
    }
    broker.publish_bytes("vk", b"not an announcement".to_vec()).await.unwrap();

    for _ in 0..6 {
        let delivery = subscription.next().await.unwrap().unwrap();
        consumer.process(delivery).await;
    }

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.received, 6);
    assert_eq!(snapshot.claimed(), 3);
    assert_eq!(snapshot.finished, 3);
    assert_eq!(snapshot.discarded, 2);
    assert_eq!(snapshot.malformed, 1);
    assert_eq!(snapshot.acked, 6);
    assert_eq!(broker.acked(), 6);

    for id in vk_jobs {
        assert_eq!(fixture.status(id).await, JobStatus::Finished);
    }
    for id in other_jobs {
        assert_eq!(fixture.status(id).await, JobStatus::Queued);
    }
}

#[tokio::test]
async fn test_run_loop_consumes_until_cancelled() {
    let fixture = Fixture::new(Platform::Instagram, 1).await;
    let broker = MemoryBroker::new("scrape.jobs");
    let stats = Arc::new(ConsumerStats::default());
    let consumer = Arc::new(
        Consumer::new(
            Arc::new(broker.clone()),
            fixture.runner.clone(),
            Binding::Platform(Platform::Instagram),
            stats.clone(),
        )
        .with_retry_delay(Duration::from_millis(10)),
    );

    let cancel = CancellationToken::new();
    let task = {
        let consumer = consumer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { consumer.run(cancel).await })
    };

    wait_for_subscriber(&broker).await;

    let own = fixture.job(Platform::Instagram).await;
    let other = fixture.job(Platform::Vk).await;
    broker.publish(&own).await.unwrap();
    broker.publish(&other).await.unwrap();

    wait_for_acks(&stats, 1).await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    // Platform binding: the vk announcement never reached this consumer
    assert_eq!(stats.snapshot().received, 1);
    assert_eq!(fixture.status(own.job_id).await, JobStatus::Finished);
    assert_eq!(fixture.status(other.job_id).await, JobStatus::Queued);
}

#[tokio::test]
async fn test_resubscribes_after_subscription_ends() {
    let fixture = Fixture::new(Platform::Vk, 0).await;
    let broker = MemoryBroker::new("scrape.jobs");
    let stats = Arc::new(ConsumerStats::default());
    let consumer = Arc::new(
        Consumer::new(Arc::new(broker.clone()), fixture.runner.clone(), Binding::All, stats.clone())
            .with_retry_delay(Duration::from_millis(10)),
    );

    let cancel = CancellationToken::new();
    let task = {
        let consumer = consumer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { consumer.run(cancel).await })
    };

    wait_for_subscriber(&broker).await;
    broker.close_subscriptions().await;
    wait_for_subscriber(&broker).await;

    let announcement = fixture.job(Platform::Vk).await;
    broker.publish(&announcement).await.unwrap();

    wait_for_acks(&stats, 1).await;

    cancel.cancel();
    task.await.unwrap();
    assert_eq!(fixture.status(announcement.job_id).await, JobStatus::Finished);
}

#[tokio::test]
async fn test_progress_every_ten_sources_and_at_end() {
    let fixture = Fixture::new(Platform::Vk, 25).await;
    let announcement = fixture.job(Platform::Vk).await;

    assert_eq!(fixture.runner.handle(&announcement).await, Outcome::Finished);

    assert_eq!(
        fixture.sink.messages(),
        vec![
            "VK scrape started",
            "VK sources loaded: 25",
            "VK sources processed: 10",
            "VK sources processed: 20",
            "VK sources processed: 25",
            "VK scrape finished",
        ]
    );
    assert_eq!(fixture.parent_count("vk_groups").await, 25);

    let job = jobs::get_job(&fixture.db, announcement.job_id).await.unwrap().unwrap();
    assert!(job.started_at.is_some());
    assert!(job.finished_at.is_some());
}

#[tokio::test]
async fn test_parent_registration_is_idempotent_across_jobs() {
    let fixture = Fixture::new(Platform::Tiktok, 4).await;

    let first = fixture.job(Platform::Tiktok).await;
    let second = fixture.job(Platform::Tiktok).await;
    fixture.runner.handle(&first).await;
    fixture.runner.handle(&second).await;

    assert_eq!(fixture.parent_count("tiktok_accounts").await, 4);
    assert_eq!(fixture.status(second.job_id).await, JobStatus::Finished);
}

#[tokio::test]
async fn test_config_is_reported_when_available() {
    let db = open_in_memory().await.unwrap();
    let config = PlatformConfig {
        proxies: vec!["http://p1".into(), "http://p2".into()],
        api_key: None,
        requests_per_min: Some(60),
        concurrency: None,
    };
    let fixture = Fixture::with_sink(Platform::Vk, 0, db, None, FakeConfig::Fixed(config)).await;
    let announcement = fixture.job(Platform::Vk).await;

    fixture.runner.handle(&announcement).await;

    assert!(fixture
        .sink
        .messages()
        .contains(&"VK config loaded: proxies=2, rpm=60, concurrency=None".to_string()));
}

#[tokio::test]
async fn test_config_failure_does_not_fail_job() {
    let fixture = Fixture::new(Platform::Instagram, 2).await;
    let announcement = fixture.job(Platform::Instagram).await;

    assert_eq!(fixture.runner.handle(&announcement).await, Outcome::Finished);
    assert!(!fixture.sink.messages().iter().any(|m| m.contains("config loaded")));
    assert_eq!(fixture.status(announcement.job_id).await, JobStatus::Finished);
}

#[tokio::test]
async fn test_stopped_before_pickup_is_skipped() {
    let fixture = Fixture::new(Platform::Vk, 3).await;
    let announcement = fixture.job(Platform::Vk).await;
    jobs::stop_job(&fixture.db, announcement.job_id).await.unwrap();

    assert_eq!(fixture.runner.handle(&announcement).await, Outcome::NotClaimed);
    assert!(fixture.sink.messages().is_empty());
    assert_eq!(fixture.status(announcement.job_id).await, JobStatus::Stopped);
    assert_eq!(fixture.parent_count("vk_groups").await, 0);
}

#[tokio::test]
async fn test_missing_job_is_skipped() {
    let fixture = Fixture::new(Platform::Vk, 0).await;
    let announcement = JobAnnouncement {
        job_id: 4242,
        service_name: "vk".into(),
        direction_id: fixture.direction,
    };

    assert_eq!(fixture.runner.handle(&announcement).await, Outcome::NotClaimed);
}

#[tokio::test]
async fn test_stop_mid_run_is_honoured() {
    let db = open_in_memory().await.unwrap();
    let sink = RecordingSink::stopping(db.clone(), "sources loaded");
    let fixture =
        Fixture::with_sink(Platform::Vk, 5, db, Some(sink), FakeConfig::Unavailable).await;
    let announcement = fixture.job(Platform::Vk).await;

    assert_eq!(fixture.runner.handle(&announcement).await, Outcome::Stopped);

    let messages = fixture.sink.messages();
    assert_eq!(messages.last().map(String::as_str), Some("VK scrape stopped"));
    assert!(!messages.iter().any(|m| m.contains("finished")));
    assert_eq!(fixture.parent_count("vk_groups").await, 0);

    let job = jobs::get_job(&fixture.db, announcement.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Stopped);
}

#[tokio::test]
async fn test_execution_error_marks_failed() {
    let fixture = Fixture::new(Platform::Tiktok, 2).await;
    sqlx::query("DROP TABLE tiktok_users").execute(&fixture.db).await.unwrap();
    sqlx::query("DROP TABLE tiktok_accounts").execute(&fixture.db).await.unwrap();
    let announcement = fixture.job(Platform::Tiktok).await;

    assert_eq!(fixture.runner.handle(&announcement).await, Outcome::Failed);

    let messages = fixture.sink.messages();
    let last = messages.last().unwrap();
    assert!(last.starts_with("TikTok scrape failed:"), "unexpected: {}", last);
    assert_eq!(fixture.sink.levels().last().map(String::as_str), Some("error"));
    assert_eq!(fixture.status(announcement.job_id).await, JobStatus::Failed);
}

#[tokio::test]
async fn test_panicking_job_is_failed_and_acked() {
    let db = open_in_memory().await.unwrap();
    let fixture = Fixture::with_sink(Platform::Vk, 1, db, None, FakeConfig::Panics).await;
    let broker = MemoryBroker::new("scrape.jobs");
    let stats = Arc::new(ConsumerStats::default());
    let consumer = Consumer::new(
        Arc::new(broker.clone()),
        fixture.runner.clone(),
        Binding::All,
        stats.clone(),
    );
    let mut subscription = broker.subscribe(Binding::All).await.unwrap();

    let announcement = fixture.job(Platform::Vk).await;
    broker.publish(&announcement).await.unwrap();
    consumer.process(subscription.next().await.unwrap().unwrap()).await;

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.panicked, 1);
    assert_eq!(snapshot.acked, 1);
    assert_eq!(broker.acked(), 1);
    assert_eq!(fixture.status(announcement.job_id).await, JobStatus::Failed);
    assert!(fixture
        .sink
        .messages()
        .iter()
        .any(|m| m == "VK scrape failed: config source exploded"));
}

#[tokio::test]
async fn test_health_and_stats_endpoints() {
    let stats = Arc::new(ConsumerStats::default());
    let app = build_router(AppState::new(Platform::Tiktok, stats));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "taspa-worker-tiktok");

    let response = app
        .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["received"], 0);
}
