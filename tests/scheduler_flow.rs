//! End-to-end scheduler tests
//!
//! Discovery, pacing, generation and sending wired together over the
//! in-memory stores, with a manual clock and scripted external services.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use replypilot::clock::{Clock, ManualClock};
use replypilot::discovery::{DiscoveryConfig, DiscoveryPipeline, PostSource, SourceError};
use replypilot::domain::{AutopilotSettings, CandidatePost, EntryStatus, NewReplyEntry};
use replypilot::executor::{ExecutorConfig, ReplyExecutor};
use replypilot::generation::GenerationChain;
use replypilot::posting::{PostError, PostReceipt, PostingClient, ReplyTarget};
use replypilot::rate_limit::{FixedJitter, RateLimitConfig, RateLimitEvaluator};
use replypilot::scheduler::{ReplyScheduler, SchedulerConfig};
use replypilot::store::{MemoryQueueStore, MemorySettingsStore, ReplyQueueStore};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn minutes(m: i64) -> chrono::Duration {
    chrono::Duration::minutes(m)
}

struct FixedSource {
    posts: Vec<CandidatePost>,
}

#[async_trait]
impl PostSource for FixedSource {
    async fn fetch_candidates(&self, _settings: &AutopilotSettings) -> Result<Vec<CandidatePost>, SourceError> {
        Ok(self.posts.clone())
    }
}

/// Records every send; replays scripted results, then succeeds.
#[derive(Default)]
struct RecordingPostingClient {
    script: Mutex<VecDeque<Result<PostReceipt, PostError>>>,
    sent: Mutex<Vec<(String, ReplyTarget)>>,
}

impl RecordingPostingClient {
    fn scripted(script: Vec<Result<PostReceipt, PostError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<(String, ReplyTarget)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostingClient for RecordingPostingClient {
    async fn send(&self, text: &str, target: &ReplyTarget) -> Result<PostReceipt, PostError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((text.to_string(), target.clone()));
        let n = sent.len();
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PostReceipt::with_id(format!("ext-{}", n))))
    }
}

fn post(post_ref: &str, author: &str, text: &str, age_minutes: i64) -> CandidatePost {
    CandidatePost {
        post_ref: post_ref.to_string(),
        author_account_ref: author.to_string(),
        text: text.to_string(),
        published_at: t0() - minutes(age_minutes),
        is_repost: false,
    }
}

struct Harness {
    store: Arc<MemoryQueueStore>,
    clock: Arc<ManualClock>,
    posting: Arc<RecordingPostingClient>,
    scheduler: ReplyScheduler,
}

fn harness(posts: Vec<CandidatePost>, posting: Arc<RecordingPostingClient>) -> Harness {
    let store = Arc::new(MemoryQueueStore::new());
    let settings = Arc::new(MemorySettingsStore::new());
    settings
        .upsert(AutopilotSettings::enabled("u1").with_max_age(60).with_window_limit(2))
        .unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let jitter = Arc::new(FixedJitter::min());

    let evaluator = RateLimitEvaluator::new(store.clone(), settings.clone(), clock.clone(), RateLimitConfig::default())
        .with_jitter(jitter.clone());
    let chain = GenerationChain::new(0.5).with_fallback("Thanks {author}!");
    let discovery = DiscoveryPipeline::new(
        store.clone(),
        settings,
        Arc::new(FixedSource { posts }),
        Arc::new(chain),
        Arc::new(evaluator),
        clock.clone(),
        DiscoveryConfig::default(),
    );

    let executor =
        ReplyExecutor::new(store.clone(), posting.clone(), clock.clone(), ExecutorConfig::default()).with_jitter(jitter);
    let scheduler = ReplyScheduler::new(
        store.clone(),
        Arc::new(executor),
        Some(Arc::new(discovery)),
        clock.clone(),
        SchedulerConfig::new(Duration::from_secs(30), 4),
    );

    Harness {
        store,
        clock,
        posting,
        scheduler,
    }
}

#[tokio::test]
async fn test_discovered_posts_are_paced_and_sent() {
    let posts = vec![
        post("p1", "@alice", "shipping day", 5),
        post("p2", "@bob", "new release", 10),
        post("p3", "@carol", "thoughts?", 2),
        post("p4", "@dave", "RT @alice shipping day", 1),
        post("p5", "@erin", "old news", 180),
    ];
    let h = harness(posts, RecordingPostingClient::scripted(Vec::new()));

    let tweets = h.scheduler.trigger_tweet_processing().await.unwrap();
    assert_eq!(tweets.processed, 5);
    assert_eq!(tweets.succeeded, 3);
    assert_eq!(tweets.skipped, 2);
    assert!(tweets.errors.is_empty());

    let pending = h.store.list(Some(EntryStatus::Pending), 10).unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|e| e.is_auto_generated));
    assert!(pending.iter().all(|e| e.scheduled_for > t0()));

    // Two slots per hour: the third reply waits for the window to clear
    let p3 = pending.iter().find(|e| e.source_post_ref == "p3").unwrap();
    assert!(p3.scheduled_for >= t0() + minutes(60));

    // Nothing is due yet
    let replies = h.scheduler.trigger_reply_processing().await.unwrap();
    assert_eq!(replies.processed, 0);
    assert!(h.posting.sent().is_empty());

    h.clock.advance(Duration::from_secs(2 * 60));
    let replies = h.scheduler.trigger_reply_processing().await.unwrap();
    assert_eq!(replies.succeeded, 2);

    let sent = h.posting.sent();
    let mut in_reply_to: Vec<&str> = sent.iter().map(|(_, t)| t.in_reply_to.as_str()).collect();
    in_reply_to.sort();
    assert_eq!(in_reply_to, vec!["p1", "p2"]);
    assert!(sent.iter().any(|(text, _)| text == "Thanks @alice!"));

    // Rediscovering the same posts queues nothing new
    let tweets = h.scheduler.trigger_tweet_processing().await.unwrap();
    assert_eq!(tweets.succeeded, 0);

    h.clock.advance(Duration::from_secs(60 * 60));
    let replies = h.scheduler.trigger_reply_processing().await.unwrap();
    assert_eq!(replies.succeeded, 1);

    let status = h.scheduler.status().unwrap();
    assert_eq!(status.counts_by_status[&EntryStatus::Sent], 3);
    assert_eq!(status.counts_by_status[&EntryStatus::Pending], 0);
    assert_eq!(status.total_sent, 3);
    assert_eq!(h.posting.sent().len(), 3);
}

#[tokio::test]
async fn test_transient_failure_is_retried_after_backoff() {
    let posting = RecordingPostingClient::scripted(vec![Err(PostError::Transient("503".to_string()))]);
    let h = harness(Vec::new(), posting);

    let entry = h
        .store
        .enqueue(NewReplyEntry::auto("u1", "@alice", "p1", "hello", t0()).manual(), t0())
        .unwrap()
        .entry()
        .clone();

    let first = h.scheduler.trigger_reply_processing().await.unwrap();
    assert_eq!(first.requeued, 1);

    let requeued = h.store.get(&entry.id).unwrap().unwrap();
    assert_eq!(requeued.status, EntryStatus::Pending);
    assert_eq!(requeued.attempt_count, 1);
    assert_eq!(requeued.scheduled_for, t0() + chrono::Duration::seconds(30));
    assert!(requeued.last_error.unwrap().contains("503"));

    // Not due until the backoff elapses
    let early = h.scheduler.trigger_reply_processing().await.unwrap();
    assert_eq!(early.processed, 0);

    h.clock.advance(Duration::from_secs(31));
    let second = h.scheduler.trigger_reply_processing().await.unwrap();
    assert_eq!(second.succeeded, 1);

    let sent = h.store.get(&entry.id).unwrap().unwrap();
    assert_eq!(sent.status, EntryStatus::Sent);
    assert_eq!(sent.external_id.as_deref(), Some("ext-2"));
    assert_eq!(h.posting.sent().len(), 2);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let posting = RecordingPostingClient::scripted(vec![Err(PostError::Permanent("post deleted".to_string()))]);
    let h = harness(Vec::new(), posting);

    let entry = h
        .store
        .enqueue(NewReplyEntry::auto("u1", "@alice", "p1", "hello", t0()).manual(), t0())
        .unwrap()
        .entry()
        .clone();

    let report = h.scheduler.trigger_reply_processing().await.unwrap();
    assert_eq!(report.failed, 1);

    h.clock.advance(Duration::from_secs(3600));
    let later = h.scheduler.trigger_reply_processing().await.unwrap();
    assert_eq!(later.processed, 0);

    let failed = h.store.get(&entry.id).unwrap().unwrap();
    assert_eq!(failed.status, EntryStatus::Failed);
    assert!(failed.last_error.unwrap().contains("post deleted"));
    assert_eq!(h.posting.sent().len(), 1);
}

#[tokio::test]
async fn test_cancelled_entry_is_never_sent() {
    let h = harness(Vec::new(), RecordingPostingClient::scripted(Vec::new()));

    let entry = h
        .store
        .enqueue(NewReplyEntry::auto("u1", "@alice", "p1", "hello", t0() + minutes(5)).manual(), t0())
        .unwrap()
        .entry()
        .clone();
    h.store.cancel(&entry.id, h.clock.now()).unwrap();

    h.clock.advance(Duration::from_secs(600));
    let report = h.scheduler.trigger_all().await;
    assert_eq!(report.replies.processed, 0);
    assert!(h.posting.sent().is_empty());
    assert_eq!(h.store.get(&entry.id).unwrap().unwrap().status, EntryStatus::Cancelled);
}
