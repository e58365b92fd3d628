//! Discovery pipeline
//!
//! Users are processed concurrently (bounded); posts within one user are
//! processed in order, so each enqueue is visible to the pacing of the next.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use super::source::{PostSource, SourceError};
use crate::autopilot::AutopilotPolicy;
use crate::clock::{Clock, to_chrono};
use crate::domain::{AutopilotSettings, CandidatePost, Enqueued, NewReplyEntry};
use crate::error::{ReplyError, Result};
use crate::generation::{GenerationChain, GenerationContext};
use crate::rate_limit::{DelayPlan, RateLimitEvaluator};
use crate::scheduler::PhaseReport;
use crate::store::{DEFAULT_MAX_REPLY_CHARS, ReplyQueueStore, SettingsStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Users processed at once
    pub user_concurrency: usize,
    /// Upper bound on one `fetch_candidates` call
    pub fetch_timeout: Duration,
    /// Passed to generators as the reply length limit
    pub max_reply_chars: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            user_concurrency: 4,
            fetch_timeout: Duration::from_secs(30),
            max_reply_chars: DEFAULT_MAX_REPLY_CHARS,
        }
    }
}

/// What happened to one candidate post
#[derive(Debug, Clone, PartialEq, Eq)]
enum PostOutcome {
    Enqueued,
    Skipped(String),
}

pub struct DiscoveryPipeline {
    store: Arc<dyn ReplyQueueStore>,
    settings: Arc<dyn SettingsStore>,
    source: Arc<dyn PostSource>,
    generator: Arc<GenerationChain>,
    rate_limit: Arc<RateLimitEvaluator>,
    policy: AutopilotPolicy,
    clock: Arc<dyn Clock>,
    config: DiscoveryConfig,
}

impl DiscoveryPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ReplyQueueStore>,
        settings: Arc<dyn SettingsStore>,
        source: Arc<dyn PostSource>,
        generator: Arc<GenerationChain>,
        rate_limit: Arc<RateLimitEvaluator>,
        clock: Arc<dyn Clock>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            store,
            settings,
            source,
            generator,
            rate_limit,
            policy: AutopilotPolicy::new(clock.clone()),
            clock,
            config,
        }
    }

    /// Run discovery for every enabled user.
    ///
    /// Fails only when the enabled users cannot be listed; per-user and
    /// per-post errors are counted in the report.
    pub async fn run(&self) -> Result<PhaseReport> {
        let users = self.settings.list_enabled()?;
        let concurrency = self.config.user_concurrency.max(1);

        let reports: Vec<PhaseReport> = stream::iter(users)
            .map(|settings| async move { self.run_user(&settings).await })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut total = PhaseReport::default();
        for report in reports {
            total.merge(report);
        }
        Ok(total)
    }

    async fn run_user(&self, settings: &AutopilotSettings) -> PhaseReport {
        let mut report = PhaseReport::default();
        let user_id = &settings.owner_user_id;

        let posts = match self.fetch(settings).await {
            Ok(posts) => posts,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to fetch candidate posts");
                report.record_error(format!("{}: {}", user_id, e));
                return report;
            }
        };

        for post in posts {
            report.processed += 1;
            match self.process_post(settings, &post).await {
                Ok(PostOutcome::Enqueued) => report.succeeded += 1,
                Ok(PostOutcome::Skipped(reason)) => {
                    tracing::debug!(user_id = %user_id, post_ref = %post.post_ref, reason = %reason, "Skipped post");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, post_ref = %post.post_ref, error = %e, "Failed to process post");
                    report.record_error(format!("{}/{}: {}", user_id, post.post_ref, e));
                }
            }
        }

        report
    }

    async fn fetch(&self, settings: &AutopilotSettings) -> std::result::Result<Vec<CandidatePost>, SourceError> {
        let timeout = self.config.fetch_timeout;
        tokio::time::timeout(timeout, self.source.fetch_candidates(settings))
            .await
            .map_err(|_| SourceError::Timeout(timeout))?
    }

    async fn process_post(&self, settings: &AutopilotSettings, post: &CandidatePost) -> Result<PostOutcome> {
        let user_id = &settings.owner_user_id;

        let decision = self.policy.evaluate(settings, post);
        if !decision.allow {
            return Ok(PostOutcome::Skipped(decision.reason.unwrap_or_default()));
        }

        if self.store.has_source(user_id, &post.post_ref)? {
            return Ok(PostOutcome::Skipped("already queued".to_string()));
        }

        let delay = match self.rate_limit.plan_delay(user_id, Some(&post.author_account_ref))? {
            DelayPlan::Schedule(delay) => delay,
            DelayPlan::Deny(reason) => return Ok(PostOutcome::Skipped(reason)),
        };

        let context = GenerationContext {
            owner_user_id: user_id.clone(),
            max_chars: self.config.max_reply_chars,
        };
        let reply = self
            .generator
            .generate(post, &context)
            .await
            .map_err(|e| ReplyError::External(e.to_string()))?;

        let now = self.clock.now();
        let new = NewReplyEntry::auto(
            user_id.clone(),
            post.author_account_ref.clone(),
            post.post_ref.clone(),
            reply.text,
            now + to_chrono(delay),
        );

        match self.store.enqueue(new, now)? {
            Enqueued::Created(entry) => {
                tracing::info!(
                    entry_id = %entry.id,
                    user_id = %user_id,
                    delay_secs = delay.as_secs(),
                    "Queued automated reply"
                );
                Ok(PostOutcome::Enqueued)
            }
            Enqueued::Existing(_) => Ok(PostOutcome::Skipped("already queued".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::EntryStatus;
    use crate::generation::{ContentGenerator, GeneratedReply, GenerationError};
    use crate::rate_limit::{FixedJitter, RateLimitConfig};
    use crate::store::{MemoryQueueStore, MemorySettingsStore};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;

    struct MockSource {
        posts: HashMap<String, std::result::Result<Vec<CandidatePost>, SourceError>>,
    }

    #[async_trait]
    impl PostSource for MockSource {
        async fn fetch_candidates(
            &self,
            settings: &AutopilotSettings,
        ) -> std::result::Result<Vec<CandidatePost>, SourceError> {
            self.posts
                .get(&settings.owner_user_id)
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl ContentGenerator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(
            &self,
            post: &CandidatePost,
            _context: &GenerationContext,
        ) -> std::result::Result<GeneratedReply, GenerationError> {
            if post.text.contains("fail") {
                return Err(GenerationError::Unavailable("no".to_string()));
            }
            Ok(GeneratedReply {
                text: format!("Re: {}", post.text),
                confidence: 0.9,
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn post(id: &str, author: &str, text: &str, minutes_old: i64) -> CandidatePost {
        CandidatePost {
            post_ref: id.to_string(),
            author_account_ref: author.to_string(),
            text: text.to_string(),
            published_at: now() - chrono::Duration::minutes(minutes_old),
            is_repost: false,
        }
    }

    struct Fixture {
        store: Arc<MemoryQueueStore>,
        settings: Arc<MemorySettingsStore>,
        pipeline: DiscoveryPipeline,
    }

    fn fixture(posts: HashMap<String, std::result::Result<Vec<CandidatePost>, SourceError>>) -> Fixture {
        let store = Arc::new(MemoryQueueStore::new());
        let settings = Arc::new(MemorySettingsStore::new());
        let clock = Arc::new(ManualClock::new(now()));
        let rate_limit = Arc::new(
            RateLimitEvaluator::new(store.clone(), settings.clone(), clock.clone(), RateLimitConfig::default())
                .with_jitter(Arc::new(FixedJitter::min())),
        );
        let generator = Arc::new(GenerationChain::new(0.5).then(Arc::new(EchoGenerator), Duration::from_secs(1)));
        let pipeline = DiscoveryPipeline::new(
            store.clone(),
            settings.clone(),
            Arc::new(MockSource { posts }),
            generator,
            rate_limit,
            clock,
            DiscoveryConfig::default(),
        );
        Fixture {
            store,
            settings,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_enqueues_eligible_posts() {
        let posts = HashMap::from([(
            "u1".to_string(),
            Ok(vec![
                post("p1", "@a", "launch", 5),
                post("p2", "@b", "old news", 120),
                post("p3", "@c", "RT @a: launch", 1),
            ]),
        )]);
        let f = fixture(posts);
        f.settings.upsert(AutopilotSettings::enabled("u1")).unwrap();

        let report = f.pipeline.run().await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 2);

        let pending = f.store.list(Some(EntryStatus::Pending), 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reply_text, "Re: launch");
        assert_eq!(pending[0].target_account_ref, "@a");
        assert!(pending[0].is_auto_generated);
        assert_eq!(pending[0].scheduled_for, now() + chrono::Duration::seconds(45));
    }

    #[tokio::test]
    async fn test_second_run_does_not_duplicate() {
        let posts = HashMap::from([("u1".to_string(), Ok(vec![post("p1", "@a", "launch", 5)]))]);
        let f = fixture(posts);
        f.settings.upsert(AutopilotSettings::enabled("u1")).unwrap();

        f.pipeline.run().await.unwrap();
        let report = f.pipeline.run().await.unwrap();
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(f.store.list(None, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_target_spaced_out() {
        let posts = HashMap::from([(
            "u1".to_string(),
            Ok(vec![post("p1", "@a", "one", 5), post("p2", "@a", "two", 4)]),
        )]);
        let f = fixture(posts);
        f.settings.upsert(AutopilotSettings::enabled("u1")).unwrap();

        f.pipeline.run().await.unwrap();
        let mut entries = f.store.list(None, 10).unwrap();
        entries.sort_by_key(|e| e.scheduled_for);
        assert_eq!(entries.len(), 2);
        let gap = entries[1].scheduled_for - entries[0].scheduled_for;
        assert!(gap >= chrono::Duration::minutes(20), "gap was {:?}", gap);
    }

    #[tokio::test]
    async fn test_errors_isolated_per_post_and_user() {
        let posts = HashMap::from([
            (
                "u1".to_string(),
                Ok(vec![post("p1", "@a", "please fail", 5), post("p2", "@b", "fine", 5)]),
            ),
            ("u2".to_string(), Err(SourceError::Unavailable("down".to_string()))),
        ]);
        let f = fixture(posts);
        f.settings.upsert(AutopilotSettings::enabled("u1")).unwrap();
        f.settings.upsert(AutopilotSettings::enabled("u2")).unwrap();

        let report = f.pipeline.run().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_users_ignored() {
        let posts = HashMap::from([("u1".to_string(), Ok(vec![post("p1", "@a", "launch", 5)]))]);
        let f = fixture(posts);
        f.settings.upsert(AutopilotSettings::enabled("u1").disabled()).unwrap();

        let report = f.pipeline.run().await.unwrap();
        assert_eq!(report, PhaseReport::default());
    }
}
