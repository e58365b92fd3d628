//! Rolling-window rate checks and send-time planning.
//!
//! Nothing here writes: every decision is derived from the queue's own
//! history (sent, in-flight, and optionally pending entries) at the
//! clock's current time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::RateLimitConfig;
use super::jitter::{JitterSource, RandomJitter};
use crate::clock::{Clock, to_chrono, to_std};
use crate::error::Result;
use crate::store::{ReplyQueueStore, SettingsStore};

/// A rolling window that can block a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindow {
    Hourly,
    Daily,
    Target,
}

impl RateWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateWindow::Hourly => "hourly",
            RateWindow::Daily => "daily",
            RateWindow::Target => "target",
        }
    }
}

impl std::fmt::Display for RateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Activity counted in each window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WindowCounts {
    pub hourly: usize,
    pub daily: usize,
    /// Only present when a target was given
    pub target: Option<usize>,
}

/// Limits applied to each window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WindowLimits {
    pub hourly: u32,
    pub daily: u32,
    pub target: Option<u32>,
}

/// Result of `check_reply_rate_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitCheck {
    pub allowed: bool,
    /// Names the first violated window (hourly, daily, then target)
    pub reason: Option<String>,
    pub violated: Option<RateWindow>,
    pub counts: WindowCounts,
    pub limits: WindowLimits,
}

/// Result of `plan_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelayPlan {
    /// Enqueue with `scheduled_for = now + delay`
    Schedule(Duration),
    /// No slot within the planning horizon
    Deny(String),
}

impl DelayPlan {
    pub fn delay(&self) -> Option<Duration> {
        match self {
            DelayPlan::Schedule(delay) => Some(*delay),
            DelayPlan::Deny(_) => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, DelayPlan::Schedule(_))
    }
}

/// Snapshot of one user's counted activity.
struct Activity {
    now: DateTime<Utc>,
    hourly: Vec<DateTime<Utc>>,
    daily: Vec<DateTime<Utc>>,
    target: Option<Vec<DateTime<Utc>>>,
    last_target: Option<DateTime<Utc>>,
    limits: WindowLimits,
}

impl Activity {
    fn windows(&self) -> Vec<(RateWindow, usize, u32)> {
        let mut windows = vec![
            (RateWindow::Hourly, self.hourly.len(), self.limits.hourly),
            (RateWindow::Daily, self.daily.len(), self.limits.daily),
        ];
        if let (Some(events), Some(limit)) = (&self.target, self.limits.target) {
            windows.push((RateWindow::Target, events.len(), limit));
        }
        windows
    }
}

/// Computed pacing before jitter is folded in.
struct Pacing {
    /// Longest wait any window or spacing rule demands
    delay: Duration,
    /// A window whose limit is zero can never clear
    blocked: Option<RateWindow>,
}

/// Decides whether a reply may be attempted and when it should be sent.
pub struct RateLimitEvaluator {
    store: Arc<dyn ReplyQueueStore>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
    config: RateLimitConfig,
}

impl RateLimitEvaluator {
    pub fn new(
        store: Arc<dyn ReplyQueueStore>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            settings,
            clock,
            jitter: Arc::new(RandomJitter),
            config,
        }
    }

    /// Replace the random jitter source.
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check the user's windows (and the target's, if given) at the current time.
    pub fn check_reply_rate_limit(&self, user_id: &str, target_id: Option<&str>) -> Result<RateLimitCheck> {
        let activity = self.gather(user_id, target_id)?;

        let violated = activity
            .windows()
            .into_iter()
            .find(|(_, count, limit)| *count >= *limit as usize);

        let reason = violated.map(|(window, count, limit)| match (window, target_id) {
            (RateWindow::Target, Some(target)) => {
                format!("target limit reached for {}: {} of {} replies", target, count, limit)
            }
            _ => format!("{} limit reached: {} of {} replies", window, count, limit),
        });

        Ok(RateLimitCheck {
            allowed: violated.is_none(),
            reason,
            violated: violated.map(|(window, _, _)| window),
            counts: WindowCounts {
                hourly: activity.hourly.len(),
                daily: activity.daily.len(),
                target: activity.target.as_ref().map(Vec::len),
            },
            limits: activity.limits,
        })
    }

    /// Delay before the next reply for this user (and target) may be sent.
    ///
    /// The result is the largest of: the jittered base delay, the time until
    /// each violated window frees a slot, the target spacing floor, and
    /// `min_delay`. A window with a zero limit never clears and contributes
    /// its full length.
    pub fn calculate_optimal_delay(&self, user_id: &str, target_id: Option<&str>) -> Result<Duration> {
        let activity = self.gather(user_id, target_id)?;
        Ok(self.jittered(self.pacing(&activity)))
    }

    /// Like `calculate_optimal_delay`, but refuses slots beyond `max_horizon`.
    pub fn plan_delay(&self, user_id: &str, target_id: Option<&str>) -> Result<DelayPlan> {
        let activity = self.gather(user_id, target_id)?;
        let pacing = self.pacing(&activity);

        if let Some(window) = pacing.blocked {
            tracing::debug!(user_id = %user_id, window = %window, "Reply denied by zero limit");
            return Ok(DelayPlan::Deny(format!("{} limit is 0", window)));
        }

        let delay = self.jittered(pacing);
        if delay > self.config.max_horizon {
            tracing::debug!(
                user_id = %user_id,
                delay_secs = delay.as_secs(),
                "Next reply slot is beyond the planning horizon"
            );
            return Ok(DelayPlan::Deny(format!(
                "next slot is {}s away, beyond the {}s horizon",
                delay.as_secs(),
                self.config.max_horizon.as_secs()
            )));
        }
        Ok(DelayPlan::Schedule(delay))
    }

    fn jittered(&self, pacing: Pacing) -> Duration {
        let base = self.jitter.sample(self.config.jitter_min, self.config.jitter_max);
        base.max(pacing.delay).max(self.config.min_delay)
    }

    fn pacing(&self, activity: &Activity) -> Pacing {
        let mut delay = Duration::ZERO;
        let mut blocked = None;

        let lengths = [
            (RateWindow::Hourly, self.config.hourly_window, &activity.hourly),
            (RateWindow::Daily, self.config.daily_window, &activity.daily),
        ];
        let target = activity
            .target
            .as_ref()
            .map(|events| (RateWindow::Target, self.config.target_window, events));

        for (window, length, events) in lengths.into_iter().chain(target) {
            let limit = match window {
                RateWindow::Hourly => activity.limits.hourly,
                RateWindow::Daily => activity.limits.daily,
                RateWindow::Target => activity.limits.target.unwrap_or(self.config.target_limit),
            };
            match window_clear_delay(events, limit, length, activity.now) {
                Some(wait) => delay = delay.max(wait),
                None => {
                    if blocked.is_none() {
                        blocked = Some(window);
                    }
                    delay = delay.max(length);
                }
            }
        }

        if let Some(last) = activity.last_target {
            let floor = to_std(last + to_chrono(self.config.target_min_spacing) - activity.now);
            delay = delay.max(floor);
        }

        Pacing { delay, blocked }
    }

    fn gather(&self, user_id: &str, target_id: Option<&str>) -> Result<Activity> {
        let now = self.clock.now();
        let count_pending = self.config.count_pending;

        let hourly_limit = self
            .settings
            .get_settings(user_id)?
            .and_then(|s| s.max_replies_per_window)
            .unwrap_or(self.config.hourly_limit);

        let hourly = self.store.activity_since(
            user_id,
            None,
            now - to_chrono(self.config.hourly_window),
            count_pending,
        )?;
        let daily = self.store.activity_since(
            user_id,
            None,
            now - to_chrono(self.config.daily_window),
            count_pending,
        )?;

        let (target, last_target) = match target_id {
            Some(target_id) => {
                let lookback = self.config.target_window.max(self.config.target_min_spacing);
                let events = self.store.activity_since(
                    user_id,
                    Some(target_id),
                    now - to_chrono(lookback),
                    count_pending,
                )?;
                let window_start = now - to_chrono(self.config.target_window);
                let in_window: Vec<_> = events.iter().copied().filter(|at| *at >= window_start).collect();
                (Some(in_window), events.last().copied())
            }
            None => (None, None),
        };

        Ok(Activity {
            now,
            hourly,
            daily,
            target,
            last_target,
            limits: WindowLimits {
                hourly: hourly_limit,
                daily: self.config.daily_limit,
                target: target_id.map(|_| self.config.target_limit),
            },
        })
    }
}

/// Time until one more event fits in the window, or `None` if it never will.
///
/// With `n` sorted events and limit `L`, a slot opens once the `(n - L)`-th
/// oldest event leaves the window.
fn window_clear_delay(events: &[DateTime<Utc>], limit: u32, window: Duration, now: DateTime<Utc>) -> Option<Duration> {
    let limit = limit as usize;
    let n = events.len();
    if n < limit {
        return Some(Duration::ZERO);
    }
    if limit == 0 {
        return None;
    }
    let clears_at = events[n - limit] + to_chrono(window);
    Some(to_std(clears_at - now))
}
