use eyre::{Context, Result};
use replypilot::discovery::{DiscoveryConfig, HttpSourceConfig};
use replypilot::executor::ExecutorConfig;
use replypilot::generation::HttpGeneratorConfig;
use replypilot::posting::HttpPostingConfig;
use replypilot::rate_limit::{BackoffPolicy, RateLimitConfig};
use replypilot::scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub scheduler: SchedulerSection,
    pub rate_limit: RateLimitSection,
    pub executor: ExecutorSection,
    pub generation: GenerationSection,
    pub posting: PostingSection,
    pub discovery: DiscoverySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("replypilot")
                .join("replypilot.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub tick_interval_secs: u64,
    pub batch_limit: usize,
    pub worker_concurrency: usize,
    pub stale_claim_lease_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            batch_limit: 50,
            worker_concurrency: 4,
            stale_claim_lease_secs: 600,
        }
    }
}

impl From<&SchedulerSection> for SchedulerConfig {
    fn from(s: &SchedulerSection) -> Self {
        SchedulerConfig::new(Duration::from_secs(s.tick_interval_secs), s.worker_concurrency)
            .with_batch_limit(s.batch_limit)
            .with_stale_claim_lease(Duration::from_secs(s.stale_claim_lease_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub hourly_limit: u32,
    pub daily_limit: u32,
    pub target_limit: u32,
    pub target_window_secs: u64,
    pub target_min_spacing_secs: u64,
    pub jitter_min_secs: u64,
    pub jitter_max_secs: u64,
    pub min_delay_secs: u64,
    pub max_horizon_secs: u64,
    pub count_pending: bool,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            hourly_limit: 10,
            daily_limit: 50,
            target_limit: 1,
            target_window_secs: 1200,
            target_min_spacing_secs: 1200,
            jitter_min_secs: 45,
            jitter_max_secs: 180,
            min_delay_secs: 5,
            max_horizon_secs: 86_400,
            count_pending: true,
        }
    }
}

impl From<&RateLimitSection> for RateLimitConfig {
    fn from(s: &RateLimitSection) -> Self {
        RateLimitConfig {
            hourly_limit: s.hourly_limit,
            daily_limit: s.daily_limit,
            target_limit: s.target_limit,
            target_window: Duration::from_secs(s.target_window_secs),
            target_min_spacing: Duration::from_secs(s.target_min_spacing_secs),
            jitter_min: Duration::from_secs(s.jitter_min_secs),
            jitter_max: Duration::from_secs(s.jitter_max_secs),
            min_delay: Duration::from_secs(s.min_delay_secs),
            max_horizon: Duration::from_secs(s.max_horizon_secs),
            count_pending: s.count_pending,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub max_attempts: u32,
    pub send_timeout_secs: u64,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub backoff_jitter_ratio: f64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            send_timeout_secs: 30,
            backoff_base_secs: 30,
            backoff_max_secs: 900,
            backoff_jitter_ratio: 0.2,
        }
    }
}

impl From<&ExecutorSection> for ExecutorConfig {
    fn from(s: &ExecutorSection) -> Self {
        ExecutorConfig {
            max_attempts: s.max_attempts.max(1),
            send_timeout: Duration::from_secs(s.send_timeout_secs),
            backoff: BackoffPolicy::new(
                Duration::from_secs(s.backoff_base_secs),
                Duration::from_secs(s.backoff_max_secs),
                s.backoff_jitter_ratio,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub endpoint: Option<String>,
    pub token_env: String,
    pub timeout_secs: u64,
    pub min_confidence: f32,
    /// Static reply used when every generator fails; `{author}` is substituted
    pub fallback_text: Option<String>,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: "REPLYPILOT_GENERATION_TOKEN".to_string(),
            timeout_secs: 20,
            min_confidence: 0.5,
            fallback_text: None,
        }
    }
}

impl GenerationSection {
    pub fn http_config(&self) -> Option<HttpGeneratorConfig> {
        self.endpoint.as_ref().map(|endpoint| HttpGeneratorConfig {
            endpoint: endpoint.clone(),
            token_env: self.token_env.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingSection {
    pub endpoint: String,
    pub token_env: String,
    pub timeout_secs: u64,
    pub max_reply_chars: usize,
}

impl Default for PostingSection {
    fn default() -> Self {
        let http = HttpPostingConfig::default();
        Self {
            endpoint: http.endpoint,
            token_env: http.token_env,
            timeout_secs: http.timeout.as_secs(),
            max_reply_chars: replypilot::store::DEFAULT_MAX_REPLY_CHARS,
        }
    }
}

impl From<&PostingSection> for HttpPostingConfig {
    fn from(s: &PostingSection) -> Self {
        HttpPostingConfig {
            endpoint: s.endpoint.clone(),
            token_env: s.token_env.clone(),
            timeout: Duration::from_secs(s.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Candidate post endpoint; discovery is disabled when unset
    pub endpoint: Option<String>,
    pub token_env: String,
    pub timeout_secs: u64,
    pub user_concurrency: usize,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: "REPLYPILOT_SOURCE_TOKEN".to_string(),
            timeout_secs: 15,
            user_concurrency: 4,
        }
    }
}

impl DiscoverySection {
    pub fn http_config(&self) -> Option<HttpSourceConfig> {
        self.endpoint.as_ref().map(|endpoint| HttpSourceConfig {
            endpoint: endpoint.clone(),
            token_env: self.token_env.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }

    pub fn pipeline_config(&self, max_reply_chars: usize) -> DiscoveryConfig {
        DiscoveryConfig {
            user_concurrency: self.user_concurrency,
            fetch_timeout: Duration::from_secs(self.timeout_secs),
            max_reply_chars,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// `--config` must load if given. Otherwise the first readable file of
    /// `~/.config/replypilot/replypilot.yml` and `./replypilot.yml` wins,
    /// and defaults apply when neither exists.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidate_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => log::warn!("Failed to load config from {}: {}", candidate.display(), e),
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let project_name = env!("CARGO_PKG_NAME");
        let file_name = format!("{}.yml", project_name);

        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(project_name).join(&file_name));
        }
        paths.push(PathBuf::from(file_name));
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
