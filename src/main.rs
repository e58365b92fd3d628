use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use replypilot::clock::{Clock, SystemClock, to_chrono};
use replypilot::discovery::{DiscoveryPipeline, HttpPostSource};
use replypilot::domain::{AutopilotSettings, EntryStatus, Enqueued, NewReplyEntry, ReplyQueueEntry};
use replypilot::executor::{ExecutorConfig, ReplyExecutor};
use replypilot::generation::{GenerationChain, HttpContentGenerator};
use replypilot::posting::{HttpPostingClient, HttpPostingConfig};
use replypilot::rate_limit::{RateLimitConfig, RateLimitEvaluator};
use replypilot::recovery::{RecoveryStats, recover_stale_claims};
use replypilot::scheduler::{PhaseReport, ReplyScheduler, SchedulerConfig, TickReport};
use replypilot::store::{ReplyQueueStore, SettingsStore, SqliteQueueStore};

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, SettingsCommands, TriggerPhase};
use config::Config;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("replypilot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("replypilot.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Everything a command may need, built from config
struct App {
    config: Config,
    store: Arc<SqliteQueueStore>,
    clock: Arc<dyn Clock>,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let store = SqliteQueueStore::open(&config.storage.db_path)
            .context(format!("Failed to open queue database {}", config.storage.db_path.display()))?
            .with_max_reply_chars(config.posting.max_reply_chars);
        info!("Opened queue database: {}", config.storage.db_path.display());

        Ok(Self {
            config,
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
        })
    }

    fn queue(&self) -> Arc<dyn ReplyQueueStore> {
        self.store.clone()
    }

    fn settings(&self) -> Arc<dyn SettingsStore> {
        self.store.clone()
    }

    fn build_scheduler(&self) -> Result<ReplyScheduler> {
        let posting = HttpPostingClient::new(HttpPostingConfig::from(&self.config.posting))
            .context("Failed to create posting client")?;
        let executor = ReplyExecutor::new(
            self.queue(),
            Arc::new(posting),
            self.clock.clone(),
            ExecutorConfig::from(&self.config.executor),
        );

        let discovery = self.build_discovery()?.map(Arc::new);
        if discovery.is_none() {
            info!("No discovery endpoint configured, tweet processing disabled");
        }

        Ok(ReplyScheduler::new(
            self.queue(),
            Arc::new(executor),
            discovery,
            self.clock.clone(),
            SchedulerConfig::from(&self.config.scheduler),
        ))
    }

    fn build_discovery(&self) -> Result<Option<DiscoveryPipeline>> {
        let Some(source_config) = self.config.discovery.http_config() else {
            return Ok(None);
        };
        let source = HttpPostSource::new(source_config).context("Failed to create post source")?;

        let rate_config = RateLimitConfig::from(&self.config.rate_limit);
        rate_config.validate().context("Invalid rate_limit config")?;
        let evaluator = RateLimitEvaluator::new(self.queue(), self.settings(), self.clock.clone(), rate_config);

        let generation = &self.config.generation;
        let mut chain = GenerationChain::new(generation.min_confidence);
        if let Some(http_config) = generation.http_config() {
            let generator = HttpContentGenerator::new(http_config).context("Failed to create generator")?;
            chain = chain.then(Arc::new(generator), generation.timeout());
        }
        if let Some(fallback) = &generation.fallback_text {
            chain = chain.with_fallback(fallback.clone());
        }
        if chain.is_empty() {
            return Err(eyre!("discovery is configured but no generation endpoint or fallback_text is set"));
        }

        Ok(Some(DiscoveryPipeline::new(
            self.queue(),
            self.settings(),
            Arc::new(source),
            Arc::new(chain),
            Arc::new(evaluator),
            self.clock.clone(),
            self.config.discovery.pipeline_config(self.config.posting.max_reply_chars),
        )))
    }

    fn recover(&self) -> Result<RecoveryStats> {
        let lease = Duration::from_secs(self.config.scheduler.stale_claim_lease_secs);
        let stats = recover_stale_claims(self.store.as_ref(), self.clock.now(), lease)?;
        Ok(stats)
    }
}

async fn run_application(cli: &Cli, config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let app = App::open(config)?;

    match &cli.command {
        Commands::Run => handle_run_command(&app).await,
        Commands::Trigger { phase } => handle_trigger_command(&app, *phase).await,
        Commands::Status => handle_status_command(&app),
        Commands::List { status, limit } => handle_list_command(&app, status.as_deref(), *limit),
        Commands::Cancel { id } => handle_cancel_command(&app, id),
        Commands::Recover => handle_recover_command(&app),
        Commands::Enqueue {
            user,
            target,
            post,
            text,
            delay,
        } => handle_enqueue_command(&app, user, target, post, text, *delay),
        Commands::Settings { command } => handle_settings_command(&app, command),
    }
}

async fn handle_run_command(app: &App) -> Result<()> {
    let stats = app.recover()?;
    if stats.total() > 0 {
        println!("{} {} stale entries failed", "Recovered:".yellow(), stats.marked_failed);
    }

    let scheduler = app.build_scheduler()?;
    scheduler.start()?;
    println!(
        "{} every {:?} (Ctrl-C to stop)",
        "Scheduler running".green(),
        scheduler.config().tick_interval
    );

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    println!("{}", "Stopping scheduler...".cyan());
    scheduler.stop().await?;
    let status = scheduler.status()?;
    info!("Scheduler stopped after {} ticks", status.tick_count);
    println!("{} after {} ticks", "Stopped".green(), status.tick_count);
    Ok(())
}

async fn handle_trigger_command(app: &App, phase: TriggerPhase) -> Result<()> {
    let scheduler = app.build_scheduler()?;
    info!("Triggering phase: {:?}", phase);

    match phase {
        TriggerPhase::All => print_tick_report(&scheduler.trigger_all().await),
        TriggerPhase::Replies => print_phase_report("replies", &scheduler.trigger_reply_processing().await?),
        TriggerPhase::Tweets => print_phase_report("tweets", &scheduler.trigger_tweet_processing().await?),
    }
    Ok(())
}

fn handle_status_command(app: &App) -> Result<()> {
    let counts = app.store.count_by_status()?;

    println!("{}", "Reply queue".bold());
    for (status, count) in &counts {
        println!("  {:<10} {}", colorize_status(*status), count);
    }

    let due = app.store.list_due(app.clock.now(), usize::MAX)?;
    println!("  {:<10} {}", "due now".cyan(), due.len());

    let stale_before = app.clock.now() - to_chrono(Duration::from_secs(app.config.scheduler.stale_claim_lease_secs));
    let stale = app.store.list_stale_in_flight(stale_before)?;
    if !stale.is_empty() {
        println!(
            "{} {} in-flight entries are older than the claim lease; run `replypilot recover`",
            "Warning:".yellow(),
            stale.len()
        );
    }
    Ok(())
}

fn handle_list_command(app: &App, status: Option<&str>, limit: usize) -> Result<()> {
    let status = status
        .map(|s| s.parse::<EntryStatus>().map_err(|e| eyre!(e)))
        .transpose()?;
    info!("Listing entries - status: {:?}, limit: {}", status, limit);

    let entries = app.store.list(status, limit)?;
    if entries.is_empty() {
        println!("{}", "No entries".dimmed());
        return Ok(());
    }
    for entry in &entries {
        print_entry(entry);
    }
    Ok(())
}

fn handle_cancel_command(app: &App, id: &str) -> Result<()> {
    info!("Cancelling entry: {}", id);
    let entry = app.store.cancel(id, app.clock.now())?;
    println!("{} {}", "Cancelled:".green(), entry.id);
    Ok(())
}

fn handle_recover_command(app: &App) -> Result<()> {
    let stats = app.recover()?;
    println!(
        "{} {} failed, {} already resolved, {} errors",
        "Recovery:".green(),
        stats.marked_failed,
        stats.already_resolved,
        stats.failed
    );
    Ok(())
}

fn handle_enqueue_command(app: &App, user: &str, target: &str, post: &str, text: &str, delay: u64) -> Result<()> {
    let now = app.clock.now();
    let scheduled_for = now + to_chrono(Duration::from_secs(delay));
    let new = NewReplyEntry::auto(user, target, post, text, scheduled_for).manual();

    match app.store.enqueue(new, now)? {
        Enqueued::Created(entry) => println!("{} {} at {}", "Queued:".green(), entry.id, entry.scheduled_for),
        Enqueued::Existing(entry) => println!(
            "{} {} is already {} for this post",
            "Exists:".yellow(),
            entry.id,
            entry.status
        ),
    }
    Ok(())
}

fn handle_settings_command(app: &App, command: &SettingsCommands) -> Result<()> {
    match command {
        SettingsCommands::Show { user } => match app.store.get_settings(user)? {
            Some(settings) => print_settings(&settings),
            None => println!("{} no settings for {}", "Missing:".yellow(), user),
        },
        SettingsCommands::Set {
            user,
            enabled,
            max_age,
            skip_retweets,
            window_limit,
        } => {
            let mut settings = app
                .store
                .get_settings(user)?
                .unwrap_or_else(|| AutopilotSettings::enabled(user.clone()));
            if let Some(enabled) = enabled {
                settings.is_enabled = *enabled;
            }
            if let Some(minutes) = max_age {
                settings.max_tweet_age_minutes = *minutes;
            }
            if let Some(skip) = skip_retweets {
                settings.skip_retweets = *skip;
            }
            if let Some(limit) = window_limit {
                settings.max_replies_per_window = Some(*limit);
            }
            app.store.upsert_settings(&settings)?;
            info!("Updated settings for {}", user);
            print_settings(&settings);
        }
    }
    Ok(())
}

fn colorize_status(status: EntryStatus) -> ColoredString {
    match status {
        EntryStatus::Pending => status.as_str().cyan(),
        EntryStatus::InFlight => status.as_str().yellow(),
        EntryStatus::Sent => status.as_str().green(),
        EntryStatus::Failed => status.as_str().red(),
        EntryStatus::Cancelled => status.as_str().dimmed(),
    }
}

fn print_entry(entry: &ReplyQueueEntry) {
    println!(
        "{} {:<10} {} -> {} (post {})",
        entry.id.bold(),
        colorize_status(entry.status),
        entry.owner_user_id,
        entry.target_account_ref,
        entry.source_post_ref
    );
    println!("    scheduled {}  attempts {}", entry.scheduled_for, entry.attempt_count);
    println!("    {}", entry.reply_text);
    if let Some(error) = &entry.last_error {
        println!("    {} {}", "error:".red(), error);
    }
}

fn print_settings(settings: &AutopilotSettings) {
    println!("{}", settings.owner_user_id.bold());
    println!("  enabled        {}", settings.is_enabled);
    println!("  max age (min)  {}", settings.max_tweet_age_minutes);
    println!("  skip retweets  {}", settings.skip_retweets);
    match settings.max_replies_per_window {
        Some(limit) => println!("  window limit   {}", limit),
        None => println!("  window limit   {}", "default".dimmed()),
    }
}

fn print_phase_report(name: &str, report: &PhaseReport) {
    println!(
        "{} processed {}, succeeded {}, requeued {}, failed {}, skipped {}",
        format!("{}:", name).green(),
        report.processed,
        report.succeeded,
        report.requeued,
        report.failed,
        report.skipped
    );
    for error in &report.errors {
        println!("    {} {}", "error:".red(), error);
    }
}

fn print_tick_report(report: &TickReport) {
    if report.recovery.marked_failed > 0 {
        println!("{} {} stale in-flight entries failed", "recovery:".green(), report.recovery.marked_failed);
    }
    print_phase_report("tweets", &report.tweets);
    print_phase_report("replies", &report.replies);
    for error in &report.errors {
        println!("{} {}", "Phase error:".red(), error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.is_verbose()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, config).await.context("Application failed")?;

    Ok(())
}
