//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: start the scheduler loop until interrupted
//! - trigger: run one phase (or a full tick) on demand
//! - status/list: inspect the queue
//! - cancel/enqueue/settings: operator edits

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Replypilot - scheduled, rate-limited reply posting
#[derive(Parser, Debug)]
#[command(name = "replypilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler loop in the foreground until Ctrl-C
    Run,

    /// Run one phase immediately
    Trigger {
        /// Which phase to run
        #[arg(value_enum, default_value_t = TriggerPhase::All)]
        phase: TriggerPhase,
    },

    /// Show queue counts and scheduler state
    Status,

    /// List queue entries
    List {
        /// Filter by status (pending, in_flight, sent, failed, cancelled)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Cancel a pending entry
    Cancel {
        /// Entry ID to cancel
        id: String,
    },

    /// Fail entries left in flight by an interrupted run
    Recover,

    /// Queue a manually written reply
    Enqueue {
        /// User the reply is sent for
        #[arg(short, long)]
        user: String,

        /// Account being replied to
        #[arg(short, long)]
        target: String,

        /// Post being replied to
        #[arg(short, long)]
        post: String,

        /// Reply text
        text: String,

        /// Send no earlier than this many seconds from now
        #[arg(short, long, default_value_t = 0)]
        delay: u64,
    },

    /// Manage per-user autopilot settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

/// Phases that can be triggered by hand
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    /// Discovery then reply processing
    All,
    /// Send due replies
    Replies,
    /// Discover posts and enqueue replies
    Tweets,
}

/// Settings subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommands {
    /// Show settings for a user
    Show {
        user: String,
    },

    /// Create or update settings for a user
    Set {
        user: String,

        /// Enable or disable autopilot
        #[arg(long)]
        enabled: Option<bool>,

        /// Maximum post age in minutes
        #[arg(long)]
        max_age: Option<u32>,

        /// Skip retweets
        #[arg(long)]
        skip_retweets: Option<bool>,

        /// Hourly reply limit override
        #[arg(long)]
        window_limit: Option<u32>,
    },
}
