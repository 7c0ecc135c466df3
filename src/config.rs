// src/config.rs
// Runtime configuration: command-line flags with PULSE_* environment fallbacks.
//
// | Flag                 | Env                   | Default                          |
// |----------------------|-----------------------|----------------------------------|
// | --data-file          | PULSE_DATA_FILE       | data.json                        |
// | --topic-file         | PULSE_TOPIC_FILE      | topic.json                       |
// | --snapshot-file      | PULSE_SNAPSHOT_FILE   | simulation_state.json            |
// | --host / --port      | PULSE_HOST/PULSE_PORT | 127.0.0.1 / 8080                 |
// | --refresh-secs       | PULSE_REFRESH_SECS    | 5                                |
// | --token-source       | PULSE_TOKEN_SOURCE    | mtime (or watch)                 |
// | --always-refresh     | PULSE_ALWAYS_REFRESH  | false                            |
// | --topic-poll-ms      | PULSE_TOPIC_POLL_MS   | 1000                             |
// | --min/max-delay-secs | PULSE_MIN/MAX_DELAY_SECS | 5 / 20                        |
// | --api-key            | PULSE_API_KEY         | unset = scripted offline brain   |
// | --log-level          | PULSE_LOG_LEVEL       | info                             |

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::brain::RetryPolicy;
use crate::dashboard::DashboardLayout;
use crate::producer::ProducerSettings;

/// Pulse - social simulation dashboard backend
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(about = "Simulated agents comment on a topic; the dashboard follows the data file")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub settings: Settings,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Dashboard API + producer (default)
    Serve,
    /// Producer only; Ctrl-C stops it and writes the snapshot
    Produce,
    /// Write the data file as CSV and log a per-agent summary
    Export {
        #[arg(long, default_value = "comments.csv")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TokenStrategy {
    /// Poll the data file's modification time
    Mtime,
    /// Filesystem notifications bump a counter
    Watch,
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Shared comment file (JSON array)
    #[arg(long, env = "PULSE_DATA_FILE", default_value = "data.json")]
    pub data_file: PathBuf,

    /// Topic control file written by the dashboard
    #[arg(long, env = "PULSE_TOPIC_FILE", default_value = "topic.json")]
    pub topic_file: PathBuf,

    /// Agent snapshot written on cancel, read on resume
    #[arg(long, env = "PULSE_SNAPSHOT_FILE", default_value = "simulation_state.json")]
    pub snapshot_file: PathBuf,

    #[arg(long, env = "PULSE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "PULSE_PORT", default_value = "8080")]
    pub port: u16,

    /// Dashboard refresh interval in seconds
    #[arg(long, env = "PULSE_REFRESH_SECS", default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_secs: u64,

    #[arg(long, env = "PULSE_TOKEN_SOURCE", value_enum, default_value = "mtime")]
    pub token_source: TokenStrategy,

    /// Recompute on every tick even when the file has not changed
    #[arg(long, env = "PULSE_ALWAYS_REFRESH")]
    pub always_refresh: bool,

    #[arg(long, env = "PULSE_TOPIC_POLL_MS", default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    pub topic_poll_ms: u64,

    #[arg(long, env = "PULSE_MIN_DELAY_SECS", default_value = "5")]
    pub min_delay_secs: u64,

    #[arg(long, env = "PULSE_MAX_DELAY_SECS", default_value = "20")]
    pub max_delay_secs: u64,

    /// Restore agents from the snapshot file when a session starts
    #[arg(long, env = "PULSE_RESUME")]
    pub resume: bool,

    /// Delete the data file when a new topic session starts
    #[arg(long, env = "PULSE_RESET_ON_START")]
    pub reset_on_start: bool,

    /// Generation attempts per comment (model switch + backoff between)
    #[arg(long, env = "PULSE_MAX_ATTEMPTS", default_value = "4")]
    pub max_attempts: u32,

    /// Chat-completion API key; without it the scripted brain is used
    #[arg(long, env = "PULSE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "PULSE_BASE_URL", default_value = "https://api.groq.com/openai/v1")]
    pub base_url: String,

    /// Comma-separated model rotation list (empty = built-in list)
    #[arg(long, env = "PULSE_MODELS", value_delimiter = ',')]
    pub models: Vec<String>,

    #[arg(long, env = "PULSE_REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Columns offered as filters on the line chart
    #[arg(long, env = "PULSE_LINE_FILTERS", value_delimiter = ',', default_value = "agent_name,style,tone")]
    pub line_filters: Vec<String>,

    /// Columns offered as filters on the bar chart
    #[arg(long, env = "PULSE_BAR_FILTERS", value_delimiter = ',', default_value = "topic")]
    pub bar_filters: Vec<String>,

    #[arg(long, env = "PULSE_MAX_WORDS", default_value = "200")]
    pub max_words: usize,

    /// tracing filter directive, e.g. `info` or `pulse_core=debug`
    #[arg(long, env = "PULSE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Settings {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            ..RetryPolicy::default()
        }
    }

    pub fn producer_settings(&self) -> ProducerSettings {
        ProducerSettings {
            topic_path: self.topic_file.clone(),
            snapshot_path: self.snapshot_file.clone(),
            topic_poll: Duration::from_millis(self.topic_poll_ms),
            min_delay: Duration::from_secs(self.min_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            resume: self.resume,
            reset_on_start: self.reset_on_start,
            retry: self.retry_policy(),
        }
    }

    pub fn layout(&self) -> DashboardLayout {
        DashboardLayout {
            line_filters: non_empty(&self.line_filters),
            bar_filters: non_empty(&self.bar_filters),
            max_words: self.max_words,
            ..DashboardLayout::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}
