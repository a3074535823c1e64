//! CLI definition using clap derive.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use signalslice_core::DashboardConfig;

use crate::render::Panel;

pub const DEFAULT_BACKEND: &str = "http://127.0.0.1:5000";

#[derive(Debug, Parser)]
#[command(name = "signalslice", about = "SignalSlice activity feed dashboard")]
pub struct Cli {
    /// Backend base URL (push channel at /ws, polling at /api/activity_feed)
    #[arg(long, global = true, env = "SIGNALSLICE_BACKEND", default_value = DEFAULT_BACKEND)]
    pub backend: String,

    /// TOML file with dashboard settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Color output: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Live dashboard (default). Keys: s = manual scan, r = retry, q = quit
    Watch(WatchOpts),
    /// Fetch the activity feed once and print it, newest first
    Feed(FeedOpts),
    /// Ask the backend for a manual scan and exit
    Scan(ScanOpts),
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct WatchOpts {
    /// Maximum activity items kept on screen
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Polling interval in milliseconds (fallback mode)
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Push-channel connect timeout in milliseconds
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Switch back to the push channel once it becomes reachable again
    #[arg(long)]
    pub recover_to_live: bool,

    /// Stay offline instead of polling when the push channel is unavailable
    #[arg(long)]
    pub no_poll_fallback: bool,

    /// Stamp local events at this UTC offset in minutes (e.g. -300 for US Eastern)
    #[arg(long, allow_hyphen_values = true)]
    pub utc_offset_minutes: Option<i32>,

    /// Panels to draw, comma separated (header,gauges,stats,notice,feed)
    #[arg(long, value_delimiter = ',', value_parser = parse_panel)]
    pub panels: Vec<Panel>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct FeedOpts {
    /// Print at most this many items
    #[arg(long, default_value = "10")]
    pub limit: usize,

    /// Request timeout in milliseconds
    #[arg(long, default_value = "5000")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ScanOpts {
    /// Connect timeout in milliseconds
    #[arg(long, default_value = "5000")]
    pub timeout_ms: u64,
}

impl WatchOpts {
    /// Layer command-line overrides on top of `config`.
    pub fn apply(&self, config: &mut DashboardConfig) {
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if self.recover_to_live {
            config.recover_to_live = true;
        }
        if self.no_poll_fallback {
            config.poll_fallback = false;
        }
        if self.utc_offset_minutes.is_some() {
            config.utc_offset_minutes = self.utc_offset_minutes;
        }
    }
}

/// Defaults, then the config file, then command-line overrides.
pub fn load_config(path: Option<&Path>, opts: &WatchOpts) -> anyhow::Result<DashboardConfig> {
    let mut config = match path {
        Some(path) => DashboardConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DashboardConfig::default(),
    };
    opts.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn parse_panel(raw: &str) -> Result<Panel, String> {
    Panel::from_name(raw).ok_or_else(|| format!("unknown panel: {raw}"))
}
