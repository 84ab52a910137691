//! CLI surface (spec.md §6): state dir, bind address, auth token, and the
//! bridge-cycle interval, each overridable by environment variable so an
//! adapter tailer and the daemon can agree on where to find each other
//! without a shared config file.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sparkd", about = "Spark pre-tool advisory daemon")]
pub struct Opts {
    /// Directory holding the event queue, insight store, and every other
    /// piece of durable state (spec.md §6).
    #[arg(long, env = "SPARKD_STATE_DIR", default_value = "~/.spark")]
    pub state_dir: String,

    /// Host:port to bind the HTTP surface to. Loopback by default
    /// (spec.md §1, §6); binding elsewhere requires --allow-remote.
    #[arg(long, env = "SPARKD_URL", default_value = "127.0.0.1")]
    pub bind_host: String,

    #[arg(long, env = "SPARKD_PORT", default_value_t = 8991)]
    pub port: u16,

    /// Bearer token `/ingest` requires. Falls back to the state dir's
    /// `auth_token` file, then refuses non-loopback binding if still unset.
    #[arg(long, env = "SPARKD_TOKEN")]
    pub token: Option<String>,

    /// Opt into binding a non-loopback address. Must be paired with an
    /// explicit, non-default token (spec.md §1 "not... network-exposed by
    /// default").
    #[arg(long, default_value_t = false)]
    pub allow_remote: bool,

    /// Bridge-cycle interval in seconds, clamped to [10, 600] (spec.md §4.3).
    #[arg(long, env = "SPARKD_BRIDGE_INTERVAL_S", default_value_t = 60)]
    pub bridge_interval_s: u64,

    /// Path to `tuneables.json`. Defaults to `<state_dir>/tuneables.json`.
    #[arg(long)]
    pub tuneables_path: Option<PathBuf>,
}

impl Opts {
    pub fn resolved_state_dir(&self) -> PathBuf {
        expand_tilde(&self.state_dir)
    }

    pub fn bridge_interval(&self) -> u64 {
        self.bridge_interval_s.clamp(10, 600)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
