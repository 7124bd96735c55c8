// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

/// Runtime configuration for the gateway daemon.
///
/// Every field is settable from the environment with a `CHROXY_` prefix so
/// the daemon can be driven entirely by systemd unit files or container env
/// blocks, with CLI flags available for local overrides.
#[derive(Debug, Clone, Parser)]
#[command(name = "chroxy-gatewayd", version, about = "Chroxy WebSocket gateway")]
pub struct GatewayConfig {
    /// Address to bind the HTTP/WebSocket listener on.
    #[arg(long, env = "CHROXY_BIND_ADDR", default_value = "127.0.0.1:8787")]
    pub bind_addr: String,

    /// Bearer token required to authenticate WebSocket and HTTP clients.
    /// When unset, the gateway only accepts connections from loopback.
    #[arg(long, env = "CHROXY_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Working directory the agent process is spawned into by default.
    #[arg(long, env = "CHROXY_WORKDIR", default_value = ".")]
    pub workdir: PathBuf,

    /// Path to the agent binary to launch (e.g. a coding-agent CLI entrypoint).
    #[arg(long, env = "CHROXY_AGENT_BIN", default_value = "claude")]
    pub agent_bin: PathBuf,

    /// Maximum number of concurrent agent sessions.
    #[arg(long, env = "CHROXY_MAX_SESSIONS", default_value_t = 8)]
    pub max_sessions: usize,

    /// Number of prior wire events retained per session for replay on
    /// reconnect.
    #[arg(long, env = "CHROXY_HISTORY_CAPACITY", default_value_t = 100)]
    pub history_capacity: usize,

    /// Sliding-window size, in seconds, over which failed `auth` attempts
    /// from one address are counted before a cooldown kicks in.
    #[arg(long, env = "CHROXY_RATE_LIMIT_WINDOW_SECS", default_value_t = 60)]
    pub rate_limit_window_secs: u64,

    /// Number of failed `auth` attempts a single address may make within the
    /// window before an exponential cooldown begins.
    #[arg(long, env = "CHROXY_RATE_LIMIT_MAX", default_value_t = 5)]
    pub rate_limit_max: u32,

    /// Time, in seconds, a client has to complete authentication after the
    /// WebSocket upgrade before the connection is dropped.
    #[arg(long, env = "CHROXY_AUTH_TIMEOUT_SECS", default_value_t = 10)]
    pub auth_timeout_secs: u64,

    /// Idle-ping interval, in seconds; a client that misses two consecutive
    /// pings is disconnected.
    #[arg(long, env = "CHROXY_PING_INTERVAL_SECS", default_value_t = 20)]
    pub ping_interval_secs: u64,

    /// Directory used for the atomically-written session state file.
    #[arg(long, env = "CHROXY_STATE_DIR", default_value = "/var/lib/chroxy")]
    pub state_dir: PathBuf,

    /// Emit structured JSON logs instead of human-readable text.
    #[arg(long, env = "CHROXY_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl GatewayConfig {
    /// Parse configuration from CLI args and environment, then validate it.
    pub fn load() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            bail!("max_sessions must be at least 1");
        }
        if self.history_capacity == 0 {
            bail!("history_capacity must be at least 1");
        }
        if self.rate_limit_max == 0 {
            bail!("rate_limit_max must be at least 1");
        }
        if self.rate_limit_window_secs == 0 {
            bail!("rate_limit_window_secs must be at least 1");
        }
        if self.ping_interval_secs == 0 {
            bail!("ping_interval_secs must be at least 1");
        }
        if !self.workdir.as_os_str().is_empty() && !self.workdir.exists() {
            bail!("workdir {:?} does not exist", self.workdir);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
