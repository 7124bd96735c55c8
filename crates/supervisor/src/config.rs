// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

/// Configuration for the process supervisor, which owns the lifecycle of
/// the `chroxy-gatewayd` child process: spawning it, restarting it with
/// backoff on unexpected exit, and tracking its pid on disk.
#[derive(Debug, Clone, Parser)]
#[command(name = "chroxy", version, about = "Chroxy gateway supervisor")]
pub struct SupervisorConfig {
    /// Path to the `chroxy-gatewayd` binary to supervise.
    #[arg(long, env = "CHROXY_GATEWAY_BIN", default_value = "chroxy-gatewayd")]
    pub gateway_bin: PathBuf,

    /// Address the supervisor polls for liveness.
    #[arg(long, env = "CHROXY_HEALTH_ADDR", default_value = "127.0.0.1:8787")]
    pub health_addr: String,

    /// Initial backoff, in milliseconds, before the first restart attempt.
    #[arg(long, env = "CHROXY_RESTART_INITIAL_BACKOFF_MS", default_value_t = 500)]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling, in milliseconds.
    #[arg(long, env = "CHROXY_RESTART_MAX_BACKOFF_MS", default_value_t = 30_000)]
    pub max_backoff_ms: u64,

    /// Multiplier applied to the backoff after each consecutive failure.
    #[arg(long, env = "CHROXY_RESTART_BACKOFF_MULTIPLIER", default_value_t = 2.0)]
    pub backoff_multiplier: f64,

    /// Number of consecutive rapid restarts (within one backoff cycle reset
    /// window) tolerated before the supervisor gives up and exits non-zero.
    #[arg(long, env = "CHROXY_RESTART_MAX_ATTEMPTS", default_value_t = 10)]
    pub max_restart_attempts: u32,

    /// Interval, in seconds, between health-check polls of a running
    /// gateway.
    #[arg(long, env = "CHROXY_HEALTH_INTERVAL_SECS", default_value_t = 5)]
    pub health_interval_secs: u64,

    /// Path to the pidfile tracking the supervised gateway's pid.
    #[arg(long, env = "CHROXY_PIDFILE", default_value = "/var/run/chroxy/gateway.pid")]
    pub pidfile: PathBuf,

    /// Emit structured JSON logs instead of human-readable text.
    #[arg(long, env = "CHROXY_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl SupervisorConfig {
    pub fn load() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_backoff_ms == 0 {
            bail!("initial_backoff_ms must be at least 1");
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            bail!("max_backoff_ms must be >= initial_backoff_ms");
        }
        if self.backoff_multiplier <= 1.0 {
            bail!("backoff_multiplier must be greater than 1.0");
        }
        if self.max_restart_attempts == 0 {
            bail!("max_restart_attempts must be at least 1");
        }
        if self.health_interval_secs == 0 {
            bail!("health_interval_secs must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
