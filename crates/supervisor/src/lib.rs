// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervises the `chroxy-gatewayd` process: restarts it with exponential
//! backoff on unexpected exit and exposes a tiny status/restart control
//! surface of its own.

pub mod config;
pub mod control;
pub mod error;
pub mod health;
pub mod pidfile;
pub mod restart;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::SupervisorConfig;
use control::SupervisorStatus;
use restart::BackoffPolicy;

/// Minimum time a gateway process must stay up for a restart to be
/// considered successful and the backoff to reset.
const MIN_HEALTHY_UPTIME: Duration = Duration::from_secs(30);

/// Run the supervisor until `shutdown` is cancelled.
pub async fn run(config: SupervisorConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let status = Arc::new(SupervisorStatus::new());
    let mut backoff = BackoffPolicy::new(
        Duration::from_millis(config.initial_backoff_ms),
        Duration::from_millis(config.max_backoff_ms),
        config.backoff_multiplier,
    );
    let mut restart_requests = status.restart_requests();

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        if backoff.attempts() >= config.max_restart_attempts {
            error!(attempts = backoff.attempts(), "giving up after too many rapid restarts");
            anyhow::bail!("gateway process restarted too many times");
        }

        let spawn_result = Command::new(&config.gateway_bin).kill_on_drop(true).spawn();
        let mut child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn gateway process");
                tokio::time::sleep(backoff.next_delay()).await;
                continue;
            }
        };

        let pid = child.id().unwrap_or(0);
        status.current_pid.store(pid as u64, Ordering::Relaxed);
        pidfile::write_pidfile(&config.pidfile, pid).ok();
        info!(pid, "gateway process started");
        let started_at = Instant::now();

        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                break;
            }
            _ = restart_requests.changed() => {
                info!("restart requested via control surface");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
            status_result = child.wait() => {
                match status_result {
                    Ok(status) => warn!(?status, "gateway process exited"),
                    Err(e) => warn!(error = %e, "error waiting on gateway process"),
                }
            }
        }

        pidfile::remove_pidfile(&config.pidfile);
        status.current_pid.store(0, Ordering::Relaxed);
        status.restarts.fetch_add(1, Ordering::Relaxed);

        if started_at.elapsed() >= MIN_HEALTHY_UPTIME {
            backoff.reset();
        } else {
            let delay = backoff.next_delay();
            warn!(delay_ms = delay.as_millis() as u64, "backing off before restart");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }
    }

    Ok(())
}
