// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box test harness: spawns the compiled `chroxy-gatewayd` binary as a
//! real subprocess and drives it over its actual HTTP/WebSocket surface, the
//! same way a remote client would.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Builder for a [`ChroxyProcess`], letting scenario tests override only
/// the settings that matter to them.
pub struct ChroxyBuilder {
    auth_token: Option<String>,
    max_sessions: usize,
    agent_bin: PathBuf,
    auth_timeout_secs: u64,
}

impl Default for ChroxyBuilder {
    fn default() -> Self {
        Self {
            auth_token: None,
            max_sessions: 4,
            agent_bin: PathBuf::from("/bin/cat"),
            auth_timeout_secs: 10,
        }
    }
}

impl ChroxyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Override how long the gateway waits for the in-band `auth` message
    /// before dropping the connection, for scenarios that exercise the
    /// timeout itself without a real test waiting out the production default.
    pub fn auth_timeout_secs(mut self, secs: u64) -> Self {
        self.auth_timeout_secs = secs;
        self
    }

    /// Override the agent binary the gateway launches for new sessions,
    /// e.g. a test stub that plays a scripted protocol.
    pub fn agent_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.agent_bin = path.into();
        self
    }

    pub async fn spawn(self) -> Result<ChroxyProcess> {
        let bin = gateway_binary_path()?;
        let workdir = tempfile::tempdir().context("creating scratch workdir")?;
        let state_dir = tempfile::tempdir().context("creating scratch state dir")?;
        let port = free_port()?;
        let bind_addr = format!("127.0.0.1:{port}");

        let mut cmd = Command::new(bin);
        cmd.arg("--bind-addr").arg(&bind_addr);
        cmd.arg("--workdir").arg(workdir.path());
        cmd.arg("--state-dir").arg(state_dir.path());
        cmd.arg("--agent-bin").arg(&self.agent_bin);
        cmd.arg("--max-sessions").arg(self.max_sessions.to_string());
        cmd.arg("--auth-timeout-secs").arg(self.auth_timeout_secs.to_string());
        if let Some(token) = &self.auth_token {
            cmd.arg("--auth-token").arg(token);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let child = cmd.spawn().context("spawning chroxy-gatewayd")?;

        let process = ChroxyProcess {
            child,
            bind_addr,
            auth_token: self.auth_token,
            _workdir: workdir,
            _state_dir: state_dir,
        };
        process.wait_until_healthy(Duration::from_secs(5)).await?;
        Ok(process)
    }
}

/// A running `chroxy-gatewayd` subprocess, torn down when dropped.
pub struct ChroxyProcess {
    child: Child,
    bind_addr: String,
    auth_token: Option<String>,
    _workdir: TempDir,
    _state_dir: TempDir,
}

impl ChroxyProcess {
    async fn wait_until_healthy(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let url = format!("http://{}/healthz", self.bind_addr);
        loop {
            if tokio::time::Instant::now() >= deadline {
                bail!("gateway did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = reqwest::get(&url).await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub fn http_base(&self) -> String {
        format!("http://{}", self.bind_addr)
    }

    /// Connect a WebSocket client and complete the in-band auth handshake
    /// using whichever token (if any) this process was configured with.
    /// Panics-through-`Result` if the gateway sends `auth_fail` instead of
    /// `auth_ok`, since every scenario that calls this expects to succeed.
    pub async fn connect(&self) -> Result<WsClient> {
        let mut client = self.connect_unauthenticated().await?;
        client.auth(self.auth_token.as_deref()).await?;
        Ok(client)
    }

    /// Open the raw WebSocket without performing the auth handshake, for
    /// scenarios that need to inspect pre-auth behavior (timeouts, dropped
    /// messages, wrong tokens).
    pub async fn connect_unauthenticated(&self) -> Result<WsClient> {
        let url = format!("ws://{}/ws", self.bind_addr);
        let (stream, _) = connect_async(url).await.context("connecting websocket")?;
        Ok(WsClient { stream })
    }

    /// Connect and send `auth` with an explicit, possibly-wrong token,
    /// returning whatever the gateway replies with (`auth_ok` or
    /// `auth_fail`) instead of treating failure as an error.
    pub async fn connect_with_token(&self, token: &str) -> Result<(WsClient, serde_json::Value)> {
        let mut client = self.connect_unauthenticated().await?;
        let reply = client.auth_raw(Some(token)).await?;
        Ok((client, reply))
    }
}

impl Drop for ChroxyProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// A thin JSON-line wrapper around a connected WebSocket.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WsClient {
    /// Send the in-band `auth` message and await the gateway's reply,
    /// bailing out if it answers `auth_fail` instead of `auth_ok`.
    pub async fn auth(&mut self, token: Option<&str>) -> Result<()> {
        let reply = self.auth_raw(token).await?;
        if reply["type"] != "auth_ok" {
            bail!("authentication failed: {reply}");
        }
        Ok(())
    }

    /// Send the in-band `auth` message and return whatever the gateway
    /// replies with, without judging success or failure.
    pub async fn auth_raw(&mut self, token: Option<&str>) -> Result<serde_json::Value> {
        self.send(serde_json::json!({
            "type": "auth",
            "token": token,
            "device": { "id": "spec-harness", "name": "spec harness", "platform": "test" },
        }))
        .await?;
        self.recv_timeout(Duration::from_secs(5)).await
    }

    pub async fn send(&mut self, value: serde_json::Value) -> Result<()> {
        use futures_util::SinkExt;
        self.stream.send(Message::Text(value.to_string().into())).await.context("sending frame")
    }

    pub async fn recv(&mut self) -> Result<serde_json::Value> {
        use futures_util::StreamExt;
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text).context("parsing server message")
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(other)) => bail!("unexpected frame: {other:?}"),
                Some(Err(e)) => bail!("websocket error: {e}"),
                None => bail!("connection closed before a message arrived"),
            }
        }
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<serde_json::Value> {
        tokio::time::timeout(timeout, self.recv()).await.context("timed out waiting for message")?
    }

    pub async fn close(mut self) -> Result<()> {
        use futures_util::SinkExt;
        self.stream.close(None).await.context("closing websocket")
    }
}

fn gateway_binary_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_chroxy-gatewayd") {
        return Ok(PathBuf::from(path));
    }
    bail!("CARGO_BIN_EXE_chroxy-gatewayd not set; run via `cargo test` from the workspace")
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("binding ephemeral port")?;
    Ok(listener.local_addr()?.port())
}
