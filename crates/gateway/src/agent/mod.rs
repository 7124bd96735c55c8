// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawning, feeding, and tearing down the local agent process.

mod process;

pub use process::{AgentEvent, AgentHandle, AgentProcessError};
