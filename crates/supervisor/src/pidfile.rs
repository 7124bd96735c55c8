// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::SupervisorError;

/// Atomically write `pid` to `path`: a sibling temp file is written and
/// synced, narrowed to `0600`, then renamed over the final path.
pub fn write_pidfile(path: &Path, pid: u32) -> Result<(), SupervisorError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(SupervisorError::PidfileWrite)?;

    let tmp_path = dir.join(format!(".chroxy-gateway.pid.tmp-{}", std::process::id()));
    let mut file = fs::File::create(&tmp_path).map_err(SupervisorError::PidfileWrite)?;
    file.write_all(pid.to_string().as_bytes()).map_err(SupervisorError::PidfileWrite)?;
    file.sync_all().map_err(SupervisorError::PidfileWrite)?;

    let mut perms = file.metadata().map_err(SupervisorError::PidfileWrite)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(&tmp_path, perms).map_err(SupervisorError::PidfileWrite)?;

    fs::rename(&tmp_path, path).map_err(SupervisorError::PidfileWrite)?;
    Ok(())
}

/// Read back a previously written pidfile, if any.
pub fn read_pidfile(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

pub fn remove_pidfile(path: &Path) {
    let _ = fs::remove_file(path);
}

#[cfg(test)]
#[path = "pidfile_tests.rs"]
mod tests;
