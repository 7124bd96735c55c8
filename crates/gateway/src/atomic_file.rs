// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};

/// Write `contents` to `path` atomically: a sibling temp file is written and
/// fsync'd, its permissions narrowed to `0600`, then renamed over the final
/// path. A reader of `path` therefore never observes a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().context("path has no parent directory")?;
    fs::create_dir_all(dir).with_context(|| format!("creating {dir:?}"))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("chroxy-state"),
        std::process::id()
    ));

    let mut file = fs::File::create(&tmp_path).with_context(|| format!("creating {tmp_path:?}"))?;
    file.write_all(contents).with_context(|| format!("writing {tmp_path:?}"))?;
    file.sync_all().with_context(|| format!("syncing {tmp_path:?}"))?;

    let mut perms = file.metadata().with_context(|| format!("stat {tmp_path:?}"))?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(&tmp_path, perms).with_context(|| format!("chmod {tmp_path:?}"))?;

    fs::rename(&tmp_path, path).with_context(|| format!("renaming {tmp_path:?} -> {path:?}"))?;
    Ok(())
}

/// Serialize `value` as JSON and write it atomically to `path`.
pub fn write_atomic_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("serializing state")?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
#[path = "atomic_file_tests.rs"]
mod tests;
