// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::StorageBackend;
use crate::sample::{LinkKey, LinkSampleSet};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Suffix that marks a file as a rotated archive, per the on-disk contract
/// in spec.md §4.4 — anything ending in this suffix is ignored by `load_all`.
const ARCHIVE_SUFFIX: &str = ".archive.json";

/// Disk-backed [`StorageBackend`]: one JSON file per canonical link key.
///
/// Concurrent saves of the *same* key are serialized by a single lock held
/// for the duration of the write, per spec.md §4.4.
pub struct FileStorage {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStorage {
    /// Create a storage backend rooted at `dir`, creating it if necessary.
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, write_lock: Arc::new(Mutex::new(())) })
    }

    fn canonical_path(&self, key: &LinkKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.to_filename_stem()))
    }

    fn archive_path(&self, key: &LinkKey, timestamp: &str) -> PathBuf {
        self.dir.join(format!("{}_{timestamp}{ARCHIVE_SUFFIX}", key.to_filename_stem()))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn save(&self, set: &LinkSampleSet) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.canonical_path(&set.key);
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        let body = serde_json::to_vec_pretty(set)?;

        let tmp_path_write = tmp_path.clone();
        let body_write = body.clone();
        tokio::task::spawn_blocking(move || std::fs::write(&tmp_path_write, &body_write))
            .await??;
        tokio::task::spawn_blocking(move || std::fs::rename(&tmp_path, &path)).await??;
        Ok(())
    }

    async fn load_all(&self) -> anyhow::Result<HashMap<LinkKey, LinkSampleSet>> {
        let dir = self.dir.clone();
        let entries = tokio::task::spawn_blocking(move || list_canonical_files(&dir)).await??;

        let mut out = HashMap::new();
        for path in entries {
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => match serde_json::from_str::<LinkSampleSet>(&contents) {
                    Ok(set) => {
                        out.insert(set.key.clone(), set);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), err = %e, "skipping undecodable sample file");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), err = %e, "failed to read sample file");
                }
            }
        }
        Ok(out)
    }

    async fn rotate(&self, key: &LinkKey) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.canonical_path(key);
        if !path.exists() {
            return Ok(());
        }
        let timestamp = format_timestamp(SystemTime::now());
        let archive = self.archive_path(key, &timestamp);
        tokio::fs::rename(&path, &archive).await?;
        Ok(())
    }

    async fn cleanup_archives(&self, max_age: Duration) -> anyhow::Result<usize> {
        let dir = self.dir.clone();
        let cutoff = SystemTime::now().checked_sub(max_age).unwrap_or(UNIX_EPOCH);
        let removed = tokio::task::spawn_blocking(move || remove_old_archives(&dir, cutoff)).await??;
        Ok(removed)
    }
}

fn list_canonical_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if name.ends_with(ARCHIVE_SUFFIX) || !name.ends_with(".json") {
            continue;
        }
        out.push(path);
    }
    Ok(out)
}

fn remove_old_archives(dir: &Path, cutoff: SystemTime) -> anyhow::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if !name.ends_with(ARCHIVE_SUFFIX) {
            continue;
        }
        let modified = entry.metadata().and_then(|m| m.modified()).unwrap_or(SystemTime::now());
        if modified < cutoff {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Render `YYYYMMDD_HHMMSS` from a system time, without pulling in a date/time crate.
fn format_timestamp(time: SystemTime) -> String {
    let secs = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let (y, mo, d, h, mi, s) = civil_from_unix(secs as i64);
    format!("{y:04}{mo:02}{d:02}_{h:02}{mi:02}{s:02}")
}

/// Convert Unix seconds to a UTC civil date/time tuple `(year, month, day, hour, min, sec)`,
/// using Howard Hinnant's `civil_from_days` algorithm — avoids an extra chrono dependency
/// for this single formatting need.
fn civil_from_unix(total_secs: i64) -> (i64, u32, u32, u32, u32, u32) {
    let days = total_secs.div_euclid(86_400);
    let secs_of_day = total_secs.rem_euclid(86_400);
    let h = (secs_of_day / 3600) as u32;
    let mi = ((secs_of_day % 3600) / 60) as u32;
    let s = (secs_of_day % 60) as u32;

    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d, h, mi, s)
}
