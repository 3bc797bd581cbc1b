// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, atomic persistence of [`LinkSampleSet`]s.

mod file;

pub use file::FileStorage;

use crate::sample::{LinkKey, LinkSampleSet};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Storage abstraction the collector depends on, so tests can swap in an
/// in-memory backend without touching disk.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Serialize and atomically persist `set` under its link key.
    async fn save(&self, set: &LinkSampleSet) -> anyhow::Result<()>;

    /// Enumerate and deserialize every canonical (non-archive) file on disk.
    async fn load_all(&self) -> anyhow::Result<HashMap<LinkKey, LinkSampleSet>>;

    /// Archive the canonical file for `key`. A no-op if it does not exist.
    async fn rotate(&self, key: &LinkKey) -> anyhow::Result<()>;

    /// Remove archive files older than `max_age`.
    async fn cleanup_archives(&self, max_age: Duration) -> anyhow::Result<usize>;
}
