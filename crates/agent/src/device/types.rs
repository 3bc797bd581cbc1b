// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Mapping from VRF name to a deduplicated, sorted set of peer IP strings.
///
/// Rebuilt every cycle from the device adapter's raw read; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborMap(BTreeMap<String, Vec<String>>);

impl NeighborMap {
    /// Canonicalize a raw per-VRF neighbor read: dedup and sort each VRF's list.
    pub fn canonicalize(raw: BTreeMap<String, Vec<String>>) -> Self {
        let mut out = BTreeMap::new();
        for (vrf, ips) in raw {
            let mut unique: Vec<String> = ips.into_iter().collect::<HashSet<_>>().into_iter().collect();
            unique.sort();
            out.insert(vrf, unique);
        }
        Self(out)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|ips| ips.is_empty())
    }

    pub fn by_vrf(&self) -> &BTreeMap<String, Vec<String>> {
        &self.0
    }

    /// Flat, sorted, deduplicated list of every IP across all VRFs — the
    /// shape the controller RPC request carries alongside the per-VRF map.
    pub fn flat_sorted(&self) -> Vec<String> {
        let mut all: Vec<String> =
            self.0.values().flatten().cloned().collect::<HashSet<_>>().into_iter().collect();
        all.sort();
        all
    }
}

/// Lifecycle state of a configuration session on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Committed,
    Aborted,
}

/// A named scratch workspace on the device, as reported by a session listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSession {
    pub name: String,
    pub state: SessionState,
}

/// Prefix every session name created by this agent carries, so the
/// stale-session sweep can recognize its own orphans.
pub const SESSION_PREFIX: &str = "doublezero-agent-";

/// Generate a unique session name: `<prefix><monotonic-suffix>`.
///
/// The suffix combines wall-clock nanoseconds with a process-local counter so
/// two calls within the same nanosecond still produce distinct names.
pub fn generate_session_name(counter: &std::sync::atomic::AtomicU64) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let seq = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    format!("{SESSION_PREFIX}{nanos}-{seq}")
}

/// The device-global configuration lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLock {
    pub holder: String,
    pub label: String,
    /// Epoch seconds at acquisition.
    pub acquired_at_secs: u64,
}

impl ConfigLock {
    pub fn age(&self, now: SystemTime) -> Duration {
        let now_secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        Duration::from_secs(now_secs.saturating_sub(self.acquired_at_secs))
    }
}
