// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Link keys and RTT sample sets.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Canonicalized identifier for a measurement pair.
///
/// The lexicographically smaller device identity always sorts first, so
/// both endpoints of a physical link derive the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkKey {
    pub device_a: String,
    pub device_z: String,
    pub link: String,
}

impl LinkKey {
    /// Build a canonical key from two endpoint device identities and a link identity.
    pub fn canonical(device_x: &str, device_y: &str, link: &str) -> Self {
        let (device_a, device_z) =
            if device_x <= device_y { (device_x, device_y) } else { (device_y, device_x) };
        Self { device_a: device_a.to_owned(), device_z: device_z.to_owned(), link: link.to_owned() }
    }

    /// Render as a flat string using `separator` between fields, for use as a lookup key.
    pub fn as_string(&self) -> String {
        format!("{}::{}::{}", self.device_a, self.device_z, self.link)
    }

    /// Filesystem-safe encoding of this key: `::` is replaced with `__` so the
    /// result is usable as a file name. Reversible via [`LinkKey::from_filename`].
    pub fn to_filename_stem(&self) -> String {
        sanitize(&self.as_string())
    }

    /// Recover a key previously produced by [`LinkKey::to_filename_stem`].
    pub fn from_filename_stem(stem: &str) -> Option<Self> {
        let raw = unsanitize(stem);
        let mut parts = raw.splitn(3, "::");
        let device_a = parts.next()?.to_owned();
        let device_z = parts.next()?.to_owned();
        let link = parts.next()?.to_owned();
        Some(Self { device_a, device_z, link })
    }
}

/// Replace the `::` key separator with a filesystem-safe marker.
fn sanitize(key: &str) -> String {
    key.replace("::", "__")
}

/// Inverse of [`sanitize`].
fn unsanitize(stem: &str) -> String {
    stem.replace("__", "::")
}

/// A single round-trip-time measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RttSample {
    /// RTT in microseconds, clipped to a 32-bit value.
    pub rtt_us: u32,
    /// Wall-clock receipt time, microseconds since the Unix epoch.
    pub timestamp_us: u64,
    pub packet_id: u32,
}

/// Append-only, bounded, time-ordered sample buffer for one link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSampleSet {
    pub key: LinkKey,
    pub local_device: String,
    pub peer_device: String,
    pub window_start_us: u64,
    pub sampling_interval_secs: u64,
    pub samples: Vec<RttSample>,
}

impl LinkSampleSet {
    pub fn new(key: LinkKey, local_device: String, peer_device: String, sampling_interval_secs: u64) -> Self {
        Self {
            key,
            local_device,
            peer_device,
            window_start_us: now_us(),
            sampling_interval_secs,
            samples: Vec::new(),
        }
    }

    /// Whether the next append would find the set already at `max_len`,
    /// i.e. whether a caller must rotate (archive + truncate) before, or
    /// instead of, appending.
    pub fn needs_rotation(&self, max_len: usize) -> bool {
        self.samples.len() >= max_len
    }

    /// Truncate the in-memory set to its newest `max_len / 2` samples and
    /// reset the window-start timestamp. Callers archive the pre-truncation
    /// file (via a [`crate::storage::StorageBackend`]) before calling this.
    pub fn truncate_to_newest_half(&mut self, max_len: usize) {
        let target_len = max_len / 2;
        let drop_count = self.samples.len().saturating_sub(target_len);
        self.samples.drain(0..drop_count);
        self.window_start_us = now_us();
    }

    /// Append a sample, rotating first if the set has reached `max_len`.
    ///
    /// The sample that triggers rotation is the cost of keeping the set's
    /// length an exact `max_len / 2` immediately after rotation — it is not
    /// retroactively appended; the next call appends normally. Returns `true`
    /// if rotation fired this call.
    pub fn append_with_rotation(&mut self, sample: RttSample, max_len: usize) -> bool {
        if !self.needs_rotation(max_len) {
            self.samples.push(sample);
            return false;
        }
        self.truncate_to_newest_half(max_len);
        true
    }
}

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_us() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_micros() as u64
}
