// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format for the UDP probe protocol.
//!
//! Both directions are fixed-size so the listener can classify a datagram by
//! length alone: a request is at least 2048 bytes, a response is exactly 20
//! bytes. Everything else is dropped.

use std::sync::atomic::{AtomicU32, Ordering};

/// Total size of a probe request on the wire.
pub const REQUEST_LEN: usize = 2048;
/// Total size of a probe response on the wire.
pub const RESPONSE_LEN: usize = 20;

/// Minimum length at which a datagram is classified as a request.
const REQUEST_MIN_LEN: usize = REQUEST_LEN;

/// Outcome of classifying an inbound datagram by length.
#[derive(Debug, PartialEq, Eq)]
pub enum Classification {
    Request,
    Response,
    Unrecognized,
}

/// Classify a datagram by its byte length, per the wire contract in spec.md §4.3.
pub fn classify(len: usize) -> Classification {
    if len >= REQUEST_MIN_LEN {
        Classification::Request
    } else if len == RESPONSE_LEN {
        Classification::Response
    } else {
        Classification::Unrecognized
    }
}

/// A decoded probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub packet_id: u32,
    pub origin_timestamp_us: u64,
    pub source_device: String,
}

impl ProbeRequest {
    /// Encode into a fixed `REQUEST_LEN`-byte payload, zero-padding the device
    /// identity into the remaining bytes.
    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let mut buf = [0u8; REQUEST_LEN];
        buf[0..4].copy_from_slice(&self.packet_id.to_be_bytes());
        buf[4..12].copy_from_slice(&self.origin_timestamp_us.to_be_bytes());
        let id_bytes = self.source_device.as_bytes();
        let copy_len = id_bytes.len().min(REQUEST_LEN - 12);
        buf[12..12 + copy_len].copy_from_slice(&id_bytes[..copy_len]);
        buf
    }

    /// Decode a datagram already classified as a request. `bytes` may be
    /// longer than `REQUEST_LEN`; only the first `REQUEST_LEN` bytes are used.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < REQUEST_MIN_LEN {
            return None;
        }
        let packet_id = u32::from_be_bytes(bytes[0..4].try_into().ok()?);
        let origin_timestamp_us = u64::from_be_bytes(bytes[4..12].try_into().ok()?);
        let id_bytes = &bytes[12..REQUEST_LEN];
        let end = id_bytes.iter().position(|&b| b == 0).unwrap_or(id_bytes.len());
        let source_device = String::from_utf8_lossy(&id_bytes[..end]).into_owned();
        Some(Self { packet_id, origin_timestamp_us, source_device })
    }
}

/// A decoded probe response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResponse {
    pub packet_id: u32,
    pub origin_timestamp_us: u64,
    pub responder_timestamp_us: u64,
}

impl ProbeResponse {
    pub fn encode(&self) -> [u8; RESPONSE_LEN] {
        let mut buf = [0u8; RESPONSE_LEN];
        buf[0..4].copy_from_slice(&self.packet_id.to_be_bytes());
        buf[4..12].copy_from_slice(&self.origin_timestamp_us.to_be_bytes());
        buf[12..20].copy_from_slice(&self.responder_timestamp_us.to_be_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RESPONSE_LEN {
            return None;
        }
        Some(Self {
            packet_id: u32::from_be_bytes(bytes[0..4].try_into().ok()?),
            origin_timestamp_us: u64::from_be_bytes(bytes[4..12].try_into().ok()?),
            responder_timestamp_us: u64::from_be_bytes(bytes[12..20].try_into().ok()?),
        })
    }
}

/// Process-local, monotonically increasing packet id allocator.
///
/// Not persisted across restarts — uniqueness is only required within a run.
#[derive(Debug, Default)]
pub struct PacketIdCounter(AtomicU32);

impl PacketIdCounter {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
