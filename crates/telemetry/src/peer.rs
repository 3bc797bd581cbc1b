// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The peer table: who this agent measures, and how inbound datagrams are
//! attributed back to them.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// One peer device this collector measures RTT to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDevice {
    pub device: String,
    pub location: String,
    pub ip: IpAddr,
    pub link: String,
    #[serde(default)]
    pub is_internet_peer: bool,
}

/// Table of currently-known peers, keyed by device identity.
///
/// Owned exclusively by the collector while the agent runs; replaced
/// wholesale by [`crate::Collector::update_peers`].
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    peers: Vec<PeerDevice>,
}

impl PeerTable {
    pub fn new(peers: Vec<PeerDevice>) -> Self {
        Self { peers }
    }

    pub fn peers(&self) -> &[PeerDevice] {
        &self.peers
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Find the peer whose IP matches `addr`, by linear scan — the table is small.
    pub fn find_by_ip(&self, addr: IpAddr) -> Option<&PeerDevice> {
        self.peers.iter().find(|p| p.ip == addr)
    }
}

/// On-disk peer file document: `{"peers": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerFileDocument {
    #[serde(default)]
    pub peers: Vec<PeerFileEntry>,
}

/// One entry in the peer file, field names matching the external contract in
/// spec.md §6 (`device_pubkey`, `location_pubkey`, `link_pubkey`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerFileEntry {
    pub device_pubkey: String,
    pub location_pubkey: String,
    pub ip: IpAddr,
    pub link_pubkey: String,
    #[serde(default)]
    pub is_internet_peer: bool,
}

impl From<PeerFileEntry> for PeerDevice {
    fn from(e: PeerFileEntry) -> Self {
        Self { device: e.device_pubkey, location: e.location_pubkey, ip: e.ip, link: e.link_pubkey, is_internet_peer: e.is_internet_peer }
    }
}

/// Load peers from a JSON peer file. A missing file is not an error — returns `Ok(None)`.
pub fn load_peer_file(path: &std::path::Path) -> anyhow::Result<Option<Vec<PeerDevice>>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let doc: PeerFileDocument = serde_json::from_str(&contents)?;
    Ok(Some(doc.peers.into_iter().map(PeerDevice::from).collect()))
}
