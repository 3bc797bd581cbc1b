// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::NeighborMap;

/// One RPC per reconciliation cycle: the device's current neighbor state in,
/// a desired configuration and the peer set for telemetry out.
pub struct ControllerClient {
    client: reqwest::Client,
    base_url: String,
    device_id: String,
    location_id: String,
}

impl ControllerClient {
    pub fn new(
        base_url: impl Into<String>,
        device_id: impl Into<String>,
        location_id: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into(), device_id: device_id.into(), location_id: location_id.into() })
    }

    /// Send the device's current identity and neighbor map, receive back the
    /// desired configuration text and the peer set to probe.
    pub async fn reconcile(&self, neighbors: &NeighborMap) -> anyhow::Result<DesiredState> {
        let req = ReconcileRequest {
            device_id: &self.device_id,
            location_id: &self.location_id,
            neighbors: neighbors.by_vrf(),
        };
        let url = format!("{}/api/v1/reconcile", self.base_url.trim_end_matches('/'));
        let resp: ReconcileResponse =
            self.client.post(url).json(&req).send().await?.error_for_status()?.json().await?;

        let peers = resp.peers.into_iter().map(ControllerPeer::into_peer_device).collect();
        Ok(DesiredState { config_text: resp.desired_config, config_hash: resp.config_hash, peers })
    }
}

#[derive(Serialize)]
struct ReconcileRequest<'a> {
    device_id: &'a str,
    location_id: &'a str,
    neighbors: &'a std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct ReconcileResponse {
    #[serde(default)]
    desired_config: String,
    #[serde(default)]
    config_hash: Option<String>,
    #[serde(default)]
    peers: Vec<ControllerPeer>,
}

#[derive(Deserialize)]
struct ControllerPeer {
    device: String,
    location: String,
    ip: IpAddr,
    link: String,
    #[serde(default)]
    is_internet_peer: bool,
}

impl ControllerPeer {
    fn into_peer_device(self) -> dz_telemetry::PeerDevice {
        dz_telemetry::PeerDevice {
            device: self.device,
            location: self.location,
            ip: self.ip,
            link: self.link,
            is_internet_peer: self.is_internet_peer,
        }
    }
}

/// What the controller wants applied this cycle.
pub struct DesiredState {
    /// Ordered configuration lines as opaque text, one command per line.
    pub config_text: String,
    /// Controller-supplied content hash, if provided; used only for logging —
    /// the apply decision is driven by comparing `config_text` directly.
    pub config_hash: Option<String>,
    pub peers: Vec<dz_telemetry::PeerDevice>,
}

impl DesiredState {
    /// Split `config_text` into the ordered, non-empty command lines to push.
    pub fn config_lines(&self) -> Vec<String> {
        self.config_text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.config_lines().is_empty()
    }
}
