// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::types::{ConfigLock, ConfigSession, NeighborMap};

/// The five device capabilities the reconciliation loop needs: a read-only
/// neighbor map, named transactional sessions, and the global lock that
/// guards them.
///
/// Implementations talk to whatever management surface the device exposes;
/// the reconciliation loop only ever sees this trait, so a fake can stand in
/// for the real device in tests.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Read the current BGP neighbor table, keyed by VRF.
    async fn read_bgp_neighbors(&self) -> anyhow::Result<NeighborMap>;

    /// List configuration sessions currently open on the device.
    async fn list_sessions(&self) -> anyhow::Result<Vec<ConfigSession>>;

    /// Abort and discard a named session.
    async fn abort_session(&self, name: &str) -> anyhow::Result<()>;

    /// Read the global configuration lock, if held.
    async fn read_lock(&self) -> anyhow::Result<Option<ConfigLock>>;

    /// Forcibly release the configuration lock regardless of holder.
    async fn force_unlock(&self) -> anyhow::Result<()>;

    /// Create a new named configuration session.
    async fn create_session(&self, name: &str) -> anyhow::Result<()>;

    /// Push configuration lines into an open session, in order.
    async fn push_lines(&self, name: &str, lines: &[String]) -> anyhow::Result<()>;

    /// Compute the pending diff for a session against running configuration.
    /// Bounded by `timeout`; a slow diff is treated as a protocol error.
    async fn diff_session(&self, name: &str, timeout: Duration) -> anyhow::Result<String>;

    /// Commit a session, release the lock, and persist running configuration
    /// to startup configuration, as a single transactional batch.
    async fn commit_session_and_persist(&self, name: &str) -> anyhow::Result<()>;
}

/// JSON management API client, in the style of a thin upstream wrapper
/// around [`reqwest::Client`].
pub struct HttpDeviceApi {
    client: reqwest::Client,
    base_url: String,
    identity: String,
}

impl HttpDeviceApi {
    pub fn new(base_url: impl Into<String>, identity: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into(), identity: identity.into() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Deserialize)]
struct NeighborsWire {
    #[serde(default)]
    neighbors: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct SessionsWire {
    #[serde(default)]
    sessions: Vec<ConfigSession>,
}

#[derive(Deserialize)]
struct LockWire {
    #[serde(default)]
    lock: Option<ConfigLock>,
}

#[derive(Deserialize)]
struct DiffWire {
    #[serde(default)]
    diff: String,
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    async fn read_bgp_neighbors(&self) -> anyhow::Result<NeighborMap> {
        let resp: NeighborsWire =
            self.client.get(self.url("/api/v1/show/bgp-neighbors")).send().await?.error_for_status()?.json().await?;
        Ok(NeighborMap::canonicalize(resp.neighbors))
    }

    async fn list_sessions(&self) -> anyhow::Result<Vec<ConfigSession>> {
        let resp: SessionsWire =
            self.client.get(self.url("/api/v1/sessions")).send().await?.error_for_status()?.json().await?;
        Ok(resp.sessions)
    }

    async fn abort_session(&self, name: &str) -> anyhow::Result<()> {
        self.client
            .post(self.url(&format!("/api/v1/sessions/{name}/abort")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn read_lock(&self) -> anyhow::Result<Option<ConfigLock>> {
        let resp: LockWire =
            self.client.get(self.url("/api/v1/lock")).send().await?.error_for_status()?.json().await?;
        Ok(resp.lock)
    }

    async fn force_unlock(&self) -> anyhow::Result<()> {
        self.client.post(self.url("/api/v1/lock/force-release")).send().await?.error_for_status()?;
        Ok(())
    }

    async fn create_session(&self, name: &str) -> anyhow::Result<()> {
        self.client
            .post(self.url("/api/v1/sessions"))
            .json(&serde_json::json!({ "name": name, "holder": self.identity }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn push_lines(&self, name: &str, lines: &[String]) -> anyhow::Result<()> {
        self.client
            .post(self.url(&format!("/api/v1/sessions/{name}/lines")))
            .json(&serde_json::json!({ "lines": lines }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn diff_session(&self, name: &str, timeout: Duration) -> anyhow::Result<String> {
        let resp: DiffWire = self
            .client
            .get(self.url(&format!("/api/v1/sessions/{name}/diff")))
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.diff)
    }

    async fn commit_session_and_persist(&self, name: &str) -> anyhow::Result<()> {
        self.client
            .post(self.url(&format!("/api/v1/sessions/{name}/commit")))
            .json(&serde_json::json!({ "persist": true }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
