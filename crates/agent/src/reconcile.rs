// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::controller::ControllerClient;
use crate::device::{generate_session_name, DeviceApi, SessionState, SESSION_PREFIX};
use crate::error::AgentError;

/// Result of a single reconciliation cycle, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Desired configuration was empty; nothing to push.
    NoOp,
    /// A session was opened, pushed, diffed as non-empty, and committed.
    Applied { lines: usize },
    /// A session was opened and pushed but the diff was empty, so it was
    /// aborted rather than committed.
    Skipped { reason: &'static str },
}

/// Drives one device against one controller: neighbor read, controller RPC,
/// peer-table refresh, and config session apply.
pub struct Reconciler {
    device: Arc<dyn DeviceApi>,
    controller: ControllerClient,
    telemetry: Option<Arc<dz_telemetry::Collector>>,
    peers_file: Option<PathBuf>,
    identity: String,
    max_lock_age: Duration,
    diff_timeout: Duration,
    session_counter: AtomicU64,
}

impl Reconciler {
    pub fn new(
        device: Arc<dyn DeviceApi>,
        controller: ControllerClient,
        telemetry: Option<Arc<dz_telemetry::Collector>>,
        peers_file: Option<PathBuf>,
        identity: String,
        max_lock_age: Duration,
        diff_timeout: Duration,
    ) -> Self {
        Self {
            device,
            controller,
            telemetry,
            peers_file,
            identity,
            max_lock_age,
            diff_timeout,
            session_counter: AtomicU64::new(0),
        }
    }

    /// Run the reconciliation loop until `shutdown` is cancelled.
    pub async fn run_loop(self: Arc<Self>, poll_interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("reconciliation loop shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(outcome) => tracing::info!(?outcome, "reconciliation cycle completed"),
                        Err(e) => tracing::warn!(err = %e, "reconciliation cycle failed; will retry next tick"),
                    }
                }
            }
        }
    }

    /// Run exactly one cycle. Errors here are always recoverable by waiting
    /// for the next tick; callers must never treat them as fatal.
    ///
    /// Per spec.md §4.1, every cycle reads neighbors and calls the
    /// controller regardless of device-side lock/session state — the
    /// stale-session sweep and lock handling of §4.2 are part of *applying*
    /// configuration, not a precondition for talking to the controller.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, AgentError> {
        let neighbors = match self.device.read_bgp_neighbors().await {
            Ok(neighbors) => neighbors,
            Err(e) => {
                tracing::warn!(err = %e, "failed to read BGP neighbors; continuing with an empty map");
                crate::device::NeighborMap::canonicalize(std::collections::BTreeMap::new())
            }
        };

        let desired = self.controller.reconcile(&neighbors).await.map_err(AgentError::Transient)?;

        if let Some(collector) = &self.telemetry {
            let merged = self.merge_peers(desired.peers.clone()).await;
            // An empty merged set must never wipe an existing peer table —
            // only a non-empty replacement is pushed down.
            if !merged.is_empty() {
                collector.update_peers(merged).await;
            }
        }

        if desired.is_empty() {
            return Ok(CycleOutcome::NoOp);
        }

        self.apply_config(&desired.config_lines()).await
    }

    /// Controller peers merged with the optional peer file, controller
    /// entries winning on a duplicate device id. A peer file is re-read each
    /// cycle on a best-effort basis: read failures are logged and ignored so
    /// a stale or briefly-unreadable file never stalls reconciliation.
    async fn merge_peers(&self, controller_peers: Vec<dz_telemetry::PeerDevice>) -> Vec<dz_telemetry::PeerDevice> {
        let mut merged: Vec<dz_telemetry::PeerDevice> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for peer in controller_peers {
            seen.insert(peer.device.clone());
            merged.push(peer);
        }

        if let Some(path) = &self.peers_file {
            let path = path.clone();
            let loaded = tokio::task::spawn_blocking(move || dz_telemetry::peer::load_peer_file(&path)).await;
            match loaded {
                Ok(Ok(Some(file_peers))) => {
                    for peer in file_peers {
                        if seen.insert(peer.device.clone()) {
                            merged.push(peer);
                        }
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => tracing::warn!(err = %e, "failed to read peer file; keeping controller peers only"),
                Err(e) => tracing::warn!(err = %e, "peer file read task panicked; keeping controller peers only"),
            }
        }

        merged
    }

    /// Abort any session this agent previously opened and abandoned, e.g.
    /// across a restart following a crash mid-commit. Per spec.md §4.2,
    /// errors here are logged but never abort the cycle.
    async fn sweep_stale_sessions(&self) {
        let sessions = match self.device.list_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!(err = %e, "failed to list sessions during stale-session sweep");
                return;
            }
        };
        for session in sessions {
            if session.name.starts_with(SESSION_PREFIX) && session.state == SessionState::Pending {
                tracing::warn!(session = %session.name, "aborting stale session from a previous run");
                if let Err(e) = self.device.abort_session(&session.name).await {
                    tracing::warn!(session = %session.name, err = %e, "failed to abort stale session");
                }
            }
        }
    }

    /// Ensure the configuration lock is either unheld or old enough to force.
    async fn resolve_lock(&self) -> Result<(), AgentError> {
        let Some(lock) = self.device.read_lock().await.map_err(AgentError::ProtocolError)? else {
            return Ok(());
        };

        let age = lock.age(SystemTime::now());
        if age >= self.max_lock_age {
            tracing::warn!(holder = %lock.holder, age_secs = age.as_secs(), "force-releasing stale configuration lock");
            self.device.force_unlock().await.map_err(AgentError::ProtocolError)?;
            return Ok(());
        }

        Err(AgentError::LockConflict { holder: lock.holder, age_secs: age.as_secs() })
    }

    /// Open a session, push the desired lines, and commit only if the
    /// resulting diff is non-empty. The device's session primitive is
    /// transactional, so commit + unlock + persist-to-startup happen as one
    /// batch and a partial outcome is never observed.
    ///
    /// Per spec.md §4.2, the stale-session sweep and lock resolution are
    /// steps of *applying* configuration, not preconditions for the cycle as
    /// a whole — a cycle with nothing to apply must never touch either.
    async fn apply_config(&self, lines: &[String]) -> Result<CycleOutcome, AgentError> {
        self.sweep_stale_sessions().await;
        self.resolve_lock().await?;

        let name = generate_session_name(&self.session_counter);

        self.device.create_session(&name).await.map_err(AgentError::ProtocolError)?;
        self.device.push_lines(&name, lines).await.map_err(AgentError::ProtocolError)?;

        let diff = self.device.diff_session(&name, self.diff_timeout).await.map_err(AgentError::ProtocolError)?;

        if diff.trim().is_empty() {
            self.device.abort_session(&name).await.map_err(AgentError::ProtocolError)?;
            return Ok(CycleOutcome::Skipped { reason: "empty diff" });
        }

        self.device.commit_session_and_persist(&name).await.map_err(AgentError::ProtocolError)?;
        Ok(CycleOutcome::Applied { lines: lines.len() })
    }
}
