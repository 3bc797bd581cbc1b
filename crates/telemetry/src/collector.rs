// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The telemetry collector: UDP probing, sample accumulation, and periodic
//! flush to durable storage.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::ConfigError;
use crate::peer::{PeerDevice, PeerTable};
use crate::protocol::{self, Classification, PacketIdCounter, ProbeRequest, ProbeResponse};
use crate::sample::{now_us, LinkKey, LinkSampleSet, RttSample};
use crate::storage::StorageBackend;

/// Configuration accepted by [`Collector::new`]. See spec.md §4.3 for the
/// full set of construction-time invariants.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub local_device: String,
    pub local_location: String,
    pub udp_port: u16,
    pub sampling_interval_secs: u64,
    pub submission_interval_secs: u64,
    pub storage_path: PathBuf,
    pub max_samples_per_link: usize,
    pub internet_probes_enabled: bool,
}

impl CollectorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.udp_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.sampling_interval_secs == 0 {
            return Err(ConfigError::IntervalZero { field: "sampling interval" });
        }
        if self.submission_interval_secs < self.sampling_interval_secs {
            return Err(ConfigError::SubmissionIntervalTooShort);
        }
        if self.storage_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStoragePath);
        }
        if self.max_samples_per_link < 100 {
            return Err(ConfigError::MaxSamplesTooSmall);
        }
        Ok(())
    }
}

/// Shared, lock-protected collector state: the peer table and every link's
/// sample set. Held behind a single `RwLock` per spec.md §5.
struct CollectorState {
    peers: PeerTable,
    sample_sets: HashMap<LinkKey, LinkSampleSet>,
}

/// Owns the UDP socket, peer table, sample buffers, probe scheduler, and
/// storage flusher for one agent instance.
pub struct Collector {
    config: CollectorConfig,
    storage: Arc<dyn StorageBackend>,
    state: RwLock<CollectorState>,
    packet_ids: PacketIdCounter,
    shutdown: CancellationToken,
    socket: RwLock<Option<Arc<UdpSocket>>>,
}

impl Collector {
    /// Construct a collector, validating `config` and attempting to load any
    /// previously persisted sample sets. A load failure is logged, not fatal.
    pub async fn new(
        config: CollectorConfig,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let sample_sets = match storage.load_all().await {
            Ok(sets) => sets,
            Err(e) => {
                tracing::warn!(err = %e, "failed to load persisted sample sets; starting empty");
                HashMap::new()
            }
        };

        Ok(Self {
            config,
            storage,
            state: RwLock::new(CollectorState { peers: PeerTable::default(), sample_sets }),
            packet_ids: PacketIdCounter::new(),
            shutdown: CancellationToken::new(),
            socket: RwLock::new(None),
        })
    }

    /// Bind the UDP socket and launch the listener, prober, and flusher tasks.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.udp_port).parse()?;
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        *self.socket.write().await = Some(Arc::clone(&socket));

        tokio::spawn(Arc::clone(self).run_listener(Arc::clone(&socket)));

        // Small pre-probe delay so the listener is bound before the first request goes out.
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::spawn(Arc::clone(self).run_prober());
        tokio::spawn(Arc::clone(self).run_flusher());

        Ok(())
    }

    /// Signal shutdown, perform one final save of all in-memory sample sets,
    /// and release the socket. Safe to call more than once.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.flush_all().await;
        *self.socket.write().await = None;
    }

    /// Atomically replace the peer table. `None` entries cannot occur in this
    /// representation; an empty `Vec` is a legitimate input.
    pub async fn update_peers(&self, peers: Vec<PeerDevice>) {
        let mut state = self.state.write().await;
        state.peers = PeerTable::new(peers);
    }

    /// Read-locked snapshot of every sample set, for introspection and tests.
    pub async fn snapshot(&self) -> HashMap<LinkKey, LinkSampleSet> {
        self.state.read().await.sample_sets.clone()
    }

    async fn flush_all(&self) {
        let sets: Vec<LinkSampleSet> = {
            let state = self.state.read().await;
            state.sample_sets.values().cloned().collect()
        };
        for set in sets {
            if let Err(e) = self.storage.save(&set).await {
                tracing::warn!(link = %set.key.as_string(), err = %e, "failed to flush sample set");
            }
        }
    }

    async fn run_listener(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut buf = vec![0u8; protocol::REQUEST_LEN + 1];
        loop {
            let recv = tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await;
            if self.shutdown.is_cancelled() {
                return;
            }
            let (len, from) = match recv {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    tracing::debug!(err = %e, "udp recv error");
                    continue;
                }
                Err(_) => continue, // read deadline elapsed; re-check shutdown
            };

            match protocol::classify(len) {
                Classification::Request => {
                    let Some(req) = ProbeRequest::decode(&buf[..len]) else { continue };
                    let response = ProbeResponse {
                        packet_id: req.packet_id,
                        origin_timestamp_us: req.origin_timestamp_us,
                        responder_timestamp_us: now_us(),
                    };
                    // `from` is the peer's ephemeral probe-send socket, which is
                    // dropped as soon as the request is sent — a reply to it would
                    // never be delivered. The peer's listener is bound on the same
                    // configured port everywhere, so reply there instead.
                    let reply_to = SocketAddr::new(from.ip(), self.config.udp_port);
                    if let Err(e) = socket.send_to(&response.encode(), reply_to).await {
                        tracing::debug!(err = %e, peer = %reply_to, "failed to send probe response");
                    }
                }
                Classification::Response => {
                    let Some(resp) = ProbeResponse::decode(&buf[..len]) else { continue };
                    self.record_response(resp, from.ip()).await;
                }
                Classification::Unrecognized => {
                    tracing::debug!(len, from = %from, "dropping unrecognized datagram");
                }
            }
        }
    }

    async fn record_response(&self, resp: ProbeResponse, from_ip: IpAddr) {
        let now = now_us();
        let rtt_us = now.saturating_sub(resp.origin_timestamp_us).min(u32::MAX as u64) as u32;

        let mut state = self.state.write().await;
        let Some(peer) = state.peers.find_by_ip(from_ip).cloned() else {
            tracing::debug!(from = %from_ip, "dropping response from unknown peer");
            return;
        };

        let key = LinkKey::canonical(&self.config.local_device, &peer.device, &peer.link);
        let sample = RttSample { rtt_us, timestamp_us: now, packet_id: resp.packet_id };
        let max_len = self.config.max_samples_per_link;
        let local_device = self.config.local_device.clone();

        let set = state
            .sample_sets
            .entry(key.clone())
            .or_insert_with(|| LinkSampleSet::new(key.clone(), local_device, peer.device.clone(), self.config.sampling_interval_secs));

        // Rotation issues one storage call while the write lock is held; this
        // is acceptable per spec.md §5 since truncation is cheap and rotation
        // is infrequent.
        if set.needs_rotation(max_len) {
            if let Err(e) = self.storage.rotate(&key).await {
                tracing::warn!(link = %key.as_string(), err = %e, "rotate failed; retaining oversized set");
            }
        }
        set.append_with_rotation(sample, max_len);
    }

    async fn run_prober(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.sampling_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = interval.tick() => {}
            }

            let peers: Vec<PeerDevice> = {
                let state = self.state.read().await;
                state.peers.peers().to_vec()
            };

            for peer in peers {
                if !self.config.internet_probes_enabled && peer.is_internet_peer {
                    continue;
                }
                if let Err(e) = self.send_probe(&peer).await {
                    tracing::debug!(peer = %peer.device, err = %e, "probe send failed");
                }
            }
        }
    }

    async fn send_probe(&self, peer: &PeerDevice) -> anyhow::Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(SocketAddr::new(peer.ip, self.config.udp_port)).await?;

        let request = ProbeRequest {
            packet_id: self.packet_ids.next(),
            origin_timestamp_us: now_us(),
            source_device: self.config.local_device.clone(),
        };
        socket.send(&request.encode()).await?;
        Ok(())
    }

    async fn run_flusher(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.submission_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = interval.tick() => {}
            }

            let sets: Vec<LinkSampleSet> = {
                let state = self.state.read().await;
                state.sample_sets.values().filter(|s| !s.samples.is_empty()).cloned().collect()
            };

            for set in sets {
                if let Err(e) = self.storage.save(&set).await {
                    tracing::warn!(link = %set.key.as_string(), err = %e, "flush failed; will retry next tick");
                }
            }
        }
    }
}
