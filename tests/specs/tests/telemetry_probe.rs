// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end telemetry collector scenarios: real UDP sockets on loopback,
//! two peers probing each other, and sample set rotation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use dz_telemetry::{Collector, CollectorConfig, FileStorage, PeerDevice, StorageBackend};

fn config(dir: &std::path::Path, port: u16, device: &str) -> CollectorConfig {
    CollectorConfig {
        local_device: device.to_owned(),
        local_location: "loc".into(),
        udp_port: port,
        sampling_interval_secs: 1,
        submission_interval_secs: 1,
        storage_path: dir.to_path_buf(),
        max_samples_per_link: 100,
        internet_probes_enabled: true,
    }
}

#[tokio::test]
async fn two_peers_exchange_probes_and_record_rtt() -> anyhow::Result<()> {
    let dir_a = tempfile::tempdir()?;
    let dir_b = tempfile::tempdir()?;

    let port_a = free_udp_port().await?;
    let port_b = free_udp_port().await?;

    let a = start_collector_on(dir_a.path(), "device-a", port_a).await?;
    let b = start_collector_on(dir_b.path(), "device-b", port_b).await?;

    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    a.update_peers(vec![PeerDevice {
        device: "device-b".into(),
        location: "loc".into(),
        ip: loopback,
        link: "link-ab".into(),
        is_internet_peer: false,
    }])
    .await;
    b.update_peers(vec![PeerDevice {
        device: "device-a".into(),
        location: "loc".into(),
        ip: loopback,
        link: "link-ab".into(),
        is_internet_peer: false,
    }])
    .await;

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let snapshot_a = a.snapshot().await;
    assert!(!snapshot_a.is_empty(), "device-a should have recorded at least one RTT sample");
    let set = snapshot_a.values().next().unwrap();
    assert!(!set.samples.is_empty());

    a.stop().await;
    b.stop().await;

    Ok(())
}

async fn free_udp_port() -> anyhow::Result<u16> {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
    Ok(socket.local_addr()?.port())
}

async fn start_collector_on(dir: &std::path::Path, device: &str, port: u16) -> anyhow::Result<Arc<Collector>> {
    let storage: Arc<dyn StorageBackend> = Arc::new(FileStorage::new(dir)?);
    let collector = Arc::new(Collector::new(config(dir, port, device), storage).await?);
    collector.start().await?;
    Ok(collector)
}

#[tokio::test]
async fn sample_set_rotates_once_max_len_is_reached() -> anyhow::Result<()> {
    let key = dz_telemetry::LinkKey::canonical("self", "peer", "link1");
    let mut set = dz_telemetry::LinkSampleSet::new(key, "self".into(), "peer".into(), 1);

    let max_len = 10;
    for i in 0..max_len {
        set.append_with_rotation(
            dz_telemetry::RttSample { rtt_us: 100, timestamp_us: i as u64, packet_id: i as u32 },
            max_len,
        );
    }
    assert_eq!(set.samples.len(), max_len);

    let rotated = set.append_with_rotation(
        dz_telemetry::RttSample { rtt_us: 100, timestamp_us: 999, packet_id: 999 },
        max_len,
    );
    assert!(rotated);
    assert_eq!(set.samples.len(), max_len / 2);
    Ok(())
}
