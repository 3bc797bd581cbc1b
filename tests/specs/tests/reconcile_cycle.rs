// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end reconciliation cycle scenarios, against fake device and
//! controller HTTP servers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use dz_agent::controller::ControllerClient;
use dz_agent::device::HttpDeviceApi;
use dz_agent::reconcile::{CycleOutcome, Reconciler};
use dz_agent_specs::{spawn_fake_controller, spawn_fake_device};
use serde_json::json;

fn reconciler(device_url: &str, controller_url: &str) -> Reconciler {
    let device = Arc::new(HttpDeviceApi::new(device_url, "dev-1", Duration::from_secs(2)).unwrap());
    let controller = ControllerClient::new(controller_url, "dev-1", "loc-1", Duration::from_secs(2)).unwrap();
    Reconciler::new(device, controller, None, None, "dev-1".into(), Duration::from_secs(3600), Duration::from_secs(2))
}

#[tokio::test]
async fn fresh_start_with_empty_controller_is_a_noop() -> anyhow::Result<()> {
    let device = spawn_fake_device("").await?;
    let controller = spawn_fake_controller("", json!([])).await?;

    let outcome = reconciler(&device.base_url, &controller.base_url).run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::NoOp);
    assert!(device.state.committed.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn first_configuration_push_commits_a_non_empty_diff() -> anyhow::Result<()> {
    let device = spawn_fake_device("+neighbor 10.0.0.1 remote-as 65001").await?;
    let controller =
        spawn_fake_controller("router bgp 65000\nneighbor 10.0.0.1 remote-as 65001\n", json!([])).await?;

    let outcome = reconciler(&device.base_url, &controller.base_url).run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Applied { lines: 2 });
    assert_eq!(device.state.committed.lock().unwrap().len(), 1);
    assert!(device.state.aborted.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn empty_diff_after_push_is_skipped_not_committed() -> anyhow::Result<()> {
    let device = spawn_fake_device("").await?;
    let controller = spawn_fake_controller("router bgp 65000\n", json!([])).await?;

    let outcome = reconciler(&device.base_url, &controller.base_url).run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped { reason: "empty diff" });
    assert_eq!(device.state.aborted.lock().unwrap().len(), 1);
    assert!(device.state.committed.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn stuck_lock_older_than_max_age_is_force_released() -> anyhow::Result<()> {
    let device = spawn_fake_device("+neighbor 10.0.0.1 remote-as 65001").await?;
    let controller = spawn_fake_controller("neighbor 10.0.0.1 remote-as 65001\n", json!([])).await?;

    *device.state.lock.lock().unwrap() =
        Some(json!({ "holder": "stuck-operator", "label": "manual", "acquired_at_secs": 0 }));

    let device_api = Arc::new(HttpDeviceApi::new(&device.base_url, "dev-1", Duration::from_secs(2)).unwrap());
    let controller_client =
        ControllerClient::new(&controller.base_url, "dev-1", "loc-1", Duration::from_secs(2)).unwrap();
    // max_lock_age of zero: any lock age qualifies as stale.
    let reconciler = Reconciler::new(
        device_api,
        controller_client,
        None,
        None,
        "dev-1".into(),
        Duration::from_secs(0),
        Duration::from_secs(2),
    );

    let outcome = reconciler.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Applied { lines: 1 });
    assert!(device.state.lock.lock().unwrap().is_none());

    Ok(())
}

#[tokio::test]
async fn lock_younger_than_max_age_blocks_the_cycle() -> anyhow::Result<()> {
    let device = spawn_fake_device("+neighbor 10.0.0.1 remote-as 65001").await?;
    let controller = spawn_fake_controller("neighbor 10.0.0.1 remote-as 65001\n", json!([])).await?;

    let now_secs = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
    *device.state.lock.lock().unwrap() =
        Some(json!({ "holder": "other-operator", "label": "manual", "acquired_at_secs": now_secs }));

    let result = reconciler(&device.base_url, &controller.base_url).run_cycle().await;
    match result {
        Err(dz_agent::AgentError::LockConflict { holder, .. }) => assert_eq!(holder, "other-operator"),
        other => panic!("expected LockConflict, got {other:?}"),
    }
    assert!(device.state.committed.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn empty_controller_config_is_a_noop_even_with_a_young_foreign_lock() -> anyhow::Result<()> {
    let device = spawn_fake_device("").await?;
    let controller = spawn_fake_controller("", json!([])).await?;

    let now_secs = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
    *device.state.lock.lock().unwrap() =
        Some(json!({ "holder": "other-operator", "label": "manual", "acquired_at_secs": now_secs }));

    // Nothing to apply, so the lock is never even consulted: the cycle still
    // calls the controller (so it learns "no neighbors") but ends in NoOp.
    let outcome = reconciler(&device.base_url, &controller.base_url).run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::NoOp);
    assert!(device.state.committed.lock().unwrap().is_empty());

    Ok(())
}
