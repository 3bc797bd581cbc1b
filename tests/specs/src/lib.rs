// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake device and controller HTTP servers for end-to-end reconciliation
//! tests. Each fake binds a real loopback port so [`dz_agent::device::HttpDeviceApi`]
//! and [`dz_agent::controller::ControllerClient`] exercise actual HTTP round trips.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// In-memory state backing the fake device's management API.
#[derive(Default)]
pub struct FakeDeviceState {
    pub neighbors: Mutex<BTreeMap<String, Vec<String>>>,
    pub sessions: Mutex<Vec<Value>>,
    pub lock: Mutex<Option<Value>>,
    pub diffs: Mutex<HashMap<String, String>>,
    pub committed: Mutex<Vec<String>>,
    pub aborted: Mutex<Vec<String>>,
}

/// A fake device bound to a real loopback address.
pub struct FakeDevice {
    pub state: Arc<FakeDeviceState>,
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn get_neighbors(State(state): State<Arc<FakeDeviceState>>) -> Json<Value> {
    Json(json!({ "neighbors": *state.neighbors.lock().unwrap() }))
}

async fn list_sessions(State(state): State<Arc<FakeDeviceState>>) -> Json<Value> {
    Json(json!({ "sessions": *state.sessions.lock().unwrap() }))
}

async fn abort_session(State(state): State<Arc<FakeDeviceState>>, Path(name): Path<String>) -> Json<Value> {
    state.sessions.lock().unwrap().retain(|s| s["name"] != name);
    state.aborted.lock().unwrap().push(name);
    Json(json!({}))
}

async fn get_lock(State(state): State<Arc<FakeDeviceState>>) -> Json<Value> {
    Json(json!({ "lock": *state.lock.lock().unwrap() }))
}

async fn force_unlock(State(state): State<Arc<FakeDeviceState>>) -> Json<Value> {
    *state.lock.lock().unwrap() = None;
    Json(json!({}))
}

async fn create_session(State(state): State<Arc<FakeDeviceState>>, Json(body): Json<Value>) -> Json<Value> {
    let name = body["name"].as_str().unwrap_or_default().to_owned();
    state.sessions.lock().unwrap().push(json!({ "name": name, "state": "pending" }));
    Json(json!({}))
}

async fn push_lines(
    State(_state): State<Arc<FakeDeviceState>>,
    Path(_name): Path<String>,
    Json(_body): Json<Value>,
) -> Json<Value> {
    Json(json!({}))
}

async fn diff_session(State(state): State<Arc<FakeDeviceState>>, Path(name): Path<String>) -> Json<Value> {
    let diffs = state.diffs.lock().unwrap();
    let diff = diffs.get(&name).or_else(|| diffs.get("")).cloned().unwrap_or_default();
    Json(json!({ "diff": diff }))
}

async fn commit_session(State(state): State<Arc<FakeDeviceState>>, Path(name): Path<String>) -> Json<Value> {
    state.sessions.lock().unwrap().retain(|s| s["name"] != name);
    state.lock.lock().unwrap().take();
    state.committed.lock().unwrap().push(name);
    Json(json!({}))
}

/// Spawn a fake device. `default_diff` is returned for any session whose
/// name is not present in `state.diffs` at diff time.
pub async fn spawn_fake_device(default_diff: impl Into<String>) -> anyhow::Result<FakeDevice> {
    let state = Arc::new(FakeDeviceState::default());
    let default_diff = default_diff.into();
    {
        // Seed a sentinel so any session gets `default_diff` unless overridden.
        state.diffs.lock().unwrap().insert(String::new(), default_diff);
    }

    let router = Router::new()
        .route("/api/v1/show/bgp-neighbors", get(get_neighbors))
        .route("/api/v1/sessions", get(list_sessions).post(create_session))
        .route("/api/v1/sessions/{name}/abort", post(abort_session))
        .route("/api/v1/sessions/{name}/lines", post(push_lines))
        .route("/api/v1/sessions/{name}/diff", get(diff_session))
        .route("/api/v1/sessions/{name}/commit", post(commit_session))
        .route("/api/v1/lock", get(get_lock))
        .route("/api/v1/lock/force-release", post(force_unlock))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr: SocketAddr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    Ok(FakeDevice { state, base_url: format!("http://{addr}"), handle })
}

/// A fake controller bound to a real loopback address, always answering the
/// same desired configuration and peer set.
pub struct FakeController {
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FakeController {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn reconcile(State(resp): State<Arc<Value>>) -> Json<Value> {
    Json((*resp).clone())
}

pub async fn spawn_fake_controller(desired_config: impl Into<String>, peers: Value) -> anyhow::Result<FakeController> {
    let response = Arc::new(json!({
        "desired_config": desired_config.into(),
        "config_hash": Value::Null,
        "peers": peers,
    }));

    let router = Router::new().route("/api/v1/reconcile", post(reconcile)).with_state(response);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr: SocketAddr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    Ok(FakeController { base_url: format!("http://{addr}"), handle })
}
