// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device adapter: the neighbor read, the lock, and named config sessions.

mod api;
mod types;

pub use api::{DeviceApi, HttpDeviceApi};
pub use types::{
    generate_session_name, ConfigLock, ConfigSession, NeighborMap, SessionState, SESSION_PREFIX,
};
