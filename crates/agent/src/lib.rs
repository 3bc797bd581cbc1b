// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device control-plane agent library: configuration, the device and
//! controller adapters, and the reconciliation loop. `main.rs` is a thin
//! composition root over this crate.

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod reconcile;
pub mod run;

pub use config::Config;
pub use error::AgentError;
pub use reconcile::{CycleOutcome, Reconciler};
