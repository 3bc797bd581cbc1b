// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Classification of a reconciliation cycle failure, per the error taxonomy
/// in spec.md §7. Every variant here is recovered by the caller logging and
/// waiting for the next tick — none of them propagate past [`crate::reconcile::run_cycle`].
#[derive(Debug)]
pub enum AgentError {
    /// Controller RPC timed out or was unavailable.
    Transient(anyhow::Error),
    /// The configuration lock is held by another transaction and is not old
    /// enough to force-unlock.
    LockConflict { holder: String, age_secs: u64 },
    /// Unexpected device response shape, or a diff command that exceeded its timeout.
    ProtocolError(anyhow::Error),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(e) => write!(f, "transient upstream failure: {e:#}"),
            Self::LockConflict { holder, age_secs } => {
                write!(f, "configuration lock held by {holder} ({age_secs}s old); not old enough to force-unlock")
            }
            Self::ProtocolError(e) => write!(f, "device protocol error: {e:#}"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<anyhow::Error> for AgentError {
    fn from(e: anyhow::Error) -> Self {
        Self::Transient(e)
    }
}
