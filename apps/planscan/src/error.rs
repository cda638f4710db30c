// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for batch jobs and worker calls.

use planscan_vision::PlanError;
use thiserror::Error;

/// Batch and worker error types.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Detection failed: {0}")]
    Detection(#[from] PlanError),

    #[error("Job {label} timed out after {secs}s")]
    Timeout { label: String, secs: u64 },

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Join error")]
    Join(#[from] tokio::task::JoinError),

    #[error("Failed to start worker: {0}")]
    WorkerSpawn(std::io::Error),

    #[error("Worker did not answer within {secs}s")]
    WorkerTimeout { secs: u64 },

    #[error("Worker protocol error: {0}")]
    WorkerProtocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BatchError {
    /// Whether the job ran out of time (as opposed to failing).
    pub fn is_timeout(&self) -> bool {
        matches!(self, BatchError::Timeout { .. } | BatchError::WorkerTimeout { .. })
    }
}
