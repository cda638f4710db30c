// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded job queue with a per-job timeout.
//!
//! A semaphore caps how many jobs run at once. A job that exceeds its
//! timeout is dropped and its cancellation token raised, so blocking
//! detection work stops at its next budget check. Failed jobs are reported,
//! never retried.

use crate::error::BatchError;
use planscan_vision::CancelToken;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct JobQueue {
    semaphore: Arc<Semaphore>,
    job_timeout: Duration,
}

impl JobQueue {
    pub fn new(max_concurrent: usize, job_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            job_timeout,
        }
    }

    /// Run `job` once a slot is free, giving it a fresh cancellation token
    pub async fn run<T, F, Fut>(&self, label: &str, job: F) -> Result<T, BatchError>
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = Result<T, BatchError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| BatchError::QueueClosed)?;

        let cancel = CancelToken::new();
        tracing::debug!(job = label, "Job started");

        match tokio::time::timeout(self.job_timeout, job(cancel.clone())).await {
            Ok(result) => {
                if let Err(err) = &result {
                    tracing::warn!(job = label, error = %err, "Job failed");
                }
                result
            }
            Err(_) => {
                cancel.cancel();
                let secs = self.job_timeout.as_secs();
                tracing::warn!(job = label, timeout_secs = secs, "Job timed out, cancelling");
                Err(BatchError::Timeout {
                    label: label.to_string(),
                    secs,
                })
            }
        }
    }
}
