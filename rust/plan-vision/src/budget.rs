// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cooperative time budgets for detectors
//!
//! Detectors call [`Budget::check`] once per scanned line or Hough peak. The
//! shared [`CancelToken`] lets a caller that gave up on a detection (e.g. the
//! batch queue after its job timeout) stop the work still running on the pool.

use crate::detectors::DetectorKind;
use crate::error::{PlanError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Deadline plus cancellation flag
#[derive(Debug, Clone)]
pub struct Budget {
    started: Instant,
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl Budget {
    pub fn new(limit: Duration, cancel: CancelToken) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started.checked_add(limit),
            cancel,
        }
    }

    /// Budget without a deadline
    pub fn unlimited() -> Self {
        Self {
            started: Instant::now(),
            deadline: None,
            cancel: CancelToken::new(),
        }
    }

    /// Fresh deadline starting now, sharing this budget's cancellation flag
    pub fn restart(&self, limit: Duration) -> Self {
        Self::new(limit, self.cancel.clone())
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Fail once cancelled or past the deadline
    pub fn check(&self, detector: DetectorKind) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PlanError::Cancelled { detector });
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(PlanError::DetectorTimeout {
                detector,
                elapsed_ms: self.elapsed_ms(),
            }),
            _ => Ok(()),
        }
    }
}
