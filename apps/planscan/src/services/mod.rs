// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Service modules for running detections.

pub mod processor;
pub mod queue;
pub mod worker;

pub use processor::{Processor, SecondaryMode};
pub use queue::JobQueue;
pub use worker::{serve_stdio, WorkerClient};
