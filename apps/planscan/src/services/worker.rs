// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Out-of-process secondary detection.
//!
//! The client spawns `planscan worker`, writes one JSON request line to its
//! stdin and reads one JSON response line from its stdout. A worker that does
//! not answer in time is killed and reaped.

use crate::error::BatchError;
use planscan_vision::{handle_request, CancelToken, SecondaryDetection, WorkerRequest, WorkerResponse};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Spawns worker processes for secondary detection passes.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl WorkerClient {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Client running this executable's `worker` subcommand
    pub fn current_exe(timeout: Duration) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec!["worker".into()], timeout))
    }

    /// Run one secondary pass in a fresh worker process
    pub async fn run(&self, request: &WorkerRequest) -> Result<SecondaryDetection, BatchError> {
        let payload = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(BatchError::WorkerSpawn)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BatchError::WorkerProtocol("worker stdin unavailable".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| BatchError::WorkerProtocol("worker stdout unavailable".into()))?;

        let exchange = async {
            stdin.write_all(&payload).await?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await?;
            drop(stdin);

            let mut output = Vec::new();
            stdout.read_to_end(&mut output).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, output))
        };

        let (status, output) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                let secs = self.timeout.as_secs();
                tracing::warn!(pid = child.id(), timeout_secs = secs, "Worker timed out, killing");
                // Kill then reap so no zombie is left behind
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(BatchError::WorkerTimeout { secs });
            }
        };

        if !status.success() {
            return Err(BatchError::WorkerProtocol(format!("worker exited with {}", status)));
        }

        let line = output
            .split(|b| *b == b'\n')
            .find(|line| !line.iter().all(u8::is_ascii_whitespace))
            .ok_or_else(|| BatchError::WorkerProtocol("worker wrote no response".into()))?;
        let response: WorkerResponse = serde_json::from_slice(line)?;
        response.into_result().map_err(BatchError::from)
    }
}

/// Answer one request from stdin on stdout (the `worker` subcommand)
pub async fn serve_stdio() -> anyhow::Result<()> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    let response = match serde_json::from_str::<WorkerRequest>(&line) {
        Ok(request) => {
            tracing::debug!(roi = ?request.roi, detectors = ?request.detectors, "Worker request received");
            tokio::task::spawn_blocking(move || handle_request(&request, CancelToken::new())).await?
        }
        Err(err) => {
            tracing::warn!(error = %err, "Malformed worker request");
            WorkerResponse::Error {
                message: format!("malformed request: {}", err),
            }
        }
    };

    let mut out = serde_json::to_vec(&response)?;
    out.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}
