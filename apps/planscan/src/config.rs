// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process configuration loaded from environment variables.

use planscan_vision::DetectionConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of rayon threads for detection.
    pub worker_threads: usize,
    /// Maximum number of batch jobs running at once.
    pub max_concurrent_jobs: usize,
    /// Per-job timeout in seconds.
    pub job_timeout_secs: u64,
    /// Timeout for one out-of-process worker call in seconds.
    pub worker_timeout_secs: u64,
    /// JSON file with detection thresholds.
    pub detection_config: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            worker_threads: std::env::var("PLANSCAN_WORKER_THREADS")
                .unwrap_or_else(|_| num_cpus::get().to_string())
                .parse()
                .unwrap_or_else(|_| num_cpus::get()),
            max_concurrent_jobs: std::env::var("PLANSCAN_MAX_CONCURRENT_JOBS")
                .unwrap_or_else(|_| "4".into())
                .parse()
                .unwrap_or(4),
            job_timeout_secs: std::env::var("PLANSCAN_JOB_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .unwrap_or(30),
            worker_timeout_secs: std::env::var("PLANSCAN_WORKER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "20".into())
                .parse()
                .unwrap_or(20),
            detection_config: std::env::var("PLANSCAN_DETECTION_CONFIG")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            log_format: LogFormat::parse(
                &std::env::var("PLANSCAN_LOG_FORMAT").unwrap_or_else(|_| "pretty".into()),
            ),
        }
    }

    /// Detection thresholds: `path` wins over `PLANSCAN_DETECTION_CONFIG`, else defaults.
    pub fn detection(&self, path: Option<&str>) -> planscan_vision::Result<DetectionConfig> {
        match path.or(self.detection_config.as_deref()) {
            Some(path) => DetectionConfig::from_file(path),
            None => Ok(DetectionConfig::default()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
