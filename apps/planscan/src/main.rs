// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planscan - wall, room and opening detection for floor plan images.
//!
//! # Commands
//!
//! - `planscan detect <IMAGE>` - Detect one image, print the result as JSON
//! - `planscan batch <IMAGES>...` - Detect many images through the bounded job queue
//! - `planscan worker` - Answer one secondary detection request on stdin/stdout
//!
//! Logs always go to stderr; stdout carries results and the worker protocol.

use anyhow::Context;
use clap::{Parser, Subcommand};
use planscan_vision::{DetectionRequest, Region, TextLabel, WallStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod services;

use config::{Config, LogFormat};
use services::{JobQueue, Processor, SecondaryMode, WorkerClient};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect walls, rooms and openings in one image
    Detect {
        /// Path to the floor plan image (PNG or JPEG)
        image: PathBuf,
        /// Skip style classification (solid_dark, mid_gray, parallel_line, thin_line, patterned, mixed)
        #[arg(long, value_parser = parse_style)]
        style: Option<WallStyle>,
        /// Region of interest as X,Y,W,H
        #[arg(long, value_parser = parse_region)]
        roi: Option<Region>,
        /// JSON file with external room labels
        #[arg(long)]
        labels: Option<PathBuf>,
        /// JSON file with detection thresholds
        #[arg(short, long)]
        config: Option<String>,
        /// Where the secondary pass for fusion runs
        #[arg(long, value_enum, default_value_t = SecondaryMode::None)]
        secondary: SecondaryMode,
        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Detect many images with bounded concurrency
    Batch {
        /// Floor plan images
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Write one `<name>.json` result per image here
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Maximum concurrent jobs (default: PLANSCAN_MAX_CONCURRENT_JOBS)
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Per-job timeout (default: PLANSCAN_JOB_TIMEOUT_SECS)
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// JSON file with detection thresholds
        #[arg(short, long)]
        config: Option<String>,
        /// Where the secondary pass for fusion runs
        #[arg(long, value_enum, default_value_t = SecondaryMode::None)]
        secondary: SecondaryMode,
    },
    /// Serve one secondary detection request over stdin/stdout
    Worker,
}

/// One line of the batch report
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobReport {
    image: String,
    ok: bool,
    timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    walls: usize,
    rooms: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<planscan_vision::Quality>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    init_logging(config.log_format);

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .build_global()
        .context("Failed to initialize rayon thread pool")?;

    match cli.command {
        Commands::Detect {
            image,
            style,
            roi,
            labels,
            config: thresholds,
            secondary,
            output,
        } => {
            let labels = match labels {
                Some(path) => read_labels(&path).await?,
                None => Vec::new(),
            };
            let request = DetectionRequest {
                roi,
                style_hint: style,
                labels,
            };
            detect(&config, thresholds.as_deref(), image, request, secondary, output).await
        }
        Commands::Batch {
            images,
            output_dir,
            jobs,
            timeout_secs,
            config: thresholds,
            secondary,
        } => {
            let config = Config {
                max_concurrent_jobs: jobs.unwrap_or(config.max_concurrent_jobs),
                job_timeout_secs: timeout_secs.unwrap_or(config.job_timeout_secs),
                ..config
            };
            batch(&config, thresholds.as_deref(), images, output_dir, secondary).await
        }
        Commands::Worker => services::serve_stdio().await,
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,planscan=debug,planscan_vision=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn processor(config: &Config, thresholds: Option<&str>) -> anyhow::Result<Processor> {
    let detection = config
        .detection(thresholds)
        .context("Failed to load detection config")?;
    let worker = WorkerClient::current_exe(Duration::from_secs(config.worker_timeout_secs))
        .context("Failed to locate the planscan executable for worker mode")?;
    Ok(Processor::new(detection, worker))
}

async fn read_labels(path: &Path) -> anyhow::Result<Vec<TextLabel>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read labels from {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid labels in {}", path.display()))
}

async fn detect(
    config: &Config,
    thresholds: Option<&str>,
    image: PathBuf,
    request: DetectionRequest,
    secondary: SecondaryMode,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let processor = processor(config, thresholds)?;
    let queue = JobQueue::new(1, Duration::from_secs(config.job_timeout_secs));
    let label = image.display().to_string();

    tracing::info!(image = %label, ?secondary, "Starting detection");
    let result = queue
        .run(&label, |cancel| processor.process(image, request, secondary, cancel))
        .await?;

    let json = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}

async fn batch(
    config: &Config,
    thresholds: Option<&str>,
    images: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    secondary: SecondaryMode,
) -> anyhow::Result<()> {
    let processor = processor(config, thresholds)?;
    let queue = JobQueue::new(config.max_concurrent_jobs, Duration::from_secs(config.job_timeout_secs));
    if let Some(dir) = &output_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    tracing::info!(
        images = images.len(),
        max_concurrent_jobs = config.max_concurrent_jobs,
        job_timeout_secs = config.job_timeout_secs,
        ?secondary,
        "Starting batch"
    );

    let mut tasks = tokio::task::JoinSet::new();
    for (index, image) in images.into_iter().enumerate() {
        let queue = queue.clone();
        let processor = processor.clone();
        let output_dir = output_dir.clone();
        tasks.spawn(async move {
            let label = image.display().to_string();
            let outcome = queue
                .run(&label, |cancel| {
                    processor.process(image.clone(), DetectionRequest::default(), secondary, cancel)
                })
                .await;
            let report = match outcome {
                Ok(result) => {
                    let output = match &output_dir {
                        Some(dir) => Some(write_result(dir, &image, &result).await),
                        None => None,
                    };
                    match output {
                        Some(Err(err)) => JobReport {
                            image: label,
                            ok: false,
                            timed_out: false,
                            error: Some(format!("{:#}", err)),
                            output: None,
                            walls: result.walls.len(),
                            rooms: result.rooms.len(),
                            quality: Some(result.metadata.quality),
                        },
                        written => JobReport {
                            image: label,
                            ok: true,
                            timed_out: false,
                            error: None,
                            output: written.and_then(Result::ok),
                            walls: result.walls.len(),
                            rooms: result.rooms.len(),
                            quality: Some(result.metadata.quality),
                        },
                    }
                }
                Err(err) => JobReport {
                    image: label,
                    ok: false,
                    timed_out: err.is_timeout(),
                    error: Some(err.to_string()),
                    output: None,
                    walls: 0,
                    rooms: 0,
                    quality: None,
                },
            };
            (index, report)
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        reports.push(joined?);
    }
    reports.sort_by_key(|(index, _)| *index);

    let failed = reports.iter().filter(|(_, r)| !r.ok).count();
    for (_, report) in &reports {
        println!("{}", serde_json::to_string(report)?);
    }

    tracing::info!(total = reports.len(), failed, "Batch finished");
    if failed > 0 {
        anyhow::bail!("{} of {} jobs failed", failed, reports.len());
    }
    Ok(())
}

/// Write one result as `<dir>/<image stem>.json`, returning the path
async fn write_result(
    dir: &Path,
    image: &Path,
    result: &planscan_vision::DetectionResult,
) -> anyhow::Result<String> {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "plan".to_string());
    let path = dir.join(format!("{}.json", stem));
    let json = serde_json::to_vec_pretty(result)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path.display().to_string())
}

fn parse_region(value: &str) -> Result<Region, String> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("expected X,Y,W,H: {}", e))?;
    match parts.as_slice() {
        &[x, y, width, height] if width > 0 && height > 0 => Ok(Region::new(x, y, width, height)),
        &[_, _, _, _] => Err("region width and height must be positive".into()),
        _ => Err(format!("expected X,Y,W,H, got {} values", parts.len())),
    }
}

fn parse_style(value: &str) -> Result<WallStyle, String> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_string()))
        .map_err(|_| format!("unknown wall style '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        assert_eq!(parse_region("10,20,300,400"), Ok(Region::new(10, 20, 300, 400)));
        assert_eq!(parse_region(" 0, 0, 5, 5 "), Ok(Region::new(0, 0, 5, 5)));
        assert!(parse_region("10,20,300").is_err());
        assert!(parse_region("10,20,0,400").is_err());
        assert!(parse_region("a,b,c,d").is_err());
    }

    #[test]
    fn test_parse_style() {
        assert_eq!(parse_style("solid_dark"), Ok(WallStyle::SolidDark));
        assert_eq!(parse_style("parallel_line"), Ok(WallStyle::ParallelLine));
        assert!(parse_style("blueprint").is_err());
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from([
            "planscan",
            "detect",
            "plan.png",
            "--roi",
            "0,0,100,100",
            "--secondary",
            "in-process",
        ])
        .unwrap();
        match cli.command {
            Commands::Detect { roi, secondary, .. } => {
                assert_eq!(roi, Some(Region::new(0, 0, 100, 100)));
                assert_eq!(secondary, SecondaryMode::InProcess);
            }
            _ => panic!("expected detect"),
        }

        assert!(Cli::try_parse_from(["planscan", "batch"]).is_err());
        assert!(matches!(
            Cli::try_parse_from(["planscan", "worker"]).unwrap().command,
            Commands::Worker
        ));
    }
}
