// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detection of one image file, with the chosen secondary pass.

use crate::error::BatchError;
use crate::services::worker::WorkerClient;
use planscan_vision::{
    load_grayscale, CancelToken, DetectionConfig, DetectionRequest, DetectionResult, ImageSource,
    PlanDetector, PlanError, WorkerRequest,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the secondary detection pass for fusion runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SecondaryMode {
    /// Primary pass only
    #[default]
    None,
    /// Secondary detectors on this process's thread pool
    InProcess,
    /// Secondary detectors in a separate worker process
    Worker,
}

/// Runs detections with shared thresholds.
#[derive(Debug, Clone)]
pub struct Processor {
    config: Arc<DetectionConfig>,
    worker: WorkerClient,
}

impl Processor {
    pub fn new(config: DetectionConfig, worker: WorkerClient) -> Self {
        Self {
            config: Arc::new(config),
            worker,
        }
    }

    /// Detection config with fusion switched to match `mode`
    fn config_for(&self, mode: SecondaryMode) -> DetectionConfig {
        let mut config = (*self.config).clone();
        config.fusion.enabled = mode == SecondaryMode::InProcess;
        config
    }

    /// Detect walls, rooms and openings in one image file
    pub async fn process(
        &self,
        image: PathBuf,
        request: DetectionRequest,
        mode: SecondaryMode,
        cancel: CancelToken,
    ) -> Result<DetectionResult, BatchError> {
        let config = self.config_for(mode);
        let path = image.clone();
        let load = tokio::task::spawn_blocking(move || load_grayscale(&path));

        let (image, secondary) = if mode == SecondaryMode::Worker {
            let worker_request = WorkerRequest {
                image: ImageSource::Path {
                    path: image.display().to_string(),
                },
                roi: request.roi,
                config: config.clone(),
                detectors: None,
            };
            let (loaded, secondary) = tokio::join!(load, self.worker.run(&worker_request));
            // A failed worker only costs the fusion stage
            let secondary = secondary.map_err(|err| match err {
                BatchError::Detection(err) => err,
                other => PlanError::FusionInputMismatch(other.to_string()),
            });
            (loaded??, Some(secondary))
        } else {
            (load.await??, None)
        };

        let result = tokio::task::spawn_blocking(move || {
            let detector = PlanDetector::with_cancel_token(config, cancel);
            match secondary {
                Some(secondary) => detector.detect_with_secondary(&image, &request, secondary),
                None => detector.detect(&image, &request),
            }
        })
        .await??;

        tracing::info!(
            walls = result.walls.len(),
            rooms = result.rooms.len(),
            doors = result.doors.len(),
            windows = result.windows.len(),
            quality = ?result.metadata.quality,
            processing_time_ms = result.metadata.processing_time_ms,
            "Detection complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planscan_vision::{DetectionWarning, WallType};
    use std::time::Duration;

    fn write_plan(name: &str) -> PathBuf {
        let mut img = image::GrayImage::from_pixel(200, 200, image::Luma([255]));
        for y in 20..180 {
            for x in 20..180 {
                let inside = (28..172).contains(&x) && (28..172).contains(&y);
                if !inside {
                    img.put_pixel(x, y, image::Luma([0]));
                }
            }
        }
        let path = std::env::temp_dir().join(format!("planscan-{}-{}.png", name, std::process::id()));
        img.save(&path).unwrap();
        path
    }

    fn processor(worker: WorkerClient) -> Processor {
        Processor::new(DetectionConfig::default(), worker)
    }

    #[tokio::test]
    async fn test_primary_only() {
        let path = write_plan("primary");
        let worker = WorkerClient::new("/nonexistent/planscan", Vec::new(), Duration::from_secs(1));
        let result = processor(worker)
            .process(path.clone(), DetectionRequest::default(), SecondaryMode::None, CancelToken::new())
            .await
            .unwrap();
        let _ = std::fs::remove_file(path);

        assert_eq!(result.walls.len(), 4);
        assert!(result.walls.iter().all(|w| w.wall_type == WallType::Exterior));
        assert_eq!(result.rooms.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_image_fails_job() {
        let worker = WorkerClient::new("/nonexistent/planscan", Vec::new(), Duration::from_secs(1));
        let err = processor(worker)
            .process(
                PathBuf::from("/nonexistent/plan.png"),
                DetectionRequest::default(),
                SecondaryMode::None,
                CancelToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Detection(PlanError::ImageLoad { .. })));
    }

    #[tokio::test]
    async fn test_unavailable_worker_falls_back_to_primary() {
        let path = write_plan("fallback");
        let worker = WorkerClient::new("/nonexistent/planscan", Vec::new(), Duration::from_secs(1));
        let result = processor(worker)
            .process(path.clone(), DetectionRequest::default(), SecondaryMode::Worker, CancelToken::new())
            .await
            .unwrap();
        let _ = std::fs::remove_file(path);

        assert_eq!(result.walls.len(), 4);
        assert!(result.has_warning(|w| matches!(w, DetectionWarning::FusionInputMismatch { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_walls_are_fused() {
        let path = write_plan("fused");
        let response = r#"{"status":"ok","walls":[{"id":0,"start":{"x":100.0,"y":60.0},"end":{"x":100.0,"y":140.0},"thickness":6.0,"type":"unknown","confidence":0.6,"source":"edge_contour","provenance":"primary","interiorDarkness":120.0,"lightInterior":false}],"algorithms":["edge_contour"]}"#;
        let script = format!("cat > /dev/null; echo '{}'", response);
        let worker = WorkerClient::new("sh", vec!["-c".into(), script.into()], Duration::from_secs(10));

        let result = processor(worker)
            .process(path.clone(), DetectionRequest::default(), SecondaryMode::Worker, CancelToken::new())
            .await
            .unwrap();
        let _ = std::fs::remove_file(path);

        assert_eq!(result.walls.len(), 5);
        assert!(result.metadata.algorithms.iter().any(|a| a == "fusion"));
    }
}
