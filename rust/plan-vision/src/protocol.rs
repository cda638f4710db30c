// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Messages exchanged with an out-of-process secondary detection worker
//!
//! The parent writes one [`WorkerRequest`] as a JSON line to the worker's
//! stdin and reads one [`WorkerResponse`] line back from its stdout.

use crate::budget::CancelToken;
use crate::config::DetectionConfig;
use crate::detectors::DetectorKind;
use crate::error::{PlanError, Result};
use crate::image_ops::{decode_grayscale, load_grayscale, Region};
use crate::pipeline::{PlanDetector, SecondaryDetection};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Where the worker gets the image from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Path { path: String },
    /// Encoded PNG or JPEG bytes
    Bytes { data: Vec<u8> },
}

impl ImageSource {
    pub fn load(&self) -> Result<GrayImage> {
        match self {
            ImageSource::Path { path } => load_grayscale(path),
            ImageSource::Bytes { data } => decode_grayscale(data),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub image: ImageSource,
    #[serde(default)]
    pub roi: Option<Region>,
    #[serde(default)]
    pub config: DetectionConfig,
    /// Defaults to `fusion.secondary_detectors`
    #[serde(default)]
    pub detectors: Option<Vec<DetectorKind>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerResponse {
    Ok(SecondaryDetection),
    Error { message: String },
}

impl WorkerResponse {
    /// Secondary walls for fusion; a worker-side error becomes a fusion input error
    pub fn into_result(self) -> Result<SecondaryDetection> {
        match self {
            WorkerResponse::Ok(detection) => Ok(detection),
            WorkerResponse::Error { message } => Err(PlanError::FusionInputMismatch(message)),
        }
    }
}

/// Run the secondary pass a request asks for
pub fn handle_request(request: &WorkerRequest, cancel: CancelToken) -> WorkerResponse {
    let run = || -> Result<SecondaryDetection> {
        request.config.validate()?;
        let image = request.image.load()?;
        let kinds = request
            .detectors
            .as_deref()
            .unwrap_or(&request.config.fusion.secondary_detectors);
        PlanDetector::with_cancel_token(request.config.clone(), cancel)
            .secondary_pass(&image, request.roi, kinds)
    };

    match run() {
        Ok(detection) => WorkerResponse::Ok(detection),
        Err(err) => {
            tracing::warn!(error = %err, "Secondary detection failed");
            WorkerResponse::Error {
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use image::ImageFormat;
    use std::io::Cursor;

    fn png_bytes(img: &GrayImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_request_defaults() {
        let request: WorkerRequest =
            serde_json::from_str(r#"{"image":{"type":"path","path":"plan.png"}}"#).unwrap();
        assert_eq!(
            request.image,
            ImageSource::Path {
                path: "plan.png".into()
            }
        );
        assert!(request.roi.is_none());
        assert!(request.detectors.is_none());
        assert_eq!(request.config, DetectionConfig::default());
    }

    #[test]
    fn test_missing_image_is_error_response() {
        let request = WorkerRequest {
            image: ImageSource::Path {
                path: "/nonexistent/plan.png".into(),
            },
            roi: None,
            config: DetectionConfig::default(),
            detectors: None,
        };
        let response = handle_request(&request, CancelToken::new());
        assert!(matches!(response, WorkerResponse::Error { .. }));
        assert!(matches!(
            response.into_result(),
            Err(PlanError::FusionInputMismatch(_))
        ));
    }

    #[test]
    fn test_secondary_pass_over_bytes() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let request = WorkerRequest {
            image: ImageSource::Bytes {
                data: png_bytes(&img),
            },
            roi: None,
            config: DetectionConfig::default(),
            detectors: Some(vec![DetectorKind::SolidDark]),
        };
        let detection = handle_request(&request, CancelToken::new()).into_result().unwrap();
        assert_eq!(detection.walls.len(), 4);
        assert_eq!(detection.algorithms, vec!["solid_dark".to_string()]);
    }

    #[test]
    fn test_response_wire_format() {
        let line = serde_json::to_string(&WorkerResponse::Error {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(line, r#"{"status":"error","message":"boom"}"#);

        let ok: WorkerResponse = serde_json::from_str(r#"{"status":"ok","walls":[]}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), SecondaryDetection::default());
    }
}
