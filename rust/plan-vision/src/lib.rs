// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall, room and opening detection for raster floor plans
//!
//! This crate provides a complete pipeline for:
//! 1. Classifying how walls are drawn (solid, gray, twin lines, thin, hatched)
//! 2. Detecting walls with the detectors suited to that style
//! 3. Merging duplicate wall candidates to a fixed point
//! 4. Fusing a secondary detection pass (optional)
//! 5. Classifying walls, segmenting rooms and inferring doors and windows
//! 6. Grading the result
//!
//! # Usage
//!
//! ```rust,ignore
//! use planscan_vision::{detect_file, DetectionConfig, DetectionRequest};
//!
//! let result = detect_file("plan.png", &DetectionConfig::default(), &DetectionRequest::default())?;
//! println!("{} walls, {} rooms", result.walls.len(), result.rooms.len());
//! ```

pub mod budget;
pub mod classify;
pub mod confidence;
pub mod config;
pub mod detectors;
pub mod error;
pub mod fusion;
pub mod image_ops;
pub mod line_ops;
pub mod measure;
pub mod merge;
pub mod openings;
pub mod pipeline;
pub mod protocol;
pub mod room_detector;
pub mod style;
pub mod types;

#[cfg(test)]
mod fixtures;

// Re-export commonly used types and functions
pub use budget::{Budget, CancelToken};
pub use config::DetectionConfig;
pub use detectors::{DetectorKind, WallDetector};
pub use error::{PlanError, Result};
pub use image_ops::{decode_grayscale, load_grayscale, rgba_to_grayscale, Region};
pub use merge::merge_segments;
pub use pipeline::{DetectionRequest, PlanDetector, SecondaryDetection};
pub use protocol::{handle_request, ImageSource, WorkerRequest, WorkerResponse};
pub use style::WallStyle;
pub use types::{
    DetectionResult, DetectionWarning, Opening, OpeningKind, Point2D, Quality, Room, TextLabel,
    WallSegment, WallType,
};

use std::path::Path;

/// Load an image file and run the full detection pipeline on it
pub fn detect_file(
    path: impl AsRef<Path>,
    config: &DetectionConfig,
    request: &DetectionRequest,
) -> Result<DetectionResult> {
    let image = load_grayscale(path)?;
    PlanDetector::new(config.clone()).detect(&image, request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_file_is_image_load_error() {
        let err = detect_file(
            "/nonexistent/plan.png",
            &DetectionConfig::default(),
            &DetectionRequest::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::ImageLoad { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rgba_pipeline() {
        let gray = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let rgba: Vec<u8> = gray.pixels().flat_map(|p| [p.0[0], p.0[0], p.0[0], 255]).collect();

        let image = rgba_to_grayscale(&rgba, 200, 200).unwrap();
        let result = PlanDetector::new(DetectionConfig::default())
            .detect(&image, &DetectionRequest::default())
            .unwrap();
        assert_eq!(result.walls.len(), 4);
        assert_eq!(result.rooms.len(), 1);
    }
}
