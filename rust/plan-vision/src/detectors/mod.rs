// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall detectors: extract raw wall candidates from a grayscale plan.
//!
//! This module defines the [`WallDetector`] trait and the [`DetectorKind`]
//! enum selecting a detector at runtime.
//!
//! # Strategy pattern
//!
//! Every rendering convention gets its own detector, but the five raster
//! detectors share one row/column scanner ([`scan`]) and differ only in the
//! mask they build and the thickness range they accept ([`raster`]). The
//! edge detector ([`edge`]) works from Canny edges and a Hough transform and
//! is mostly used as the secondary pass for fusion.

pub mod edge;
pub mod raster;
pub mod scan;

use crate::budget::Budget;
use crate::config::DetectionConfig;
use crate::error::{PlanError, Result};
use crate::types::{DetectionWarning, Orientation, Point2D, WallSegment};
use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Selects which wall detector to run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Black filled bands
    SolidDark,
    /// Gray filled bands
    MidGray,
    /// Twin thin lines closed into one band
    ParallelLine,
    /// Single thin strokes
    ThinLine,
    /// Hatched bands
    Patterned,
    /// Multi-scale Canny edges plus Hough lines
    EdgeContour,
}

impl DetectorKind {
    pub fn name(&self) -> &'static str {
        match self {
            DetectorKind::SolidDark => "solid_dark",
            DetectorKind::MidGray => "mid_gray",
            DetectorKind::ParallelLine => "parallel_line",
            DetectorKind::ThinLine => "thin_line",
            DetectorKind::Patterned => "patterned",
            DetectorKind::EdgeContour => "edge_contour",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Interval a detector bridged while joining one wall run
///
/// These are the raw evidence for doors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BridgedGap {
    pub orientation: Orientation,
    /// Perpendicular coordinate of the wall band center (y for horizontal runs)
    pub line: f64,
    /// First missing pixel along the run
    pub from: f64,
    /// One past the last missing pixel
    pub to: f64,
}

impl BridgedGap {
    pub fn width(&self) -> f64 {
        self.to - self.from
    }

    pub fn center(&self) -> Point2D {
        let along = (self.from + self.to) / 2.0;
        match self.orientation {
            Orientation::Horizontal => Point2D::new(along, self.line),
            Orientation::Vertical => Point2D::new(self.line, along),
        }
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        let (line_shift, along_shift) = match self.orientation {
            Orientation::Horizontal => (dy, dx),
            Orientation::Vertical => (dx, dy),
        };
        Self {
            line: self.line + line_shift,
            from: self.from + along_shift,
            to: self.to + along_shift,
            ..*self
        }
    }
}

/// Candidates produced by one detector run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorOutput {
    pub kind: DetectorKind,
    pub segments: Vec<WallSegment>,
    pub gaps: Vec<BridgedGap>,
}

impl DetectorOutput {
    pub fn empty(kind: DetectorKind) -> Self {
        Self {
            kind,
            segments: Vec::new(),
            gaps: Vec::new(),
        }
    }
}

/// Read-only inputs shared by all detectors of one run
pub struct DetectorContext<'a> {
    pub image: &'a GrayImage,
    /// Standard deviation of intensity
    pub contrast: f64,
    pub config: &'a DetectionConfig,
    pub budget: &'a Budget,
}

/// Trait for wall detection strategies.
///
/// Input: the grayscale plan and its thresholds.
/// Output: axis-aligned (or near-axis) wall candidates and bridged gaps.
pub trait WallDetector {
    fn kind(&self) -> DetectorKind;

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<DetectorOutput>;
}

impl WallDetector for DetectorKind {
    fn kind(&self) -> DetectorKind {
        *self
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<DetectorOutput> {
        match *self {
            Self::EdgeContour => edge::detect_edge_walls(ctx),
            raster_kind => raster::detect_raster_walls(raster_kind, ctx),
        }
    }
}

/// Run detectors in parallel on the rayon pool
///
/// Each detector gets its own deadline. A detector that times out or fails is
/// skipped and reported as a warning; cancellation aborts the whole run.
pub fn run_detectors(
    kinds: &[DetectorKind],
    ctx: &DetectorContext<'_>,
) -> Result<(Vec<DetectorOutput>, Vec<DetectionWarning>)> {
    let limit = Duration::from_millis(ctx.config.budget.detector_timeout_ms);

    let results: Vec<(DetectorKind, Result<DetectorOutput>)> = kinds
        .par_iter()
        .map(|kind| {
            let budget = ctx.budget.restart(limit);
            let local = DetectorContext {
                image: ctx.image,
                contrast: ctx.contrast,
                config: ctx.config,
                budget: &budget,
            };
            (*kind, kind.detect(&local))
        })
        .collect();

    let mut outputs = Vec::with_capacity(results.len());
    let mut warnings = Vec::new();

    for (kind, result) in results {
        match result {
            Ok(output) => {
                tracing::debug!(
                    detector = %kind,
                    segments = output.segments.len(),
                    gaps = output.gaps.len(),
                    "Detector finished"
                );
                outputs.push(output);
            }
            Err(PlanError::DetectorTimeout {
                detector,
                elapsed_ms,
            }) => {
                tracing::warn!(detector = %detector, elapsed_ms, "Detector exceeded its budget, skipping");
                warnings.push(DetectionWarning::DetectorTimeout {
                    detector,
                    elapsed_ms,
                });
            }
            Err(err @ PlanError::Cancelled { .. }) => return Err(err),
            Err(err) => {
                tracing::warn!(detector = %kind, error = %err, "Detector failed, skipping");
                warnings.push(DetectionWarning::DetectorFailed {
                    detector: kind,
                    reason: err.to_string(),
                });
            }
        }
    }

    Ok((outputs, warnings))
}

/// Initial confidence from length, thickness and axis alignment
pub(crate) fn initial_confidence(
    length: f64,
    thickness: f64,
    alignment: f64,
    config: &DetectionConfig,
) -> f32 {
    let t = &config.scan;
    let length_score = (length / t.length_saturation).min(1.0);
    let thickness_score = if thickness < t.typical_thickness_min {
        thickness / t.typical_thickness_min
    } else if thickness > t.typical_thickness_max {
        (1.0 - (thickness - t.typical_thickness_max) / t.typical_thickness_max).max(0.0)
    } else {
        1.0
    };
    let score = 0.4 * length_score + 0.3 * thickness_score + 0.3 * alignment.clamp(0.0, 1.0);
    score.clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_detector_kind_names() {
        assert_eq!(DetectorKind::EdgeContour.to_string(), "edge_contour");
        assert_eq!(
            serde_json::to_value(DetectorKind::ParallelLine).unwrap(),
            "parallel_line"
        );
    }

    #[test]
    fn test_gap_center_and_translation() {
        let gap = BridgedGap {
            orientation: Orientation::Vertical,
            line: 24.0,
            from: 100.0,
            to: 116.0,
        };
        assert_relative_eq!(gap.width(), 16.0);
        assert_eq!(gap.center(), Point2D::new(24.0, 108.0));

        let moved = gap.translated(10.0, 5.0);
        assert_relative_eq!(moved.line, 34.0);
        assert_relative_eq!(moved.from, 105.0);
    }

    #[test]
    fn test_initial_confidence_favors_typical_walls() {
        let config = DetectionConfig::default();
        let typical = initial_confidence(200.0, 8.0, 1.0, &config);
        let hairline = initial_confidence(200.0, 1.0, 1.0, &config);
        let short = initial_confidence(30.0, 8.0, 1.0, &config);
        assert_relative_eq!(typical, 1.0, epsilon = 1e-6);
        assert!(hairline < typical);
        assert!(short < typical);
    }

    #[test]
    fn test_run_detectors_reports_timeouts() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let mut config = DetectionConfig::default();
        config.budget.detector_timeout_ms = 0;
        let budget = Budget::unlimited();
        let ctx = DetectorContext {
            image: &img,
            contrast: 50.0,
            config: &config,
            budget: &budget,
        };

        let (outputs, warnings) = run_detectors(&[DetectorKind::SolidDark], &ctx).unwrap();
        assert!(outputs.is_empty());
        assert!(matches!(
            warnings[0],
            DetectionWarning::DetectorTimeout {
                detector: DetectorKind::SolidDark,
                ..
            }
        ));
    }

    #[test]
    fn test_run_detectors_stops_on_cancel() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let config = DetectionConfig::default();
        let budget = Budget::unlimited();
        budget.cancel_token().cancel();
        let ctx = DetectorContext {
            image: &img,
            contrast: 50.0,
            config: &config,
            budget: &budget,
        };

        let err = run_detectors(&[DetectorKind::SolidDark], &ctx).unwrap_err();
        assert!(matches!(err, PlanError::Cancelled { .. }));
    }
}
