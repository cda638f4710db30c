// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end detection of one floor plan image
//!
//! ```text
//! crop → style → detectors → merge ─┬─ fusion? → merge → classify → rooms → openings → confidence
//!                secondary pass ────┘
//! ```
//!
//! A [`PlanDetector`] holds nothing but its configuration and a cancellation
//! token; build one per invocation.

use crate::budget::{Budget, CancelToken};
use crate::classify::{assign_types, classify_walls};
use crate::config::DetectionConfig;
use crate::confidence::{grade, overall_confidence};
use crate::detectors::{run_detectors, BridgedGap, DetectorContext, DetectorKind};
use crate::error::{PlanError, Result};
use crate::fusion::{fuse_openings, fuse_walls, validate_secondary};
use crate::image_ops::{crop_region, intensity_stats, Region};
use crate::measure::{measure, resolve_scale};
use crate::merge::merge_segments;
use crate::openings::{detect_openings, link_rooms};
use crate::room_detector::{apply_labels, detect_rooms};
use crate::style::{self, WallStyle};
use crate::types::{
    DetectionResult, DetectionWarning, Metadata, Opening, TextLabel, WallSegment,
};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::{Duration, Instant};

/// Per-image inputs besides the pixels
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionRequest {
    /// Only detect inside this region; results stay in image coordinates
    pub roi: Option<Region>,
    /// Skip style classification and use this style's detectors
    pub style_hint: Option<WallStyle>,
    /// Room names from a text extraction service, in image coordinates
    pub labels: Vec<TextLabel>,
}

/// Walls and openings of a secondary detection pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SecondaryDetection {
    pub walls: Vec<WallSegment>,
    pub doors: Vec<Opening>,
    pub windows: Vec<Opening>,
    pub algorithms: Vec<String>,
    pub warnings: Vec<DetectionWarning>,
}

impl SecondaryDetection {
    fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            walls: self.walls.iter().map(|w| w.translated(dx, dy)).collect(),
            doors: self.doors.iter().map(|o| o.translated(dx, dy)).collect(),
            windows: self.windows.iter().map(|o| o.translated(dx, dy)).collect(),
            ..self.clone()
        }
    }
}

/// Where the secondary pass comes from
enum SecondarySource {
    Disabled,
    InProcess,
    /// Already computed elsewhere (e.g. a worker process), in image coordinates
    Provided(Result<SecondaryDetection>),
}

/// Merged walls of one detection pass, before classification
struct Pass {
    walls: Vec<WallSegment>,
    gaps: Vec<BridgedGap>,
    warnings: Vec<DetectionWarning>,
    kinds: Vec<DetectorKind>,
}

/// Floor plan detector
pub struct PlanDetector {
    config: DetectionConfig,
    cancel: CancelToken,
}

impl PlanDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self::with_cancel_token(config, CancelToken::new())
    }

    /// Detector whose work stops once `cancel` is raised
    pub fn with_cancel_token(config: DetectionConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect walls, rooms and openings
    ///
    /// Runs the in-process secondary pass and fuses it when
    /// `fusion.enabled` is set.
    pub fn detect(&self, image: &GrayImage, request: &DetectionRequest) -> Result<DetectionResult> {
        let source = if self.config.fusion.enabled {
            SecondarySource::InProcess
        } else {
            SecondarySource::Disabled
        };
        self.detect_with(image, request, source)
    }

    /// Detect and fuse with a secondary pass computed elsewhere
    ///
    /// A failed or malformed secondary result only adds a warning.
    pub fn detect_with_secondary(
        &self,
        image: &GrayImage,
        request: &DetectionRequest,
        secondary: Result<SecondaryDetection>,
    ) -> Result<DetectionResult> {
        self.detect_with(image, request, SecondarySource::Provided(secondary))
    }

    /// Run only the secondary detectors, returning image coordinates
    pub fn secondary_pass(
        &self,
        image: &GrayImage,
        roi: Option<Region>,
        kinds: &[DetectorKind],
    ) -> Result<SecondaryDetection> {
        let (working, dx, dy) = working_image(image, roi)?;
        let contrast = intensity_stats(&working).std_dev;
        let local = self.secondary_local(&working, contrast, kinds)?;
        Ok(local.translated(dx, dy))
    }

    fn budget(&self) -> Budget {
        Budget::new(
            Duration::from_millis(self.config.budget.detector_timeout_ms),
            self.cancel.clone(),
        )
    }

    /// Drop walls below the minimum length and number the rest
    fn finalize(&self, walls: Vec<WallSegment>) -> Vec<WallSegment> {
        let min_length = self.config.scan.min_wall_length;
        walls
            .into_iter()
            .filter(|w| w.is_well_formed() && w.length() >= min_length)
            .enumerate()
            .map(|(id, mut w)| {
                w.id = id;
                w.confidence = w.confidence.clamp(0.0, 1.0);
                w
            })
            .collect()
    }

    fn run_pass(&self, image: &GrayImage, contrast: f64, kinds: &[DetectorKind]) -> Result<Pass> {
        let budget = self.budget();
        let ctx = DetectorContext {
            image,
            contrast,
            config: &self.config,
            budget: &budget,
        };
        let (outputs, mut warnings) = run_detectors(kinds, &ctx)?;

        let mut candidates = Vec::new();
        let mut gaps = Vec::new();
        for output in outputs {
            candidates.extend(output.segments);
            gaps.extend(output.gaps);
        }
        let raw = candidates.len();

        let merged = merge_segments(candidates, &self.config.merge);
        if !merged.converged {
            warnings.push(DetectionWarning::MergeIterationCap {
                passes: merged.passes,
                dropped: merged.dropped,
            });
        }
        let walls = self.finalize(merged.walls);
        tracing::debug!(
            detectors = kinds.len(),
            candidates = raw,
            walls = walls.len(),
            passes = merged.passes,
            "Detection pass merged"
        );

        Ok(Pass {
            walls,
            gaps,
            warnings,
            kinds: kinds.to_vec(),
        })
    }

    fn secondary_local(
        &self,
        image: &GrayImage,
        contrast: f64,
        kinds: &[DetectorKind],
    ) -> Result<SecondaryDetection> {
        let pass = self.run_pass(image, contrast, kinds)?;
        let mut walls = pass.walls;
        // Confidence stays raw until the fused set is classified
        assign_types(&mut walls, &self.config.classify);
        let openings = detect_openings(&walls, &pass.gaps, &self.config.openings);
        Ok(SecondaryDetection {
            walls,
            doors: openings.doors,
            windows: openings.windows,
            algorithms: pass.kinds.iter().map(|k| k.name().to_string()).collect(),
            warnings: pass.warnings,
        })
    }

    fn detect_with(
        &self,
        image: &GrayImage,
        request: &DetectionRequest,
        source: SecondarySource,
    ) -> Result<DetectionResult> {
        let started = Instant::now();
        let config = &self.config;

        let (working, dx, dy) = working_image(image, request.roi)?;
        let contrast = intensity_stats(&working).std_dev;

        let style = match request.style_hint {
            Some(hint) => hint,
            None => style::classify(&working, &config.style).style,
        };
        let kinds = style.detectors(&config.style);
        tracing::debug!(%style, contrast, detectors = kinds.len(), "Style selected");

        let secondary_kinds = &config.fusion.secondary_detectors;
        let (primary, secondary) = match source {
            SecondarySource::Disabled => (self.run_pass(&working, contrast, &kinds), None),
            SecondarySource::InProcess => {
                let (primary, secondary) = rayon::join(
                    || self.run_pass(&working, contrast, &kinds),
                    || self.secondary_local(&working, contrast, secondary_kinds),
                );
                (primary, Some(secondary))
            }
            SecondarySource::Provided(result) => {
                (self.run_pass(&working, contrast, &kinds), Some(result.map(|s| s.translated(-dx, -dy))))
            }
        };
        let primary = primary?;

        let mut warnings = primary.warnings;
        let mut algorithms: Vec<String> = primary.kinds.iter().map(|k| k.name().to_string()).collect();
        let mut walls = primary.walls;
        let mut secondary_openings: Vec<Opening> = Vec::new();

        match secondary {
            None => {}
            Some(Err(err @ PlanError::Cancelled { .. })) => return Err(err),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "Secondary pass failed, using primary walls only");
                warnings.push(DetectionWarning::FusionInputMismatch {
                    reason: err.to_string(),
                });
            }
            Some(Ok(sec)) => match validate_secondary(&sec.walls) {
                Err(err) => {
                    tracing::warn!(error = %err, "Secondary walls rejected, using primary walls only");
                    warnings.push(DetectionWarning::FusionInputMismatch {
                        reason: err.to_string(),
                    });
                }
                Ok(()) => {
                    let fused = fuse_walls(walls, &sec.walls, contrast, config);
                    let merged = merge_segments(fused.walls, &config.merge);
                    if !merged.converged {
                        warnings.push(DetectionWarning::MergeIterationCap {
                            passes: merged.passes,
                            dropped: merged.dropped,
                        });
                    }
                    walls = self.finalize(merged.walls);
                    warnings.extend(sec.warnings);
                    algorithms.extend(sec.algorithms);
                    algorithms.push("fusion".to_string());
                    secondary_openings = sec.doors.into_iter().chain(sec.windows).collect();
                }
            },
        }

        classify_walls(&mut walls, &config.classify);

        let scale = resolve_scale(&config.measure, image.width());
        let mut rooms = detect_rooms(&walls, working.width(), working.height(), scale, &config.rooms);
        let local_labels: Vec<TextLabel> = request
            .labels
            .iter()
            .map(|l| TextLabel {
                text: l.text.clone(),
                position: l.position.offset(-dx, -dy),
            })
            .collect();
        apply_labels(&mut rooms, &local_labels, &config.rooms);

        let mut openings = detect_openings(&walls, &primary.gaps, &config.openings);
        if !secondary_openings.is_empty() {
            openings = fuse_openings(
                openings,
                &secondary_openings,
                &walls,
                &config.openings,
                config.fusion.opening_duplicate_radius,
            );
        }
        link_rooms(&mut rooms, &openings);

        if walls.is_empty() {
            tracing::warn!(width = working.width(), height = working.height(), "No walls detected");
            warnings.push(DetectionWarning::NoWallsDetected);
        }

        let confidence = overall_confidence(&walls, &rooms, openings.iter(), &config.quality);
        let quality = grade(confidence, walls.len(), &config.quality);

        // Back to image coordinates
        let walls: Vec<WallSegment> = walls.iter().map(|w| w.translated(dx, dy)).collect();
        let rooms: Vec<_> = rooms.iter().map(|r| r.translated(dx, dy)).collect();
        let doors: Vec<Opening> = openings.doors.iter().map(|o| o.translated(dx, dy)).collect();
        let windows: Vec<Opening> = openings.windows.iter().map(|o| o.translated(dx, dy)).collect();
        let measurements = measure(&rooms, &walls, scale, &config.measure);

        let processing_time_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            walls = walls.len(),
            rooms = rooms.len(),
            doors = doors.len(),
            windows = windows.len(),
            confidence,
            ?quality,
            processing_time_ms,
            "Detection finished"
        );

        Ok(DetectionResult {
            walls,
            rooms,
            doors,
            windows,
            measurements,
            metadata: Metadata {
                confidence,
                processing_time_ms,
                algorithms,
                quality,
                style,
                contrast,
                image_width: image.width(),
                image_height: image.height(),
                warnings,
            },
        })
    }
}

/// The image region detection runs on, plus its offset in the image
fn working_image(image: &GrayImage, roi: Option<Region>) -> Result<(Cow<'_, GrayImage>, f64, f64)> {
    match roi {
        Some(region) => {
            let cropped = crop_region(image, region)?;
            Ok((Cow::Owned(cropped), region.x as f64, region.y as f64))
        }
        None => Ok((Cow::Borrowed(image), 0.0, 0.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::merge::has_overlapping_pair;
    use crate::types::{Orientation, Point2D, Provenance, Quality, WallType};

    fn detect(image: &GrayImage) -> DetectionResult {
        PlanDetector::new(DetectionConfig::default())
            .detect(image, &DetectionRequest::default())
            .unwrap()
    }

    fn assert_invariants(result: &DetectionResult, config: &DetectionConfig) {
        for wall in &result.walls {
            assert!((0.0..=1.0).contains(&wall.confidence));
            assert!(wall.length() >= config.scan.min_wall_length);
            assert_ne!(wall.wall_type, WallType::Unknown);
        }
        assert!(!has_overlapping_pair(&result.walls, &config.merge));
        for room in &result.rooms {
            let nearby = result.walls.iter().any(|w| {
                room.polygon.iter().any(|v| {
                    w.endpoints()
                        .iter()
                        .any(|p| p.distance_to(v) <= config.rooms.wall_vertex_tolerance)
                })
            });
            if nearby {
                assert!(!room.wall_ids.is_empty());
            }
        }
        let mut ids: Vec<usize> = result.openings().map(|o| o.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), result.doors.len() + result.windows.len());
    }

    #[test]
    fn test_solid_black_rectangle() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let result = detect(&img);

        assert_eq!(result.metadata.style, WallStyle::SolidDark);
        assert_eq!(result.walls.len(), 4);
        assert!(result.walls.iter().all(|w| w.wall_type == WallType::Exterior));
        assert_eq!(result.rooms.len(), 1);

        // Interior is 144 x 144 pixels
        let interior = 144.0 * 144.0;
        let room = &result.rooms[0];
        assert!((room.area - interior).abs() / interior < 0.05);
        assert_eq!(room.wall_ids.len(), 4);
        assert!(result.metadata.warnings.is_empty());
        assert_invariants(&result, &DetectionConfig::default());
    }

    #[test]
    fn test_double_line_partition_is_interior() {
        let img = fixtures::double_line_plan();
        let result = detect(&img);

        assert!(matches!(
            result.metadata.style,
            WallStyle::ParallelLine | WallStyle::MidGray
        ));
        assert!(result
            .walls
            .iter()
            .any(|w| w.wall_type == WallType::Interior && w.confidence >= 0.7));
        assert_invariants(&result, &DetectionConfig::default());
    }

    #[test]
    fn test_noise_yields_low_quality() {
        let img = fixtures::noise(200, 200, 42);
        let result = detect(&img);

        assert!(result.walls.len() <= 2);
        assert_eq!(result.metadata.quality, Quality::Low);
    }

    #[test]
    fn test_blank_page_warns_no_walls() {
        let img = fixtures::blank(120, 120);
        let result = detect(&img);

        assert!(result.walls.is_empty());
        assert!(result.rooms.is_empty());
        assert_eq!(result.metadata.quality, Quality::Low);
        assert!(result.has_warning(|w| matches!(w, DetectionWarning::NoWallsDetected)));
    }

    #[test]
    fn test_rooms_in_row_recovered() {
        let n = 3;
        let img = fixtures::rooms_in_row(n);
        let result = detect(&img);

        assert_eq!(result.rooms.len(), n as usize);
        assert_invariants(&result, &DetectionConfig::default());

        let expected_span = (n * (fixtures::ROW_ROOM_WIDTH + fixtures::ROW_WALL) + fixtures::ROW_WALL) as f64;
        let longest = result.walls.iter().map(|w| w.length()).fold(0.0, f64::max);
        assert!((longest - expected_span).abs() / expected_span < 0.1);

        let expected_height = (fixtures::ROW_ROOM_HEIGHT + 2 * fixtures::ROW_WALL) as f64;
        let partitions: Vec<&WallSegment> = result
            .walls
            .iter()
            .filter(|w| (w.end.y - w.start.y).abs() > (w.end.x - w.start.x).abs())
            .collect();
        assert_eq!(partitions.len(), n as usize + 1);
        for wall in partitions {
            assert!((wall.length() - expected_height).abs() / expected_height < 0.1);
        }

        for room in &result.rooms {
            let interior = (fixtures::ROW_ROOM_WIDTH * fixtures::ROW_ROOM_HEIGHT) as f64;
            assert!((room.area - interior).abs() / interior < 0.05);
        }
    }

    #[test]
    fn test_roi_results_in_image_coordinates() {
        let img = fixtures::solid_rectangle(300, 300, 60, 60, 220, 220, 8, 0);
        let request = DetectionRequest {
            roi: Some(Region::new(40, 40, 200, 200)),
            ..DetectionRequest::default()
        };
        let result = PlanDetector::new(DetectionConfig::default())
            .detect(&img, &request)
            .unwrap();

        assert_eq!(result.walls.len(), 4);
        let top = result
            .walls
            .iter()
            .filter(|w| w.orientation() == Orientation::Horizontal)
            .min_by(|a, b| a.midpoint().y.total_cmp(&b.midpoint().y))
            .unwrap();
        assert!((top.midpoint().y - 63.5).abs() < 1e-9);
        assert!((top.start.x.min(top.end.x) - 60.0).abs() < 1e-9);
        assert_eq!(result.rooms.len(), 1);
        assert!((result.rooms[0].centroid.x - 139.5).abs() < 1e-9);
        assert_eq!(result.metadata.image_width, 300);
    }

    #[test]
    fn test_roi_outside_image_is_fatal() {
        let img = fixtures::blank(100, 100);
        let request = DetectionRequest {
            roi: Some(Region::new(80, 80, 50, 50)),
            ..DetectionRequest::default()
        };
        let err = PlanDetector::new(DetectionConfig::default())
            .detect(&img, &request)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_external_labels_in_image_coordinates() {
        let img = fixtures::solid_rectangle(300, 300, 60, 60, 220, 220, 8, 0);
        let request = DetectionRequest {
            roi: Some(Region::new(40, 40, 200, 200)),
            labels: vec![TextLabel {
                text: "Studio".into(),
                position: Point2D::new(150.0, 150.0),
            }],
            ..DetectionRequest::default()
        };
        let result = PlanDetector::new(DetectionConfig::default())
            .detect(&img, &request)
            .unwrap();
        let label = result.rooms[0].label.as_ref().unwrap();
        assert_eq!(label.text, "Studio");
    }

    #[test]
    fn test_failed_secondary_falls_back_to_primary() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let result = PlanDetector::new(DetectionConfig::default())
            .detect_with_secondary(
                &img,
                &DetectionRequest::default(),
                Err(PlanError::FusionInputMismatch("worker exited with status 1".into())),
            )
            .unwrap();

        assert_eq!(result.walls.len(), 4);
        assert!(result.has_warning(|w| matches!(w, DetectionWarning::FusionInputMismatch { .. })));
        assert!(!result.metadata.algorithms.iter().any(|a| a == "fusion"));
    }

    #[test]
    fn test_malformed_secondary_is_ignored() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let mut bad = WallSegment::new(
            Point2D::new(20.0, 23.5),
            Point2D::new(f64::NAN, 23.5),
            8.0,
            DetectorKind::EdgeContour,
        );
        bad.confidence = 0.9;
        let secondary = SecondaryDetection {
            walls: vec![bad],
            ..SecondaryDetection::default()
        };
        let result = PlanDetector::new(DetectionConfig::default())
            .detect_with_secondary(&img, &DetectionRequest::default(), Ok(secondary))
            .unwrap();

        assert_eq!(result.walls.len(), 4);
        assert!(result.has_warning(|w| matches!(w, DetectionWarning::FusionInputMismatch { .. })));
    }

    #[test]
    fn test_provided_secondary_is_fused() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let mut refining = WallSegment::new(
            Point2D::new(22.0, 24.0),
            Point2D::new(178.0, 24.0),
            8.0,
            DetectorKind::EdgeContour,
        );
        refining.confidence = 0.9;
        let mut extra = WallSegment::new(
            Point2D::new(100.0, 60.0),
            Point2D::new(100.0, 140.0),
            6.0,
            DetectorKind::EdgeContour,
        );
        extra.confidence = 0.6;
        extra.interior_darkness = 120.0;

        let secondary = SecondaryDetection {
            walls: vec![refining, extra],
            algorithms: vec!["edge_contour".into()],
            ..SecondaryDetection::default()
        };
        let result = PlanDetector::new(DetectionConfig::default())
            .detect_with_secondary(&img, &DetectionRequest::default(), Ok(secondary))
            .unwrap();

        assert_eq!(result.walls.len(), 5);
        assert_eq!(
            result.walls.iter().filter(|w| w.provenance == Provenance::Merged).count(),
            1
        );
        let appended: Vec<&WallSegment> = result
            .walls
            .iter()
            .filter(|w| w.provenance == Provenance::Secondary)
            .collect();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].source, DetectorKind::EdgeContour);
        assert!(result.metadata.algorithms.iter().any(|a| a == "fusion"));
        assert_eq!(result.rooms.len(), 1);
        assert_invariants(&result, &DetectionConfig::default());
    }

    #[test]
    fn test_in_process_fusion_runs() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let mut config = DetectionConfig::default();
        config.fusion.enabled = true;
        let result = PlanDetector::new(config.clone())
            .detect(&img, &DetectionRequest::default())
            .unwrap();

        assert!(result.walls.len() >= 4);
        assert!(result.metadata.algorithms.iter().any(|a| a == "edge_contour"));
        assert_invariants(&result, &config);

        let baseline = detect(&img);
        let raw_secondary = PlanDetector::new(config.clone())
            .secondary_pass(&img, None, &config.fusion.secondary_detectors)
            .unwrap();
        for wall in &result.walls {
            match wall.provenance {
                Provenance::Primary => {
                    assert!(wall.confidence <= nearest(&baseline.walls, wall).confidence + 1e-6);
                }
                Provenance::Merged => {
                    assert_eq!(wall.enhanced_by, Some(DetectorKind::EdgeContour));
                    let limit = nearest(&baseline.walls, wall).confidence + config.fusion.confidence_bonus;
                    assert!(wall.confidence <= limit + 1e-6);
                }
                Provenance::Secondary => {
                    assert_eq!(wall.source, DetectorKind::EdgeContour);
                    let raw = nearest(&raw_secondary.walls, wall).confidence;
                    assert!(wall.confidence <= one_bonus(raw, &config) + 1e-6);
                }
            }
        }
    }

    fn nearest<'a>(walls: &'a [WallSegment], target: &WallSegment) -> &'a WallSegment {
        walls
            .iter()
            .min_by(|a, b| {
                let da = a.midpoint().distance_to(&target.midpoint());
                let db = b.midpoint().distance_to(&target.midpoint());
                da.total_cmp(&db)
            })
            .unwrap()
    }

    /// Confidence after a single perimeter bonus
    fn one_bonus(raw: f32, config: &DetectionConfig) -> f32 {
        let t = &config.classify;
        (raw + t.perimeter_bonus).min(t.confidence_cap).max(raw)
    }

    #[test]
    fn test_appended_secondary_walls_get_one_perimeter_bonus() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let config = DetectionConfig::default();
        let detector = PlanDetector::new(config.clone());

        let secondary = detector
            .secondary_pass(&img, None, &[DetectorKind::SolidDark])
            .unwrap();
        assert_eq!(secondary.walls.len(), 4);
        assert!(secondary.walls.iter().all(|w| w.wall_type == WallType::Exterior));

        // Secondary confidences are raw; the primary-only run adds one bonus
        let baseline = detect(&img);
        for wall in &secondary.walls {
            let classified = nearest(&baseline.walls, wall).confidence;
            assert!((classified - one_bonus(wall.confidence, &config)).abs() < 1e-6);
        }

        // No primary walls, so every secondary wall is appended
        let request = DetectionRequest {
            style_hint: Some(WallStyle::MidGray),
            ..DetectionRequest::default()
        };
        let result = detector
            .detect_with_secondary(&img, &request, Ok(secondary.clone()))
            .unwrap();
        assert_eq!(result.walls.len(), 4);
        for wall in &result.walls {
            assert_eq!(wall.provenance, Provenance::Secondary);
            let raw = nearest(&secondary.walls, wall).confidence;
            assert!((wall.confidence - one_bonus(raw, &config)).abs() < 1e-6);
        }
        assert_invariants(&result, &config);
    }

    #[test]
    fn test_merge_cap_keeps_walls_distinct() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let mut config = DetectionConfig::default();
        config.fusion.enabled = true;
        config.merge.max_iterations = 1;
        let result = PlanDetector::new(config.clone())
            .detect(&img, &DetectionRequest::default())
            .unwrap();

        // Whether or not the cap was hit, no overlapping pair survives
        assert!(!has_overlapping_pair(&result.walls, &config.merge));
        for warning in &result.metadata.warnings {
            if let DetectionWarning::MergeIterationCap { passes, .. } = warning {
                assert_eq!(*passes, 1);
            }
        }
    }

    #[test]
    fn test_style_hint_skips_classification() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let request = DetectionRequest {
            style_hint: Some(WallStyle::MidGray),
            ..DetectionRequest::default()
        };
        let result = PlanDetector::new(DetectionConfig::default())
            .detect(&img, &request)
            .unwrap();
        assert_eq!(result.metadata.style, WallStyle::MidGray);
        assert_eq!(result.metadata.algorithms, vec!["mid_gray".to_string()]);
        assert!(result.walls.is_empty());
    }

    #[test]
    fn test_cancelled_detection_errors() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let token = CancelToken::new();
        token.cancel();
        let err = PlanDetector::with_cancel_token(DetectionConfig::default(), token)
            .detect(&img, &DetectionRequest::default())
            .unwrap_err();
        assert!(matches!(err, PlanError::Cancelled { .. }));
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let img = fixtures::solid_rectangle(200, 200, 20, 20, 180, 180, 8, 0);
        let json = serde_json::to_value(detect(&img)).unwrap();
        assert!(json["metadata"]["processingTimeMs"].is_u64());
        assert_eq!(json["metadata"]["style"], "solid_dark");
        assert_eq!(json["walls"][0]["type"], "exterior");
        assert!(json["measurements"]["totalArea"].as_f64().unwrap() > 0.0);
    }
}
