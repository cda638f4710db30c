// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detection thresholds.
//!
//! Every heuristic threshold used by the pipeline lives here so it can be
//! tuned from a JSON file without rebuilding. Each group deserializes with
//! `#[serde(default)]`, so a file only needs the fields it overrides.

use crate::detectors::DetectorKind;
use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All detection parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    pub style: StyleThresholds,
    pub scan: ScanThresholds,
    pub edge: EdgeThresholds,
    pub merge: MergeThresholds,
    pub classify: ClassifyThresholds,
    pub rooms: RoomThresholds,
    pub openings: OpeningThresholds,
    pub fusion: FusionThresholds,
    pub quality: QualityThresholds,
    pub measure: MeasureConfig,
    pub budget: BudgetConfig,
}

impl DetectionConfig {
    /// Parse a (possibly partial) JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DetectionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PlanError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.style.sample_stride == 0 || self.scan.stride == 0 {
            return Err(PlanError::Config("strides must be at least 1".into()));
        }
        if self.scan.min_wall_length <= 0.0 {
            return Err(PlanError::Config("scan.min_wall_length must be positive".into()));
        }
        if self.merge.max_iterations == 0 {
            return Err(PlanError::Config("merge.max_iterations must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.style.majority_threshold) {
            return Err(PlanError::Config("style.majority_threshold must be in [0, 1]".into()));
        }
        if self.style.dark_max > self.style.ink_max {
            return Err(PlanError::Config("style.dark_max must not exceed style.ink_max".into()));
        }
        let label_confidences = [self.rooms.guess_confidence, self.rooms.external_label_confidence];
        if label_confidences.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(PlanError::Config("room label confidences must be in [0, 1]".into()));
        }
        if let Some(scale) = self.measure.scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(PlanError::Config("measure.scale must be positive".into()));
            }
        }
        Ok(())
    }
}

/// Style classifier sampling and intensity bands
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StyleThresholds {
    /// Grid stride for classifier samples. Default: 10
    pub sample_stride: u32,
    /// Pixels darker than this are ink. Default: 220
    pub ink_max: u8,
    /// Pixels darker than this are black rather than gray. Default: 50
    pub dark_max: u8,
    /// Longest run counted as a thin line. Default: 3
    pub thin_run_max: u32,
    /// Solid wall cross-section range. Default: 5..=30
    pub solid_run_min: u32,
    pub solid_run_max: u32,
    /// Light gap between twin lines. Default: 2..=12
    pub parallel_gap_min: u32,
    pub parallel_gap_max: u32,
    /// Window used to count alternating runs. Default: 16
    pub pattern_window: u32,
    /// Ink runs inside the window that make a hatch pattern. Default: 3
    pub pattern_min_runs: u32,
    /// Share of classified samples needed to pick a single style. Default: 0.35
    pub majority_threshold: f64,
    /// Below this many classified samples the style is `Mixed`. Default: 20
    pub min_classified_samples: usize,
    /// Detectors run when no style dominates
    pub mixed_detectors: Vec<DetectorKind>,
}

impl Default for StyleThresholds {
    fn default() -> Self {
        Self {
            sample_stride: 10,
            ink_max: 220,
            dark_max: 50,
            thin_run_max: 3,
            solid_run_min: 5,
            solid_run_max: 30,
            parallel_gap_min: 2,
            parallel_gap_max: 12,
            pattern_window: 16,
            pattern_min_runs: 3,
            majority_threshold: 0.35,
            min_classified_samples: 20,
            mixed_detectors: vec![
                DetectorKind::SolidDark,
                DetectorKind::MidGray,
                DetectorKind::ParallelLine,
                DetectorKind::ThinLine,
                DetectorKind::Patterned,
            ],
        }
    }
}

/// Row/column run scanning shared by the raster detectors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanThresholds {
    /// Distance between scanned rows/columns. Default: 1
    pub stride: u32,
    /// Largest gap bridged inside one wall run (px). Default: 20
    pub bridge_gap: u32,
    /// Ink pieces shorter than this are ignored before bridging. Default: 3
    pub min_piece_len: u32,
    /// Minimum share of ink in a bridged run. Default: 0.6
    pub min_fill: f64,
    /// Minimum wall length (px). Default: 25
    pub min_wall_length: f64,
    /// Positions along a run where thickness is measured. Default: 5
    pub thickness_samples: usize,
    /// Share of samples where the band is bounded by background on both
    /// sides within the accepted width and close to the median width. Default: 0.6
    pub side_clearance_ratio: f64,
    /// Allowed deviation from the median band width, as a share of it. Default: 0.25
    pub thickness_tolerance: f64,
    /// Solid, gray and patterned bands thinner than this are rejected. Default: 3
    pub solid_min_thickness: f64,
    /// Bands thicker than this are rejected. Default: 40
    pub max_wall_thickness: f64,
    /// Thin-line bands thicker than this are rejected. Default: 4
    pub thin_max_thickness: f64,
    /// Closing radius joining twin lines into one band. Default: 6
    pub parallel_close_radius: u8,
    /// Closing radius joining hatch strokes into one band. Default: 3
    pub pattern_close_radius: u8,
    /// Thickness band that scores full confidence. Default: 6..=12
    pub typical_thickness_min: f64,
    pub typical_thickness_max: f64,
    /// Length at which the length score saturates. Default: 200
    pub length_saturation: f64,
}

impl Default for ScanThresholds {
    fn default() -> Self {
        Self {
            stride: 1,
            bridge_gap: 20,
            min_piece_len: 3,
            min_fill: 0.6,
            min_wall_length: 25.0,
            thickness_samples: 5,
            side_clearance_ratio: 0.6,
            thickness_tolerance: 0.25,
            solid_min_thickness: 3.0,
            max_wall_thickness: 40.0,
            thin_max_thickness: 4.0,
            parallel_close_radius: 6,
            pattern_close_radius: 3,
            typical_thickness_min: 6.0,
            typical_thickness_max: 12.0,
            length_saturation: 200.0,
        }
    }
}

/// Hough parameters for one contrast tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HoughTier {
    pub threshold: u32,
    pub min_line_length: f64,
    pub max_line_gap: f64,
}

/// Edge/contour detector parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EdgeThresholds {
    /// Gaussian blur before edge detection. Default: 1.0
    pub blur_sigma: f32,
    /// Canny (low, high) pairs whose edge maps are OR-combined
    pub canny_pairs: Vec<(f32, f32)>,
    /// Closing radius connecting broken edges. Default: 1
    pub close_radius: u8,
    /// Contrast below which the drawing is treated as a sketch. Default: 30
    pub low_contrast: f64,
    /// Contrast above which the drawing is treated as clean CAD. Default: 100
    pub high_contrast: f64,
    pub sketchy: HoughTier,
    pub medium: HoughTier,
    pub clean: HoughTier,
    /// Maximum deviation from horizontal/vertical (degrees). Default: 15
    pub axis_tolerance_deg: f64,
    /// Share of points along a line that must lie on edges. Default: 0.85
    pub min_edge_support: f64,
    /// Hough peaks examined. Default: 500
    pub max_peaks: usize,
    /// Thickness estimate bounds and fallback (px). Default: 3, 25, 6
    pub min_thickness: f64,
    pub max_thickness: f64,
    pub default_thickness: f64,
    /// Intensity treated as paper when profiling thickness. Default: 200
    pub background_level: u8,
}

impl Default for EdgeThresholds {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            canny_pairs: vec![(30.0, 100.0), (50.0, 150.0), (80.0, 200.0)],
            close_radius: 1,
            low_contrast: 30.0,
            high_contrast: 100.0,
            sketchy: HoughTier {
                threshold: 50,
                min_line_length: 30.0,
                max_line_gap: 20.0,
            },
            medium: HoughTier {
                threshold: 100,
                min_line_length: 50.0,
                max_line_gap: 10.0,
            },
            clean: HoughTier {
                threshold: 150,
                min_line_length: 80.0,
                max_line_gap: 5.0,
            },
            axis_tolerance_deg: 15.0,
            min_edge_support: 0.85,
            max_peaks: 500,
            min_thickness: 3.0,
            max_thickness: 25.0,
            default_thickness: 6.0,
            background_level: 200,
        }
    }
}

/// Segment merger parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergeThresholds {
    /// Maximum angle difference (degrees), 180° ambiguity included. Default: 5
    pub angle_tolerance_deg: f64,
    /// Maximum perpendicular offset between the two lines (px). Default: 15
    pub lateral_tolerance: f64,
    /// Nearest-endpoint distance that merges (px). Default: 25
    pub endpoint_distance: f64,
    /// Gap allowed between projected ranges (px). Default: 4
    pub gap_tolerance: f64,
    /// Merge passes before giving up on a fixed point. Default: 5
    pub max_iterations: usize,
}

impl Default for MergeThresholds {
    fn default() -> Self {
        Self {
            angle_tolerance_deg: 5.0,
            lateral_tolerance: 15.0,
            endpoint_distance: 25.0,
            gap_tolerance: 4.0,
            max_iterations: 5,
        }
    }
}

/// Wall classifier parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifyThresholds {
    /// Margin added around the endpoint bounding box (px). Default: 10
    pub bbox_margin: f64,
    /// Endpoint distance to the box edge marking a perimeter wall (px). Default: 50
    pub edge_distance: f64,
    /// Endpoint proximity counted as a connection (px). Default: 20
    pub connection_tolerance: f64,
    /// Fewer edge-marked walls than this triggers the connectivity rule. Default: 3
    pub min_edge_perimeter_walls: usize,
    /// Darkness below which a wall is very dark. Default: 30
    pub very_dark_max: f64,
    /// Darkness above which a wall is very light. Default: 220
    pub very_light_min: f64,
    /// Thickness above which a non-perimeter wall is load-bearing (px). Default: 10
    pub thick_threshold: f64,
    /// Confidence bonus for perimeter walls. Default: 0.1
    pub perimeter_bonus: f32,
    /// Cap applied after the bonus. Default: 0.95
    pub confidence_cap: f32,
}

impl Default for ClassifyThresholds {
    fn default() -> Self {
        Self {
            bbox_margin: 10.0,
            edge_distance: 50.0,
            connection_tolerance: 20.0,
            min_edge_perimeter_walls: 3,
            very_dark_max: 30.0,
            very_light_min: 220.0,
            thick_threshold: 10.0,
            perimeter_bonus: 0.1,
            confidence_cap: 0.95,
        }
    }
}

/// Room segmenter parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoomThresholds {
    /// Minimum room area (px²). Default: 1000
    pub min_area: f64,
    /// Maximum room area as a share of the image. Default: 0.9
    pub max_area_ratio: f64,
    /// Douglas-Peucker epsilon as a share of the traced perimeter. Default: 0.02
    pub epsilon_ratio: f64,
    /// Wall endpoint to polygon vertex distance for association (px). Default: 20
    pub wall_vertex_tolerance: f64,
    /// Confidence of size-based label guesses. Default: 0.3
    pub guess_confidence: f32,
    /// Confidence of labels supplied by a text extraction service. Default: 0.9
    pub external_label_confidence: f32,
}

impl Default for RoomThresholds {
    fn default() -> Self {
        Self {
            min_area: 1000.0,
            max_area_ratio: 0.9,
            epsilon_ratio: 0.02,
            wall_vertex_tolerance: 20.0,
            guess_confidence: 0.3,
            external_label_confidence: 0.9,
        }
    }
}

/// Opening detector parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpeningThresholds {
    /// Bridged gaps narrower than this are ignored (px). Default: 3
    pub door_min_width: f64,
    /// Distance from a gap to the wall body it belongs to (px). Default: 6
    pub gap_attach_tolerance: f64,
    /// A door this close to a wall midpoint suppresses the window (px). Default: 60
    pub door_near_midpoint: f64,
    /// Default window width (px). Default: 40
    pub window_width: f64,
    /// Exterior walls shorter than this get no window (px). Default: 80
    pub window_min_wall_length: f64,
    /// Default sill height in measurement units. Default: 3.0
    pub sill_height: f64,
    pub door_confidence: f32,
    pub window_confidence: f32,
}

impl Default for OpeningThresholds {
    fn default() -> Self {
        Self {
            door_min_width: 3.0,
            gap_attach_tolerance: 6.0,
            door_near_midpoint: 60.0,
            window_width: 40.0,
            window_min_wall_length: 80.0,
            sill_height: 3.0,
            door_confidence: 0.5,
            window_confidence: 0.3,
        }
    }
}

/// Fusion engine parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionThresholds {
    /// Run the secondary pass in-process. Default: false
    pub enabled: bool,
    /// Detectors making up the secondary pass. Default: [EdgeContour]
    pub secondary_detectors: Vec<DetectorKind>,
    /// Secondary confidence needed to refine a primary wall. Default: 0.8
    pub refine_threshold: f32,
    /// Contrast below which trust inverts toward the secondary pass. Default: 30
    pub low_contrast: f64,
    /// Primary confidence kept under inverted trust. Default: 0.8
    pub high_confidence: f32,
    /// Confidence added to a refined wall. Default: 0.05
    pub confidence_bonus: f32,
    /// Secondary openings closer than this to a primary one are duplicates (px). Default: 30
    pub opening_duplicate_radius: f64,
}

impl Default for FusionThresholds {
    fn default() -> Self {
        Self {
            enabled: false,
            secondary_detectors: vec![DetectorKind::EdgeContour],
            refine_threshold: 0.8,
            low_contrast: 30.0,
            high_confidence: 0.8,
            confidence_bonus: 0.05,
            opening_duplicate_radius: 30.0,
        }
    }
}

/// Confidence aggregation weights and quality grades
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityThresholds {
    pub wall_weight: f32,
    pub room_weight: f32,
    pub opening_weight: f32,
    /// Overall confidence for `high`. Default: 0.75
    pub high: f32,
    /// Overall confidence for `medium`. Default: 0.5
    pub medium: f32,
    /// Walls required for `high`. Default: 4
    pub min_walls_for_high: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            wall_weight: 0.6,
            room_weight: 0.25,
            opening_weight: 0.15,
            high: 0.75,
            medium: 0.5,
            min_walls_for_high: 4,
        }
    }
}

/// Scale and units
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeasureConfig {
    /// Known scale in units per pixel; estimated when absent
    pub scale: Option<f64>,
    /// Default: "ft"
    pub unit: String,
    /// Building width assumed by the estimate. Default: 40 (units)
    pub assumed_building_width: f64,
    /// Share of the image width the building is assumed to span. Default: 0.9
    pub margin_factor: f64,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            scale: None,
            unit: "ft".into(),
            assumed_building_width: 40.0,
            margin_factor: 0.9,
        }
    }
}

/// Time budgets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    /// Time budget for one detector (ms). Default: 10000
    pub detector_timeout_ms: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            detector_timeout_ms: 10_000,
        }
    }
}
