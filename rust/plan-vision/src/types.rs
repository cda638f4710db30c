// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core types for floor plan detection results

use crate::detectors::DetectorKind;
use crate::style::WallStyle;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// A 2D point in pixel coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_nalgebra(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn from_nalgebra(p: &Point2<f64>) -> Self {
        Self { x: p.x, y: p.y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        (other.to_nalgebra() - self.to_nalgebra()).norm()
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Wall type classification
///
/// `Unknown` only exists between detection and classification; every wall in
/// a finished [`DetectionResult`] carries one of the other three.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WallType {
    Interior,
    Exterior,
    LoadBearing,
    #[default]
    Unknown,
}

/// Where a fused wall came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Primary,
    Secondary,
    Merged,
}

/// Horizontal or vertical run direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A detected straight wall segment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WallSegment {
    pub id: usize,
    pub start: Point2D,
    pub end: Point2D,
    /// Wall thickness in pixels
    pub thickness: f64,
    #[serde(rename = "type")]
    pub wall_type: WallType,
    /// Detection confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Detector that produced the segment
    pub source: DetectorKind,
    /// Detector whose result refined this segment during fusion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_by: Option<DetectorKind>,
    #[serde(default)]
    pub provenance: Provenance,
    /// Mean intensity (0-255) of the wall's rendered ink
    pub interior_darkness: f64,
    /// The band between the wall faces is hollow (e.g. twin-line rendering)
    pub light_interior: bool,
}

impl WallSegment {
    pub fn new(start: Point2D, end: Point2D, thickness: f64, source: DetectorKind) -> Self {
        Self {
            id: 0,
            start,
            end,
            thickness,
            wall_type: WallType::Unknown,
            confidence: 0.5,
            source,
            enhanced_by: None,
            provenance: Provenance::Primary,
            interior_darkness: 0.0,
            light_interior: false,
        }
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    /// Direction in radians, in (-PI, PI]
    pub fn direction(&self) -> f64 {
        (self.end.y - self.start.y).atan2(self.end.x - self.start.x)
    }

    /// Direction in degrees, normalized to [0, 360)
    pub fn angle_degrees(&self) -> f64 {
        let deg = self.direction().to_degrees();
        let normalized = deg.rem_euclid(360.0);
        if normalized >= 360.0 {
            0.0
        } else {
            normalized
        }
    }

    pub fn midpoint(&self) -> Point2D {
        Point2D::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }

    /// Unit vector along the segment, `None` for degenerate segments
    pub fn unit_direction(&self) -> Option<Vector2<f64>> {
        let v = self.end.to_nalgebra() - self.start.to_nalgebra();
        let len = v.norm();
        (len > 1e-9).then(|| v / len)
    }

    /// Dominant axis of the segment
    pub fn orientation(&self) -> Orientation {
        let dx = (self.end.x - self.start.x).abs();
        let dy = (self.end.y - self.start.y).abs();
        if dx >= dy {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        }
    }

    pub fn endpoints(&self) -> [Point2D; 2] {
        [self.start, self.end]
    }

    /// Structurally valid: finite coordinates, non-zero length, confidence in range
    pub fn is_well_formed(&self) -> bool {
        self.start.is_finite()
            && self.end.is_finite()
            && self.thickness.is_finite()
            && self.length() > 1e-6
            && (0.0..=1.0).contains(&self.confidence)
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            start: self.start.offset(dx, dy),
            end: self.end.offset(dx, dy),
            ..self.clone()
        }
    }
}

/// Axis-aligned bounding box in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2D>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in iter {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn expanded(&self, margin: f64) -> Self {
        BoundingBox {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    /// Distance from a point to the nearest edge of the box
    pub fn distance_to_edge(&self, p: &Point2D) -> f64 {
        (p.x - self.min_x)
            .abs()
            .min((p.x - self.max_x).abs())
            .min((p.y - self.min_y).abs())
            .min((p.y - self.max_y).abs())
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        BoundingBox {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }
}

/// How a room label was obtained
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// Low-confidence guess from room size and proportions
    SizeGuess,
    /// Supplied by the text extraction collaborator
    External,
}

/// Advisory room label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomLabel {
    pub text: String,
    pub source: LabelSource,
    pub confidence: f32,
}

/// Detected room (enclosed region)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<RoomLabel>,
    /// Simplified boundary polygon (closed, first vertex not repeated)
    pub polygon: Vec<Point2D>,
    /// Area in square pixels, counted from the region's pixels
    pub area: f64,
    /// Perimeter in pixels, counted from the region's boundary pixels
    pub perimeter: f64,
    pub centroid: Point2D,
    pub bounding_box: BoundingBox,
    pub wall_ids: Vec<usize>,
    pub opening_ids: Vec<usize>,
    pub confidence: f32,
}

impl Room {
    /// Calculate polygon area using the shoelace formula
    pub fn calculate_area(boundary: &[Point2D]) -> f64 {
        if boundary.len() < 3 {
            return 0.0;
        }

        let n = boundary.len();
        let mut area = 0.0;

        for i in 0..n {
            let j = (i + 1) % n;
            area += boundary[i].x * boundary[j].y;
            area -= boundary[j].x * boundary[i].y;
        }

        (area / 2.0).abs()
    }

    /// Point-in-polygon test (ray casting)
    pub fn contains(&self, p: &Point2D) -> bool {
        let poly = &self.polygon;
        if poly.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = poly.len() - 1;
        for i in 0..poly.len() {
            let (pi, pj) = (&poly[i], &poly[j]);
            if (pi.y > p.y) != (pj.y > p.y) {
                let x_cross = (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            polygon: self.polygon.iter().map(|p| p.offset(dx, dy)).collect(),
            centroid: self.centroid.offset(dx, dy),
            bounding_box: self.bounding_box.translated(dx, dy),
            ..self.clone()
        }
    }
}

/// Opening kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OpeningKind {
    Door,
    Window,
}

/// Detected opening in a wall
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Opening {
    pub id: usize,
    pub kind: OpeningKind,
    pub position: Point2D,
    /// Width along the host wall in pixels
    pub width: f64,
    pub orientation: Orientation,
    pub wall_id: usize,
    pub confidence: f32,
    /// Sill height in measurement units (windows only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sill_height: Option<f64>,
}

impl Opening {
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            position: self.position.offset(dx, dy),
            ..self.clone()
        }
    }
}

/// Text label supplied by an external text extraction service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextLabel {
    pub text: String,
    pub position: Point2D,
}

/// Real-world measurements derived from the detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    /// Measurement units per pixel
    pub scale: f64,
    pub unit: String,
    /// Sum of room areas in square units
    pub total_area: f64,
    /// Sum of room perimeters in units
    pub total_perimeter: f64,
    pub room_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// Overall quality grade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    Medium,
    High,
}

/// Non-fatal conditions recorded during detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionWarning {
    NoWallsDetected,
    DetectorTimeout {
        detector: DetectorKind,
        elapsed_ms: u64,
    },
    DetectorFailed {
        detector: DetectorKind,
        reason: String,
    },
    FusionInputMismatch {
        reason: String,
    },
    /// Merging stopped at its pass limit; leftover duplicates were dropped
    MergeIterationCap {
        passes: usize,
        dropped: usize,
    },
}

/// Detection run metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub confidence: f32,
    pub processing_time_ms: u64,
    pub algorithms: Vec<String>,
    pub quality: Quality,
    pub style: WallStyle,
    /// Standard deviation of grayscale intensity
    pub contrast: f64,
    pub image_width: u32,
    pub image_height: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<DetectionWarning>,
}

/// Complete detection result for one image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub walls: Vec<WallSegment>,
    pub rooms: Vec<Room>,
    pub doors: Vec<Opening>,
    pub windows: Vec<Opening>,
    pub measurements: Measurements,
    pub metadata: Metadata,
}

impl DetectionResult {
    pub fn has_warning(&self, predicate: impl Fn(&DetectionWarning) -> bool) -> bool {
        self.metadata.warnings.iter().any(predicate)
    }

    pub fn openings(&self) -> impl Iterator<Item = &Opening> {
        self.doors.iter().chain(self.windows.iter())
    }
}
