// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Edge/contour detector
//!
//! Multi-scale Canny edges are OR-combined and closed, then a Hough transform
//! whose parameters follow the image contrast finds straight edges. Near-axis
//! edges with enough edge support become walls; their thickness and center
//! come from a perpendicular intensity profile of the source image.

use super::{initial_confidence, DetectorContext, DetectorKind, DetectorOutput};
use crate::config::{EdgeThresholds, HoughTier};
use crate::error::Result;
use crate::image_ops::{canny_edges, gaussian_blur, mask_union, morphological_close};
use crate::line_ops::{axis_deviation_deg, detect_lines, edge_support, snap_to_axis};
use crate::types::{Orientation, Point2D, WallSegment};
use image::GrayImage;

const KIND: DetectorKind = DetectorKind::EdgeContour;

/// Hough parameters for the measured contrast
pub fn hough_tier(contrast: f64, t: &EdgeThresholds) -> HoughTier {
    if contrast < t.low_contrast {
        t.sketchy
    } else if contrast > t.high_contrast {
        t.clean
    } else {
        t.medium
    }
}

/// OR-combined Canny edges over all configured threshold pairs, closed
pub fn multi_scale_edges(image: &GrayImage, t: &EdgeThresholds) -> GrayImage {
    let blurred = gaussian_blur(image, t.blur_sigma);
    let combined = t
        .canny_pairs
        .iter()
        .map(|&(low, high)| canny_edges(&blurred, low, high))
        .reduce(|acc, edges| mask_union(&acc, &edges))
        .unwrap_or_else(|| GrayImage::new(image.width(), image.height()));
    morphological_close(&combined, t.close_radius)
}

/// Band estimated from the intensity profile across an edge
#[derive(Debug, Clone, Copy, PartialEq)]
struct Profile {
    /// Shift of the band center from the edge line
    shift: f64,
    thickness: f64,
}

/// Walk away from the edge on both sides until the paper shows
fn profile_band(
    image: &GrayImage,
    start: &Point2D,
    end: &Point2D,
    orientation: Orientation,
    t: &EdgeThresholds,
) -> Profile {
    let reach = t.max_thickness.ceil() as i64;
    let samples: Vec<Point2D> = (1..=3)
        .map(|i| {
            let f = i as f64 / 4.0;
            Point2D::new(start.x + (end.x - start.x) * f, start.y + (end.y - start.y) * f)
        })
        .collect();

    let value = |p: &Point2D, offset: i64| -> Option<u8> {
        let (x, y) = match orientation {
            Orientation::Horizontal => (p.x.round() as i64, p.y.round() as i64 + offset),
            Orientation::Vertical => (p.x.round() as i64 + offset, p.y.round() as i64),
        };
        (x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height())
            .then(|| image.get_pixel(x as u32, y as u32).0[0])
    };

    let is_ink = |p: &Point2D, offset: i64| value(p, offset).is_some_and(|v| v <= t.background_level);

    // Distance from `anchor` to the first paper pixel, `None` when none within reach
    let walk = |p: &Point2D, anchor: i64, sign: i64| -> Option<i64> {
        (0..=reach).find(|&d| !is_ink(p, anchor + sign * d))
    };

    let mut thicknesses = Vec::new();
    let mut shifts = Vec::new();
    for p in &samples {
        // Canny may put the edge on either side of the face
        let Some(anchor) = [0i64, 1, -1, 2, -2].into_iter().find(|&a| is_ink(p, a)) else {
            continue;
        };
        if let (Some(pos), Some(neg)) = (walk(p, anchor, 1), walk(p, anchor, -1)) {
            // Ink spans (anchor - neg, anchor + pos) exclusive
            thicknesses.push((pos + neg - 1) as f64);
            shifts.push(anchor as f64 + (pos - neg) as f64 / 2.0);
        }
    }

    if thicknesses.is_empty() {
        return Profile {
            shift: 0.0,
            thickness: t.default_thickness,
        };
    }
    thicknesses.sort_by(|a, b| a.total_cmp(b));
    shifts.sort_by(|a, b| a.total_cmp(b));
    let mid = thicknesses.len() / 2;
    Profile {
        shift: shifts[mid],
        thickness: thicknesses[mid].clamp(t.min_thickness, t.max_thickness),
    }
}

/// Mean intensity along a segment
fn line_mean(image: &GrayImage, start: &Point2D, end: &Point2D) -> f64 {
    let steps = start.distance_to(end).round().max(1.0) as usize;
    let (sum, count) = (0..=steps)
        .filter_map(|s| {
            let f = s as f64 / steps as f64;
            let x = (start.x + (end.x - start.x) * f).round();
            let y = (start.y + (end.y - start.y) * f).round();
            (x >= 0.0 && y >= 0.0 && (x as u32) < image.width() && (y as u32) < image.height())
                .then(|| image.get_pixel(x as u32, y as u32).0[0] as f64)
        })
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        255.0
    } else {
        sum / count as f64
    }
}

/// Detect walls from image edges
pub fn detect_edge_walls(ctx: &DetectorContext<'_>) -> Result<DetectorOutput> {
    let t = &ctx.config.edge;
    ctx.budget.check(KIND)?;

    let edges = multi_scale_edges(ctx.image, t);
    ctx.budget.check(KIND)?;

    let tier = hough_tier(ctx.contrast, t);
    let lines = detect_lines(&edges, &tier, t.max_peaks, ctx.budget, KIND)?;
    tracing::debug!(
        lines = lines.len(),
        contrast = ctx.contrast,
        threshold = tier.threshold,
        "Hough lines found"
    );

    let mut output = DetectorOutput::empty(KIND);
    for line in lines {
        let deviation = axis_deviation_deg(&line.start, &line.end);
        if deviation > t.axis_tolerance_deg {
            continue;
        }
        if edge_support(&edges, &line.start, &line.end, 1) < t.min_edge_support {
            continue;
        }

        let (start, end) = snap_to_axis(&line.start, &line.end);
        let orientation = if (end.x - start.x).abs() >= (end.y - start.y).abs() {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        };
        let profile = profile_band(ctx.image, &start, &end, orientation, t);
        let (start, end) = match orientation {
            Orientation::Horizontal => (start.offset(0.0, profile.shift), end.offset(0.0, profile.shift)),
            Orientation::Vertical => (start.offset(profile.shift, 0.0), end.offset(profile.shift, 0.0)),
        };

        let alignment = (1.0 - deviation / t.axis_tolerance_deg).max(0.5);
        let darkness = line_mean(ctx.image, &start, &end);

        let mut wall = WallSegment::new(start, end, profile.thickness, KIND);
        wall.confidence = initial_confidence(wall.length(), profile.thickness, alignment, ctx.config);
        wall.interior_darkness = darkness;
        wall.light_interior = darkness > t.background_level as f64;
        output.segments.push(wall);
    }

    Ok(output)
}
