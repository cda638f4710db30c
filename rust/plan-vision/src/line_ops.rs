// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line detection and geometry helpers

use crate::budget::Budget;
use crate::config::HoughTier;
use crate::detectors::DetectorKind;
use crate::error::Result;
use crate::types::{Point2D, WallSegment};
use image::GrayImage;
use std::f64::consts::PI;

/// Line segment found by the Hough transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughLine {
    pub start: Point2D,
    pub end: Point2D,
    pub votes: u32,
}

impl HoughLine {
    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }
}

/// Detect lines using probabilistic Hough transform
///
/// Votes every edge pixel into a (theta, rho) accumulator, then walks the
/// strongest cells and splits the pixels on each into segments wherever the
/// gap between consecutive pixels exceeds `max_line_gap`. The budget is checked
/// once per examined peak.
pub fn detect_lines(
    edges: &GrayImage,
    tier: &HoughTier,
    max_peaks: usize,
    budget: &Budget,
    kind: DetectorKind,
) -> Result<Vec<HoughLine>> {
    let width = edges.width() as i64;
    let height = edges.height() as i64;

    let rho_resolution = 1.0;
    let theta_resolution = PI / 180.0;
    let num_thetas = (PI / theta_resolution).round() as usize;

    let (cos_table, sin_table): (Vec<f64>, Vec<f64>) = (0..num_thetas)
        .map(|i| {
            let theta = i as f64 * theta_resolution;
            (theta.cos(), theta.sin())
        })
        .unzip();

    let max_rho = ((width * width + height * height) as f64).sqrt();
    let num_rhos = (2.0 * max_rho / rho_resolution) as usize + 1;
    let rho_offset = max_rho;

    let edge_points: Vec<(i64, i64)> = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 128)
        .map(|(x, y, _)| (x as i64, y as i64))
        .collect();
    if edge_points.is_empty() {
        return Ok(Vec::new());
    }

    let mut accumulator = vec![0u32; num_thetas * num_rhos];
    for &(x, y) in &edge_points {
        for theta_idx in 0..num_thetas {
            let rho = x as f64 * cos_table[theta_idx] + y as f64 * sin_table[theta_idx];
            let rho_idx = ((rho + rho_offset) / rho_resolution) as usize;
            if rho_idx < num_rhos {
                accumulator[theta_idx * num_rhos + rho_idx] += 1;
            }
        }
    }
    budget.check(kind)?;

    let mut peaks: Vec<(usize, usize, u32)> = accumulator
        .iter()
        .enumerate()
        .filter(|(_, &votes)| votes >= tier.threshold)
        .map(|(i, &votes)| (i / num_rhos, i % num_rhos, votes))
        .collect();
    peaks.sort_by(|a, b| b.2.cmp(&a.2));

    let mut lines = Vec::new();
    let mut used_points = vec![false; edge_points.len()];

    for &(theta_idx, rho_idx, votes) in peaks.iter().take(max_peaks) {
        budget.check(kind)?;

        let rho = rho_idx as f64 * rho_resolution - rho_offset;
        let cos_t = cos_table[theta_idx];
        let sin_t = sin_table[theta_idx];

        let mut line_points: Vec<(i64, i64, usize)> = edge_points
            .iter()
            .enumerate()
            .filter(|(i, &(x, y))| {
                !used_points[*i] && (x as f64 * cos_t + y as f64 * sin_t - rho).abs() < 2.0
            })
            .map(|(i, &(x, y))| (x, y, i))
            .collect();
        if line_points.len() < 2 {
            continue;
        }

        // Order along the line direction
        line_points.sort_by(|a, b| {
            let proj_a = a.0 as f64 * (-sin_t) + a.1 as f64 * cos_t;
            let proj_b = b.0 as f64 * (-sin_t) + b.1 as f64 * cos_t;
            proj_a.total_cmp(&proj_b)
        });

        let mut segment_start = 0;
        for i in 1..=line_points.len() {
            let split = i == line_points.len() || {
                let dx = (line_points[i].0 - line_points[i - 1].0) as f64;
                let dy = (line_points[i].1 - line_points[i - 1].1) as f64;
                (dx * dx + dy * dy).sqrt() > tier.max_line_gap
            };
            if !split {
                continue;
            }

            if i - segment_start >= 2 {
                let (sx, sy, _) = line_points[segment_start];
                let (ex, ey, _) = line_points[i - 1];
                let line = HoughLine {
                    start: Point2D::new(sx as f64, sy as f64),
                    end: Point2D::new(ex as f64, ey as f64),
                    votes,
                };
                if line.length() >= tier.min_line_length {
                    lines.push(line);
                    for point in &line_points[segment_start..i] {
                        used_points[point.2] = true;
                    }
                }
            }
            segment_start = i;
        }
    }

    Ok(lines)
}

/// Distance from a point to a line segment (clamped projection)
pub fn point_to_line_distance(point: &Point2D, line_start: &Point2D, line_end: &Point2D) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-10 {
        return point.distance_to(line_start);
    }

    let t = ((point.x - line_start.x) * dx + (point.y - line_start.y) * dy) / length_sq;
    let t = t.clamp(0.0, 1.0);

    let proj_x = line_start.x + t * dx;
    let proj_y = line_start.y + t * dy;

    let px = point.x - proj_x;
    let py = point.y - proj_y;
    (px * px + py * py).sqrt()
}

/// Perpendicular distance from a point to the infinite line through two points
pub fn perpendicular_distance(point: &Point2D, line_start: &Point2D, line_end: &Point2D) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;
    let length = (dx * dx + dy * dy).sqrt();

    if length < 1e-10 {
        return point.distance_to(line_start);
    }

    ((point.x - line_start.x) * dy - (point.y - line_start.y) * dx).abs() / length
}

/// Whether a point lies alongside a wall, within `tolerance` of its center line
///
/// Points projecting slightly past either end still count, so T-junctions
/// stopping at the wall's face are seen as touching it.
pub fn point_near_wall_body(point: &Point2D, wall: &WallSegment, tolerance: f64) -> bool {
    let (start, end) = (&wall.start, &wall.end);
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let len_sq = dx * dx + dy * dy;

    if len_sq < 1e-10 {
        return point.distance_to(start) <= tolerance;
    }

    let t = ((point.x - start.x) * dx + (point.y - start.y) * dy) / len_sq;
    if !(-0.05..=1.05).contains(&t) {
        return false;
    }

    let t = t.clamp(0.0, 1.0);
    let proj = Point2D::new(start.x + t * dx, start.y + t * dy);
    point.distance_to(&proj) <= tolerance
}

/// Whether two walls meet: endpoints close, or an endpoint on the other's body
pub fn walls_connected(a: &WallSegment, b: &WallSegment, tolerance: f64) -> bool {
    a.endpoints()
        .iter()
        .any(|p| b.endpoints().iter().any(|q| p.distance_to(q) <= tolerance))
        || a.endpoints().iter().any(|p| point_near_wall_body(p, b, tolerance))
        || b.endpoints().iter().any(|p| point_near_wall_body(p, a, tolerance))
}

/// Angle between the segment and the nearest image axis, in degrees
pub fn axis_deviation_deg(start: &Point2D, end: &Point2D) -> f64 {
    let angle = (end.y - start.y).atan2(end.x - start.x).to_degrees().rem_euclid(90.0);
    angle.min(90.0 - angle)
}

/// Snap a near-axis segment onto the axis, keeping its mean offset
pub fn snap_to_axis(start: &Point2D, end: &Point2D) -> (Point2D, Point2D) {
    let dx = (end.x - start.x).abs();
    let dy = (end.y - start.y).abs();
    if dx >= dy {
        let y = (start.y + end.y) / 2.0;
        let (x0, x1) = (start.x.min(end.x), start.x.max(end.x));
        (Point2D::new(x0, y), Point2D::new(x1, y))
    } else {
        let x = (start.x + end.x) / 2.0;
        let (y0, y1) = (start.y.min(end.y), start.y.max(end.y));
        (Point2D::new(x, y0), Point2D::new(x, y1))
    }
}

/// Share of unit steps along the segment with an edge pixel within `tolerance`
/// pixels across it
pub fn edge_support(edges: &GrayImage, start: &Point2D, end: &Point2D, tolerance: i64) -> f64 {
    let length = start.distance_to(end);
    let steps = length.round() as usize;
    if steps == 0 {
        return 0.0;
    }
    let (ux, uy) = ((end.x - start.x) / length, (end.y - start.y) / length);
    let (nx, ny) = (-uy, ux);

    let hit = |x: f64, y: f64| -> bool {
        let (xi, yi) = (x.round() as i64, y.round() as i64);
        xi >= 0
            && yi >= 0
            && (xi as u32) < edges.width()
            && (yi as u32) < edges.height()
            && edges.get_pixel(xi as u32, yi as u32).0[0] > 128
    };

    let supported = (0..=steps)
        .filter(|&s| {
            let (px, py) = (start.x + ux * s as f64, start.y + uy * s as f64);
            (-tolerance..=tolerance).any(|o| hit(px + nx * o as f64, py + ny * o as f64))
        })
        .count();
    supported as f64 / (steps + 1) as f64
}
