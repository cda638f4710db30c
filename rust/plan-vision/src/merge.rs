// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Segment merging
//!
//! Candidates from one or more detectors are collapsed until no pair in the
//! set satisfies [`walls_overlap`]. One pass groups walls transitively, but a
//! merged wall has a new extent and center line and can overlap walls none of
//! its members did, so passes repeat to a fixed point (bounded by
//! `max_iterations`).

use crate::config::MergeThresholds;
use crate::line_ops::perpendicular_distance;
use crate::types::{Point2D, WallSegment};
use nalgebra::Vector2;

/// Result of merging to a fixed point
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub walls: Vec<WallSegment>,
    /// Passes that merged at least one pair
    pub passes: usize,
    /// False when the iteration cap stopped merging early
    pub converged: bool,
    /// Walls removed as leftover duplicates after the cap
    pub dropped: usize,
}

/// Angle between two segment directions in degrees, ignoring direction
fn angle_difference_deg(a: &WallSegment, b: &WallSegment) -> f64 {
    let d = (a.direction() - b.direction()).to_degrees().rem_euclid(180.0);
    d.min(180.0 - d)
}

/// Projected interval of a segment along `axis` from `origin`
fn project(wall: &WallSegment, origin: &Point2D, axis: &Vector2<f64>) -> (f64, f64) {
    let o = origin.to_nalgebra();
    let a = (wall.start.to_nalgebra() - o).dot(axis);
    let b = (wall.end.to_nalgebra() - o).dot(axis);
    (a.min(b), a.max(b))
}

/// Whether two walls describe the same physical wall
///
/// Parallel within the angle tolerance (either direction), center lines
/// within the lateral tolerance, and either the nearest endpoints close
/// together or the projected extents overlapping / nearly touching.
pub fn walls_overlap(a: &WallSegment, b: &WallSegment, t: &MergeThresholds) -> bool {
    let Some(axis) = a.unit_direction() else {
        return false;
    };
    if b.unit_direction().is_none() {
        return false;
    }

    if angle_difference_deg(a, b) > t.angle_tolerance_deg {
        return false;
    }

    let lateral = perpendicular_distance(&b.midpoint(), &a.start, &a.end)
        .max(perpendicular_distance(&a.midpoint(), &b.start, &b.end));
    if lateral > t.lateral_tolerance {
        return false;
    }

    let nearest_endpoints = a
        .endpoints()
        .iter()
        .flat_map(|p| b.endpoints().map(|q| p.distance_to(&q)))
        .fold(f64::INFINITY, f64::min);
    if nearest_endpoints <= t.endpoint_distance {
        return true;
    }

    let (min_a, max_a) = project(a, &a.start, &axis);
    let (min_b, max_b) = project(b, &a.start, &axis);
    let gap = (min_b - max_a).max(min_a - max_b);
    gap <= t.gap_tolerance
}

/// Whether any pair in the set still satisfies the overlap predicate
pub fn has_overlapping_pair(walls: &[WallSegment], t: &MergeThresholds) -> bool {
    walls.iter().enumerate().any(|(i, a)| {
        walls[i + 1..].iter().any(|b| walls_overlap(a, b, t))
    })
}

/// Collapse a group of overlapping walls into one
///
/// Spans the extreme projections of all members along the length-weighted
/// mean direction. Thickness is the larger of the mean member thickness and
/// the distance between the outermost faces. Metadata comes from the most
/// confident member; the id comes from the first.
fn merge_group(group: &[&WallSegment]) -> WallSegment {
    let Some(first) = group.first() else {
        unreachable!("merge groups are never empty");
    };
    if group.len() == 1 {
        return (*first).clone();
    }

    let Some(reference) = group.iter().copied().max_by(|a, b| {
        a.confidence
            .total_cmp(&b.confidence)
            .then(a.length().total_cmp(&b.length()))
    }) else {
        return (*first).clone();
    };
    let Some(ref_axis) = reference.unit_direction() else {
        return (*first).clone();
    };

    // Length-weighted direction, members flipped to agree with the reference
    let summed = group.iter().fold(Vector2::zeros(), |acc, w| {
        match w.unit_direction() {
            Some(u) => {
                let u = if u.dot(&ref_axis) < 0.0 { -u } else { u };
                acc + u * w.length()
            }
            None => acc,
        }
    });
    let axis = if summed.norm() > 1e-9 {
        summed.normalize()
    } else {
        ref_axis
    };
    let normal = Vector2::new(-axis.y, axis.x);
    let origin = reference.start.to_nalgebra();

    let mut min_s = f64::INFINITY;
    let mut max_s = f64::NEG_INFINITY;
    let mut min_face = f64::INFINITY;
    let mut max_face = f64::NEG_INFINITY;
    let mut offset_sum = 0.0;
    let mut weight = 0.0;
    let mut confidence_sum = 0.0;
    let mut thickness_sum = 0.0;

    for wall in group {
        for p in wall.endpoints() {
            let s = (p.to_nalgebra() - origin).dot(&axis);
            min_s = min_s.min(s);
            max_s = max_s.max(s);
        }
        let offset = (wall.midpoint().to_nalgebra() - origin).dot(&normal);
        min_face = min_face.min(offset - wall.thickness / 2.0);
        max_face = max_face.max(offset + wall.thickness / 2.0);

        let len = wall.length();
        offset_sum += offset * len;
        confidence_sum += wall.confidence as f64 * len;
        weight += len;
        thickness_sum += wall.thickness;
    }

    let (center, confidence) = if weight > 1e-9 {
        (offset_sum / weight, confidence_sum / weight)
    } else {
        (0.0, reference.confidence as f64)
    };
    let mean_thickness = thickness_sum / group.len() as f64;

    let start = origin + axis * min_s + normal * center;
    let end = origin + axis * max_s + normal * center;

    WallSegment {
        id: first.id,
        start: Point2D::from_nalgebra(&start),
        end: Point2D::from_nalgebra(&end),
        thickness: mean_thickness.max(max_face - min_face),
        confidence: confidence.clamp(0.0, 1.0) as f32,
        ..reference.clone()
    }
}

/// One merge pass: group walls transitively by the overlap predicate
///
/// Returns the merged set and whether anything merged.
pub fn merge_pass(walls: &[WallSegment], t: &MergeThresholds) -> (Vec<WallSegment>, bool) {
    let mut used = vec![false; walls.len()];
    let mut merged = Vec::with_capacity(walls.len());
    let mut changed = false;

    for i in 0..walls.len() {
        if used[i] {
            continue;
        }
        used[i] = true;

        let mut group = vec![i];
        let mut cursor = 0;
        while cursor < group.len() {
            let current = group[cursor];
            for j in 0..walls.len() {
                if !used[j] && walls_overlap(&walls[current], &walls[j], t) {
                    used[j] = true;
                    group.push(j);
                }
            }
            cursor += 1;
        }

        if group.len() > 1 {
            changed = true;
            group.sort_unstable();
        }
        let members: Vec<&WallSegment> = group.iter().map(|&idx| &walls[idx]).collect();
        merged.push(merge_group(&members));
    }

    (merged, changed)
}

/// Keep the most confident (then longest) wall of every overlapping pair
///
/// Survivors stay in input order.
fn drop_duplicates(walls: Vec<WallSegment>, t: &MergeThresholds) -> Vec<WallSegment> {
    let mut order: Vec<usize> = (0..walls.len()).collect();
    order.sort_by(|&a, &b| {
        walls[b]
            .confidence
            .total_cmp(&walls[a].confidence)
            .then(walls[b].length().total_cmp(&walls[a].length()))
            .then(a.cmp(&b))
    });

    let mut keep = vec![false; walls.len()];
    let mut kept: Vec<usize> = Vec::with_capacity(walls.len());
    for i in order {
        if kept.iter().all(|&k| !walls_overlap(&walls[k], &walls[i], t)) {
            keep[i] = true;
            kept.push(i);
        }
    }

    walls
        .into_iter()
        .zip(keep)
        .filter_map(|(w, k)| k.then_some(w))
        .collect()
}

/// Merge candidates to a fixed point
///
/// If the pass limit is reached first, overlapping leftovers are resolved by
/// [`drop_duplicates`] so the result never holds an overlapping pair.
pub fn merge_segments(walls: Vec<WallSegment>, t: &MergeThresholds) -> MergeOutcome {
    let mut current = walls;
    let mut passes = 0;

    for _ in 0..t.max_iterations.max(1) {
        let (next, changed) = merge_pass(&current, t);
        current = next;
        if !changed {
            return MergeOutcome {
                walls: current,
                passes,
                converged: true,
                dropped: 0,
            };
        }
        passes += 1;
    }

    if !has_overlapping_pair(&current, t) {
        return MergeOutcome {
            walls: current,
            passes,
            converged: true,
            dropped: 0,
        };
    }

    let before = current.len();
    let walls = drop_duplicates(current, t);
    let dropped = before - walls.len();
    tracing::warn!(passes, dropped, walls = walls.len(), "Segment merging hit its iteration cap");
    MergeOutcome {
        walls,
        passes,
        converged: false,
        dropped,
    }
}
