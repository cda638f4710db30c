// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall type classification
//!
//! Walls near the edge of the plan's envelope are perimeter walls. Each wall
//! is then typed by its rendered darkness, perimeter membership and thickness,
//! first matching rule wins.

use crate::config::ClassifyThresholds;
use crate::line_ops::walls_connected;
use crate::types::{BoundingBox, WallSegment, WallType};

/// Walls sharing an endpoint or T-junction with `wall`
fn count_connections(idx: usize, walls: &[WallSegment], tolerance: f64) -> usize {
    walls
        .iter()
        .enumerate()
        .filter(|&(j, other)| j != idx && walls_connected(&walls[idx], other, tolerance))
        .count()
}

/// Mark walls lying on the envelope of the plan
///
/// The envelope is the bounding box of all endpoints plus a margin; a wall
/// with an endpoint near its edge is on the perimeter. If that marks too few
/// walls to outline a building, walls joined to at least two others are
/// marked as well.
pub fn perimeter_flags(walls: &[WallSegment], t: &ClassifyThresholds) -> Vec<bool> {
    let Some(envelope) =
        BoundingBox::from_points(walls.iter().flat_map(|w| [&w.start, &w.end]))
    else {
        return Vec::new();
    };
    let envelope = envelope.expanded(t.bbox_margin);

    let mut flags: Vec<bool> = walls
        .iter()
        .map(|w| {
            w.endpoints()
                .iter()
                .any(|p| envelope.distance_to_edge(p) <= t.edge_distance)
        })
        .collect();

    let marked = flags.iter().filter(|&&f| f).count();
    if marked < t.min_edge_perimeter_walls {
        for (i, flag) in flags.iter_mut().enumerate() {
            if !*flag && count_connections(i, walls, t.connection_tolerance) >= 2 {
                *flag = true;
            }
        }
        tracing::debug!(
            edge_marked = marked,
            total = flags.iter().filter(|&&f| f).count(),
            "Perimeter extended by connectivity"
        );
    }

    flags
}

/// Type a single wall
pub fn wall_type_for(wall: &WallSegment, perimeter: bool, t: &ClassifyThresholds) -> WallType {
    let darkness = wall.interior_darkness;
    if darkness < t.very_dark_max {
        if perimeter {
            WallType::Exterior
        } else {
            WallType::LoadBearing
        }
    } else if darkness > t.very_light_min {
        WallType::LoadBearing
    } else if perimeter {
        WallType::Exterior
    } else if wall.thickness > t.thick_threshold {
        WallType::LoadBearing
    } else {
        WallType::Interior
    }
}

/// Set wall types without touching confidence
///
/// Used for provisional sets that are classified again later.
pub fn assign_types(walls: &mut [WallSegment], t: &ClassifyThresholds) -> Vec<bool> {
    let flags = perimeter_flags(walls, t);
    for (wall, &perimeter) in walls.iter_mut().zip(&flags) {
        wall.wall_type = wall_type_for(wall, perimeter, t);
    }
    flags
}

/// Classify every wall in place, returning the number on the perimeter
pub fn classify_walls(walls: &mut [WallSegment], t: &ClassifyThresholds) -> usize {
    let flags = assign_types(walls, t);

    for (wall, &perimeter) in walls.iter_mut().zip(&flags) {
        if perimeter {
            let raised = (wall.confidence + t.perimeter_bonus).min(t.confidence_cap);
            wall.confidence = raised.max(wall.confidence);
        }
    }

    flags.iter().filter(|&&f| f).count()
}
