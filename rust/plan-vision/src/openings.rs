// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Door and window inference
//!
//! Doors come from the gaps detectors bridged while joining wall runs. Windows
//! are placed at the middle of long exterior walls that have no door nearby.

use crate::config::OpeningThresholds;
use crate::detectors::BridgedGap;
use crate::line_ops::{perpendicular_distance, point_near_wall_body};
use crate::types::{Opening, OpeningKind, Orientation, Point2D, Room, WallSegment, WallType};
use rustc_hash::FxHashMap;

/// Doors and windows found on one wall set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpeningSet {
    pub doors: Vec<Opening>,
    pub windows: Vec<Opening>,
}

impl OpeningSet {
    pub fn iter(&self) -> impl Iterator<Item = &Opening> {
        self.doors.iter().chain(self.windows.iter())
    }

    pub fn len(&self) -> usize {
        self.doors.len() + self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Give every opening a unique id, doors first
    pub fn renumber(&mut self) {
        for (id, opening) in self.doors.iter_mut().chain(self.windows.iter_mut()).enumerate() {
            opening.id = id;
        }
    }
}

/// Union of overlapping intervals; input must be sorted by start
fn merge_intervals(intervals: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut result: Vec<(f64, f64)> = Vec::with_capacity(intervals.len());

    for &(start, end) in intervals {
        match result.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => result.push((start, end)),
        }
    }

    result
}

/// Wall hosting a gap: same orientation, gap center alongside its body
fn host_wall<'a>(gap: &BridgedGap, walls: &'a [WallSegment], t: &OpeningThresholds) -> Option<&'a WallSegment> {
    let center = gap.center();
    walls
        .iter()
        .filter(|w| w.orientation() == gap.orientation)
        .filter(|w| point_near_wall_body(&center, w, t.gap_attach_tolerance + w.thickness / 2.0))
        .min_by(|a, b| {
            let da = perpendicular_distance(&center, &a.start, &a.end);
            let db = perpendicular_distance(&center, &b.start, &b.end);
            da.total_cmp(&db)
        })
}

/// Position of a gap endpoint along the wall, in pixels from its start
fn along(wall: &WallSegment, p: &Point2D) -> f64 {
    match wall.unit_direction() {
        Some(u) => (p.x - wall.start.x) * u.x + (p.y - wall.start.y) * u.y,
        None => 0.0,
    }
}

fn gap_endpoints(gap: &BridgedGap) -> (Point2D, Point2D) {
    match gap.orientation {
        Orientation::Horizontal => {
            (Point2D::new(gap.from, gap.line), Point2D::new(gap.to, gap.line))
        }
        Orientation::Vertical => {
            (Point2D::new(gap.line, gap.from), Point2D::new(gap.line, gap.to))
        }
    }
}

/// Doors at bridged gaps, one per unioned interval along each host wall
pub fn detect_doors(walls: &[WallSegment], gaps: &[BridgedGap], t: &OpeningThresholds) -> Vec<Opening> {
    let mut per_wall: FxHashMap<usize, Vec<(f64, f64)>> = FxHashMap::default();
    let mut order: Vec<usize> = Vec::new();

    for gap in gaps {
        let Some(wall) = host_wall(gap, walls, t) else {
            continue;
        };
        let (a, b) = gap_endpoints(gap);
        let (sa, sb) = (along(wall, &a), along(wall, &b));
        let entry = per_wall.entry(wall.id).or_insert_with(|| {
            order.push(wall.id);
            Vec::new()
        });
        entry.push((sa.min(sb), sa.max(sb)));
    }

    let mut doors = Vec::new();
    for wall_id in order {
        let (Some(wall), Some(intervals)) = (
            walls.iter().find(|w| w.id == wall_id),
            per_wall.get_mut(&wall_id),
        ) else {
            continue;
        };
        let Some(u) = wall.unit_direction() else {
            continue;
        };
        intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (from, to) in merge_intervals(intervals) {
            let width = to - from;
            if width < t.door_min_width {
                continue;
            }
            let mid = (from + to) / 2.0;
            doors.push(Opening {
                id: 0,
                kind: OpeningKind::Door,
                position: Point2D::new(wall.start.x + u.x * mid, wall.start.y + u.y * mid),
                width,
                orientation: wall.orientation(),
                wall_id,
                confidence: t.door_confidence,
                sill_height: None,
            });
        }
    }
    doors
}

/// Windows at the middle of long exterior walls with no nearby door
pub fn detect_windows(walls: &[WallSegment], doors: &[Opening], t: &OpeningThresholds) -> Vec<Opening> {
    walls
        .iter()
        .filter(|w| w.wall_type == WallType::Exterior && w.length() >= t.window_min_wall_length)
        .filter_map(|w| {
            let mid = w.midpoint();
            let door_nearby = doors.iter().any(|d| d.position.distance_to(&mid) <= t.door_near_midpoint);
            (!door_nearby).then(|| Opening {
                id: 0,
                kind: OpeningKind::Window,
                position: mid,
                width: t.window_width.min(w.length()),
                orientation: w.orientation(),
                wall_id: w.id,
                confidence: t.window_confidence,
                sill_height: Some(t.sill_height),
            })
        })
        .collect()
}

/// Doors then windows, numbered
pub fn detect_openings(walls: &[WallSegment], gaps: &[BridgedGap], t: &OpeningThresholds) -> OpeningSet {
    let doors = detect_doors(walls, gaps, t);
    let windows = detect_windows(walls, &doors, t);
    let mut set = OpeningSet { doors, windows };
    set.renumber();
    tracing::debug!(
        doors = set.doors.len(),
        windows = set.windows.len(),
        gaps = gaps.len(),
        "Openings inferred"
    );
    set
}

/// Attach to each room the openings hosted by its walls
pub fn link_rooms(rooms: &mut [Room], openings: &OpeningSet) {
    for room in rooms.iter_mut() {
        room.opening_ids = openings
            .iter()
            .filter(|o| room.wall_ids.contains(&o.wall_id))
            .map(|o| o.id)
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectorKind;
    use crate::types::BoundingBox;
    use approx::assert_relative_eq;

    fn wall(id: usize, x1: f64, y1: f64, x2: f64, y2: f64, wall_type: WallType) -> WallSegment {
        let mut w = WallSegment::new(
            Point2D::new(x1, y1),
            Point2D::new(x2, y2),
            8.0,
            DetectorKind::SolidDark,
        );
        w.id = id;
        w.wall_type = wall_type;
        w
    }

    fn gap(orientation: Orientation, line: f64, from: f64, to: f64) -> BridgedGap {
        BridgedGap {
            orientation,
            line,
            from,
            to,
        }
    }

    #[test]
    fn test_merge_intervals() {
        let merged = merge_intervals(&[(0.0, 5.0), (3.0, 8.0), (10.0, 12.0)]);
        assert_eq!(merged, vec![(0.0, 8.0), (10.0, 12.0)]);
    }

    #[test]
    fn test_overlapping_gaps_become_one_door() {
        let walls = vec![wall(3, 20.0, 43.5, 179.0, 43.5, WallType::Interior)];
        let gaps = vec![
            gap(Orientation::Horizontal, 43.5, 90.0, 105.0),
            gap(Orientation::Horizontal, 42.5, 92.0, 108.0),
            // Wrong orientation for this wall
            gap(Orientation::Vertical, 100.0, 40.0, 50.0),
        ];
        let doors = detect_doors(&walls, &gaps, &OpeningThresholds::default());
        assert_eq!(doors.len(), 1);
        let door = &doors[0];
        assert_eq!(door.wall_id, 3);
        assert_relative_eq!(door.width, 18.0, epsilon = 1e-9);
        assert_relative_eq!(door.position.x, 99.0, epsilon = 1e-9);
        assert_relative_eq!(door.position.y, 43.5, epsilon = 1e-9);
        assert_eq!(door.orientation, Orientation::Horizontal);
        assert_relative_eq!(door.confidence, 0.5);
    }

    #[test]
    fn test_reversed_wall_projection() {
        let walls = vec![wall(0, 179.0, 43.5, 20.0, 43.5, WallType::Interior)];
        let gaps = vec![gap(Orientation::Horizontal, 43.5, 90.0, 105.0)];
        let doors = detect_doors(&walls, &gaps, &OpeningThresholds::default());
        assert_eq!(doors.len(), 1);
        assert_relative_eq!(doors[0].width, 15.0, epsilon = 1e-9);
        assert_relative_eq!(doors[0].position.x, 97.5, epsilon = 1e-9);
    }

    #[test]
    fn test_narrow_or_stray_gaps_ignored() {
        let walls = vec![wall(0, 20.0, 43.5, 179.0, 43.5, WallType::Interior)];
        let gaps = vec![
            gap(Orientation::Horizontal, 43.5, 90.0, 92.0),
            gap(Orientation::Horizontal, 120.0, 90.0, 105.0),
        ];
        assert!(detect_doors(&walls, &gaps, &OpeningThresholds::default()).is_empty());
    }

    #[test]
    fn test_windows_on_exterior_walls_without_doors() {
        let walls = vec![
            wall(0, 20.0, 20.0, 380.0, 20.0, WallType::Exterior),
            wall(1, 20.0, 380.0, 380.0, 380.0, WallType::Exterior),
            wall(2, 200.0, 100.0, 200.0, 300.0, WallType::Interior),
            wall(3, 20.0, 20.0, 20.0, 70.0, WallType::Exterior),
        ];
        let gaps = vec![gap(Orientation::Horizontal, 20.0, 190.0, 220.0)];
        let set = detect_openings(&walls, &gaps, &OpeningThresholds::default());

        assert_eq!(set.doors.len(), 1);
        assert_eq!(set.windows.len(), 1);
        let window = &set.windows[0];
        assert_eq!(window.wall_id, 1);
        assert_relative_eq!(window.width, 40.0);
        assert_eq!(window.sill_height, Some(3.0));
        assert_relative_eq!(window.confidence, 0.3);

        // Unique ids, doors first
        assert_eq!(set.doors[0].id, 0);
        assert_eq!(window.id, 1);
    }

    #[test]
    fn test_rooms_get_openings_of_their_walls() {
        let walls = vec![
            wall(0, 20.0, 20.0, 380.0, 20.0, WallType::Exterior),
            wall(1, 20.0, 380.0, 380.0, 380.0, WallType::Exterior),
        ];
        let gaps = vec![gap(Orientation::Horizontal, 20.0, 190.0, 220.0)];
        let set = detect_openings(&walls, &gaps, &OpeningThresholds::default());

        let mut rooms = vec![Room {
            id: 0,
            label: None,
            polygon: Vec::new(),
            area: 0.0,
            perimeter: 0.0,
            centroid: Point2D::new(0.0, 0.0),
            bounding_box: BoundingBox {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 0.0,
                max_y: 0.0,
            },
            wall_ids: vec![0],
            opening_ids: Vec::new(),
            confidence: 0.5,
        }];
        link_rooms(&mut rooms, &set);
        assert_eq!(rooms[0].opening_ids, vec![set.doors[0].id]);
    }
}
