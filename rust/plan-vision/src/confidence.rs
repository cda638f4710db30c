// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Overall confidence and quality grade

use crate::config::QualityThresholds;
use crate::types::{Opening, Quality, Room, WallSegment};

/// Weighted blend of wall, room and opening confidences
///
/// Walls are weighted by length. Entity kinds with nothing detected drop out
/// and the remaining weights are renormalized.
pub fn overall_confidence<'a>(
    walls: &[WallSegment],
    rooms: &[Room],
    openings: impl IntoIterator<Item = &'a Opening>,
    t: &QualityThresholds,
) -> f32 {
    let mut terms: Vec<(f32, f32)> = Vec::with_capacity(3);

    let total_length: f64 = walls.iter().map(WallSegment::length).sum();
    if total_length > 0.0 {
        let weighted: f64 = walls.iter().map(|w| w.confidence as f64 * w.length()).sum();
        terms.push((t.wall_weight, (weighted / total_length) as f32));
    }

    if !rooms.is_empty() {
        let mean = rooms.iter().map(|r| r.confidence).sum::<f32>() / rooms.len() as f32;
        terms.push((t.room_weight, mean));
    }

    let (sum, count) = openings
        .into_iter()
        .fold((0.0f32, 0usize), |(s, c), o| (s + o.confidence, c + 1));
    if count > 0 {
        terms.push((t.opening_weight, sum / count as f32));
    }

    let weight: f32 = terms.iter().map(|(w, _)| w).sum();
    if weight <= 0.0 {
        return 0.0;
    }
    let blended: f32 = terms.iter().map(|(w, c)| w * c).sum::<f32>() / weight;
    blended.clamp(0.0, 1.0)
}

/// Grade a result from its confidence and wall count
pub fn grade(confidence: f32, wall_count: usize, t: &QualityThresholds) -> Quality {
    if wall_count == 0 || confidence < t.medium {
        Quality::Low
    } else if confidence >= t.high && wall_count >= t.min_walls_for_high {
        Quality::High
    } else {
        Quality::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectorKind;
    use crate::types::{OpeningKind, Orientation, Point2D};
    use approx::assert_relative_eq;

    fn wall(length: f64, confidence: f32) -> WallSegment {
        let mut w = WallSegment::new(
            Point2D::new(0.0, 0.0),
            Point2D::new(length, 0.0),
            8.0,
            DetectorKind::SolidDark,
        );
        w.confidence = confidence;
        w
    }

    fn door(confidence: f32) -> Opening {
        Opening {
            id: 0,
            kind: OpeningKind::Door,
            position: Point2D::new(0.0, 0.0),
            width: 30.0,
            orientation: Orientation::Horizontal,
            wall_id: 0,
            confidence,
            sill_height: None,
        }
    }

    #[test]
    fn test_walls_only_renormalizes() {
        let t = QualityThresholds::default();
        let walls = vec![wall(300.0, 0.9), wall(100.0, 0.5)];
        let c = overall_confidence(&walls, &[], std::iter::empty(), &t);
        assert_relative_eq!(c, 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_walls_and_openings() {
        let t = QualityThresholds::default();
        let walls = vec![wall(100.0, 1.0)];
        let doors = vec![door(0.5), door(0.5)];
        let c = overall_confidence(&walls, &[], &doors, &t);
        // (0.6 * 1.0 + 0.15 * 0.5) / 0.75
        assert_relative_eq!(c, 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_nothing_detected_is_zero() {
        let t = QualityThresholds::default();
        assert_eq!(overall_confidence(&[], &[], std::iter::empty(), &t), 0.0);
        assert_eq!(grade(0.0, 0, &t), Quality::Low);
    }

    #[test]
    fn test_grades() {
        let t = QualityThresholds::default();
        assert_eq!(grade(0.9, 0, &t), Quality::Low);
        assert_eq!(grade(0.4, 10, &t), Quality::Low);
        assert_eq!(grade(0.6, 10, &t), Quality::Medium);
        assert_eq!(grade(0.8, 3, &t), Quality::Medium);
        assert_eq!(grade(0.8, 4, &t), Quality::High);
    }
}
