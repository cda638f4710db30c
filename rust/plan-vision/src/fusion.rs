// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fusion of a primary and a secondary detection pass
//!
//! Primary walls are kept as the base. A secondary wall that overlaps one of
//! them refines it when the secondary is confident enough, and is dropped
//! otherwise; secondary walls with no counterpart are added. On very low
//! contrast images the primary pass is unreliable, so only its confident
//! walls survive and every overlapping secondary wall refines its match.

use crate::config::{DetectionConfig, OpeningThresholds};
use crate::error::{PlanError, Result};
use crate::line_ops::point_near_wall_body;
use crate::merge::walls_overlap;
use crate::openings::OpeningSet;
use crate::types::{Opening, OpeningKind, Point2D, Provenance, WallSegment};
use nalgebra::Vector2;

/// Fused walls plus what happened to the secondary set
#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutcome {
    pub walls: Vec<WallSegment>,
    pub refined: usize,
    pub appended: usize,
    pub dropped: usize,
    /// Low contrast switched trust toward the secondary pass
    pub inverted: bool,
}

/// Reject secondary walls fusion cannot use
pub fn validate_secondary(walls: &[WallSegment]) -> Result<()> {
    match walls.iter().find(|w| !w.is_well_formed()) {
        Some(w) => Err(PlanError::FusionInputMismatch(format!(
            "secondary wall {} is malformed (start {:?}, end {:?}, confidence {})",
            w.id, w.start, w.end, w.confidence
        ))),
        None => Ok(()),
    }
}

/// Refine a primary wall with an overlapping secondary one
///
/// The direction becomes the confidence-weighted mean of both, pivoting on the
/// primary midpoint; the extent covers both walls along it.
pub fn refine(primary: &WallSegment, secondary: &WallSegment, t: &DetectionConfig) -> WallSegment {
    let (Some(up), Some(us)) = (primary.unit_direction(), secondary.unit_direction()) else {
        return primary.clone();
    };
    let us = if us.dot(&up) < 0.0 { -us } else { us };

    let (wp, ws) = (primary.confidence as f64, secondary.confidence as f64);
    let blended = up * wp + us * ws;
    let axis: Vector2<f64> = if blended.norm() > 1e-9 {
        blended.normalize()
    } else {
        up
    };

    let pivot = primary.midpoint().to_nalgebra();
    let (min_s, max_s) = primary
        .endpoints()
        .iter()
        .chain(secondary.endpoints().iter())
        .map(|p| (p.to_nalgebra() - pivot).dot(&axis))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s), hi.max(s)));

    WallSegment {
        start: Point2D::from_nalgebra(&(pivot + axis * min_s)),
        end: Point2D::from_nalgebra(&(pivot + axis * max_s)),
        thickness: (primary.thickness + secondary.thickness) / 2.0,
        confidence: (primary.confidence + t.fusion.confidence_bonus).min(1.0),
        enhanced_by: Some(secondary.source),
        provenance: Provenance::Merged,
        ..primary.clone()
    }
}

/// Fuse a secondary wall set into the primary one
pub fn fuse_walls(
    primary: Vec<WallSegment>,
    secondary: &[WallSegment],
    contrast: f64,
    config: &DetectionConfig,
) -> FusionOutcome {
    let f = &config.fusion;
    let inverted = contrast < f.low_contrast;

    let mut walls: Vec<WallSegment> = if inverted {
        primary
            .into_iter()
            .filter(|w| w.confidence >= f.high_confidence)
            .collect()
    } else {
        primary
    };
    let base_len = walls.len();
    // Bonus is granted once per primary wall however many secondaries refine it
    let boosted: Vec<f32> = walls
        .iter()
        .map(|w| (w.confidence + f.confidence_bonus).min(1.0))
        .collect();

    let mut outcome = FusionOutcome {
        walls: Vec::new(),
        refined: 0,
        appended: 0,
        dropped: 0,
        inverted,
    };

    for s in secondary {
        let matched = walls[..base_len]
            .iter()
            .position(|p| walls_overlap(p, s, &config.merge));

        match matched {
            Some(i) if inverted || s.confidence >= f.refine_threshold => {
                let refined = refine(&walls[i], s, config);
                walls[i] = WallSegment {
                    confidence: refined.confidence.min(boosted[i]),
                    ..refined
                };
                outcome.refined += 1;
            }
            Some(_) => outcome.dropped += 1,
            None => {
                walls.push(WallSegment {
                    provenance: Provenance::Secondary,
                    ..s.clone()
                });
                outcome.appended += 1;
            }
        }
    }

    tracing::debug!(
        refined = outcome.refined,
        appended = outcome.appended,
        dropped = outcome.dropped,
        inverted,
        "Walls fused"
    );
    outcome.walls = walls;
    outcome
}

/// Add secondary openings that do not duplicate a primary one
///
/// Secondary openings are re-hosted on the nearest fused wall by position;
/// ones with no host are dropped. Ids are renumbered.
pub fn fuse_openings(
    mut primary: OpeningSet,
    secondary: &[Opening],
    walls: &[WallSegment],
    t: &OpeningThresholds,
    duplicate_radius: f64,
) -> OpeningSet {
    for opening in secondary {
        let duplicate = primary
            .iter()
            .any(|o| o.position.distance_to(&opening.position) <= duplicate_radius);
        if duplicate {
            continue;
        }

        let host = walls
            .iter()
            .filter(|w| point_near_wall_body(&opening.position, w, t.gap_attach_tolerance + w.thickness / 2.0))
            .min_by(|a, b| {
                let da = a.midpoint().distance_to(&opening.position);
                let db = b.midpoint().distance_to(&opening.position);
                da.total_cmp(&db)
            });
        let Some(host) = host else {
            continue;
        };

        let rehosted = Opening {
            wall_id: host.id,
            orientation: host.orientation(),
            ..opening.clone()
        };
        match rehosted.kind {
            OpeningKind::Door => primary.doors.push(rehosted),
            OpeningKind::Window => primary.windows.push(rehosted),
        }
    }

    primary.renumber();
    primary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectorKind;
    use crate::types::Orientation;
    use approx::assert_relative_eq;

    fn wall(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f32, source: DetectorKind) -> WallSegment {
        let mut w = WallSegment::new(Point2D::new(x1, y1), Point2D::new(x2, y2), 8.0, source);
        w.confidence = confidence;
        w
    }

    #[test]
    fn test_overlap_refines_and_distinct_is_appended() {
        let config = DetectionConfig::default();
        let a = wall(0.0, 0.0, 100.0, 0.0, 0.7, DetectorKind::SolidDark);
        let a_prime = wall(5.0, 2.0, 110.0, 2.0, 0.9, DetectorKind::EdgeContour);
        let b = wall(0.0, 200.0, 100.0, 200.0, 0.6, DetectorKind::EdgeContour);

        let outcome = fuse_walls(vec![a], &[a_prime, b], 80.0, &config);
        assert_eq!(outcome.walls.len(), 2);
        assert!(!outcome.inverted);

        let merged = &outcome.walls[0];
        assert_eq!(merged.provenance, Provenance::Merged);
        assert_eq!(merged.enhanced_by, Some(DetectorKind::EdgeContour));
        assert_eq!(merged.source, DetectorKind::SolidDark);
        assert_relative_eq!(merged.confidence, 0.75, epsilon = 1e-6);
        assert!(merged.end.x > 109.0);
        assert!(merged.start.x < 0.5);

        let appended = &outcome.walls[1];
        assert_eq!(appended.provenance, Provenance::Secondary);
        assert_eq!(appended.source, DetectorKind::EdgeContour);
    }

    #[test]
    fn test_several_secondaries_add_one_bonus() {
        let config = DetectionConfig::default();
        let a = wall(0.0, 0.0, 100.0, 0.0, 0.7, DetectorKind::SolidDark);
        let left = wall(-10.0, 1.0, 60.0, 1.0, 0.9, DetectorKind::EdgeContour);
        let right = wall(40.0, 1.0, 120.0, 1.0, 0.9, DetectorKind::EdgeContour);

        let outcome = fuse_walls(vec![a], &[left, right], 80.0, &config);
        assert_eq!(outcome.refined, 2);
        assert_eq!(outcome.walls.len(), 1);
        let merged = &outcome.walls[0];
        assert_relative_eq!(merged.confidence, 0.75, epsilon = 1e-6);
        // Extent still grows with each refinement
        assert!(merged.start.x < -9.0);
        assert!(merged.end.x > 119.0);
    }

    #[test]
    fn test_weak_overlap_is_dropped() {
        let config = DetectionConfig::default();
        let a = wall(0.0, 0.0, 100.0, 0.0, 0.7, DetectorKind::SolidDark);
        let weak = wall(0.0, 1.0, 100.0, 1.0, 0.5, DetectorKind::EdgeContour);

        let outcome = fuse_walls(vec![a.clone()], &[weak], 80.0, &config);
        assert_eq!(outcome.walls, vec![a]);
        assert_eq!(outcome.dropped, 1);
    }

    #[test]
    fn test_low_contrast_inverts_trust() {
        let config = DetectionConfig::default();
        let strong = wall(0.0, 0.0, 100.0, 0.0, 0.85, DetectorKind::SolidDark);
        let weak = wall(0.0, 100.0, 100.0, 100.0, 0.5, DetectorKind::SolidDark);
        let overlapping = wall(0.0, 1.0, 100.0, 1.0, 0.5, DetectorKind::EdgeContour);

        let outcome = fuse_walls(vec![strong, weak], &[overlapping], 10.0, &config);
        assert!(outcome.inverted);
        assert_eq!(outcome.walls.len(), 1);
        assert_eq!(outcome.walls[0].provenance, Provenance::Merged);
        assert_eq!(outcome.refined, 1);
    }

    #[test]
    fn test_refine_weights_direction() {
        let config = DetectionConfig::default();
        let p = wall(0.0, 0.0, 100.0, 0.0, 0.5, DetectorKind::SolidDark);
        let s = wall(100.0, 2.0, 0.0, 2.0, 0.5, DetectorKind::EdgeContour);
        let r = refine(&p, &s, &config);
        // Reversed secondary is flipped before blending
        assert!(r.end.x > r.start.x);
        assert_relative_eq!(r.start.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(r.length(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(r.thickness, 8.0);
    }

    #[test]
    fn test_malformed_secondary_rejected() {
        let mut bad = wall(0.0, 0.0, 100.0, 0.0, 0.9, DetectorKind::EdgeContour);
        bad.end.x = f64::NAN;
        assert!(matches!(
            validate_secondary(&[bad]),
            Err(PlanError::FusionInputMismatch(_))
        ));

        let zero = wall(5.0, 5.0, 5.0, 5.0, 0.9, DetectorKind::EdgeContour);
        assert!(validate_secondary(&[zero]).is_err());

        let mut over = wall(0.0, 0.0, 100.0, 0.0, 0.9, DetectorKind::EdgeContour);
        over.confidence = 1.5;
        assert!(validate_secondary(&[over]).is_err());
    }

    #[test]
    fn test_secondary_openings_deduplicated_and_rehosted() {
        let mut host = wall(0.0, 50.0, 300.0, 50.0, 0.9, DetectorKind::SolidDark);
        host.id = 4;
        let door = |x: f64, wall_id: usize| Opening {
            id: 0,
            kind: OpeningKind::Door,
            position: Point2D::new(x, 50.0),
            width: 30.0,
            orientation: Orientation::Horizontal,
            wall_id,
            confidence: 0.5,
            sill_height: None,
        };
        let primary = OpeningSet {
            doors: vec![door(100.0, 4)],
            windows: Vec::new(),
        };
        let secondary = vec![door(110.0, 99), door(200.0, 99), door(800.0, 99)];

        let fused = fuse_openings(
            primary,
            &secondary,
            &[host],
            &OpeningThresholds::default(),
            30.0,
        );
        assert_eq!(fused.doors.len(), 2);
        assert_eq!(fused.doors[1].wall_id, 4);
        assert_eq!(fused.doors[1].id, 1);
    }
}
