// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Row/column run scanner shared by the raster detectors
//!
//! Scans a binary wall mask row by row, then column by column. Ink pieces on
//! a line are chained across short gaps into runs; a run long and dense
//! enough is measured across its width at a few positions, and a band with a
//! consistent width becomes one wall candidate. The rows crossing one band are
//! folded into a single candidate spanning all of their runs.

use super::{initial_confidence, BridgedGap, DetectorKind, DetectorOutput};
use crate::budget::Budget;
use crate::config::DetectionConfig;
use crate::error::Result;
use crate::image_ops::INK;
use crate::types::{Orientation, Point2D, WallSegment};
use image::GrayImage;
use rustc_hash::{FxHashMap, FxHashSet};

/// Per-detector tuning of the scanner
#[derive(Debug, Clone, Copy)]
pub struct ScanProfile {
    pub kind: DetectorKind,
    /// Accepted band width range (px)
    pub min_thickness: f64,
    pub max_thickness: f64,
}

/// View of a mask along one scan orientation
///
/// `along` runs with the scan line, `line` indexes the scan lines.
#[derive(Clone, Copy)]
struct Axis<'a> {
    mask: &'a GrayImage,
    orientation: Orientation,
}

impl<'a> Axis<'a> {
    fn along_len(&self) -> u32 {
        match self.orientation {
            Orientation::Horizontal => self.mask.width(),
            Orientation::Vertical => self.mask.height(),
        }
    }

    fn line_count(&self) -> u32 {
        match self.orientation {
            Orientation::Horizontal => self.mask.height(),
            Orientation::Vertical => self.mask.width(),
        }
    }

    fn is_ink(&self, along: u32, line: u32) -> bool {
        let (x, y) = self.xy(along, line);
        self.mask.get_pixel(x, y).0[0] == INK
    }

    fn xy(&self, along: u32, line: u32) -> (u32, u32) {
        match self.orientation {
            Orientation::Horizontal => (along, line),
            Orientation::Vertical => (line, along),
        }
    }

    /// Extent of ink across the scan line at `along`, through `line`
    fn cross_extent(&self, along: u32, line: u32) -> (u32, u32) {
        let mut lo = line;
        while lo > 0 && self.is_ink(along, lo - 1) {
            lo -= 1;
        }
        let mut hi = line;
        while hi + 1 < self.line_count() && self.is_ink(along, hi + 1) {
            hi += 1;
        }
        (lo, hi)
    }
}

/// Chained ink pieces on one scan line
#[derive(Debug, Clone, PartialEq)]
struct Run {
    start: u32,
    /// Inclusive
    end: u32,
    ink: u32,
    gaps: Vec<(u32, u32)>,
}

impl Run {
    fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    fn fill(&self) -> f64 {
        self.ink as f64 / self.len() as f64
    }
}

/// Ink pieces of at least `min_len` pixels on one scan line
fn ink_pieces(axis: &Axis<'_>, line: u32, min_len: u32) -> Vec<(u32, u32)> {
    let mut pieces = Vec::new();
    let len = axis.along_len();
    let mut i = 0;
    while i < len {
        if !axis.is_ink(i, line) {
            i += 1;
            continue;
        }
        let start = i;
        while i < len && axis.is_ink(i, line) {
            i += 1;
        }
        if i - start >= min_len {
            pieces.push((start, i - 1));
        }
    }
    pieces
}

/// Chain pieces separated by at most `bridge_gap` pixels
fn bridge_pieces(pieces: &[(u32, u32)], bridge_gap: u32) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for &(start, end) in pieces {
        match runs.last_mut() {
            Some(run) if start - run.end - 1 <= bridge_gap => {
                run.gaps.push((run.end + 1, start));
                run.end = end;
                run.ink += end - start + 1;
            }
            _ => runs.push(Run {
                start,
                end,
                ink: end - start + 1,
                gaps: Vec::new(),
            }),
        }
    }
    runs
}

/// Measured cross-section of a run
#[derive(Debug, Clone, Copy, PartialEq)]
struct Band {
    center: f64,
    thickness: f64,
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Measure the band width at evenly spread positions along the run
///
/// Positions where the band is unbounded (wider than the profile allows) or
/// inconsistent with the median width count against the run.
fn measure_band(
    axis: &Axis<'_>,
    run: &Run,
    line: u32,
    profile: &ScanProfile,
    config: &DetectionConfig,
) -> Option<Band> {
    let t = &config.scan;
    let samples = t.thickness_samples.max(1);

    let mut measured: Vec<(f64, f64)> = Vec::with_capacity(samples);
    for i in 0..samples {
        let frac = (i as f64 + 0.5) / samples as f64;
        let along = run.start + ((run.len() - 1) as f64 * frac).round() as u32;
        if !axis.is_ink(along, line) {
            continue;
        }
        let (lo, hi) = axis.cross_extent(along, line);
        let width = (hi - lo + 1) as f64;
        if width >= profile.min_thickness && width <= profile.max_thickness {
            measured.push((width, (lo + hi) as f64 / 2.0));
        }
    }

    let mut widths: Vec<f64> = measured.iter().map(|m| m.0).collect();
    let typical = median(&mut widths)?;
    let tolerance = (typical * t.thickness_tolerance).max(2.0);

    let consistent: Vec<(f64, f64)> = measured
        .into_iter()
        .filter(|(w, _)| (w - typical).abs() <= tolerance)
        .collect();
    if (consistent.len() as f64) < t.side_clearance_ratio * samples as f64 {
        return None;
    }

    let mut widths: Vec<f64> = consistent.iter().map(|m| m.0).collect();
    let mut centers: Vec<f64> = consistent.iter().map(|m| m.1).collect();
    Some(Band {
        thickness: median(&mut widths)?,
        center: median(&mut centers)?,
    })
}

/// Ink darkness and hollowness of the band in the source image
fn sample_band(
    image: &GrayImage,
    orientation: Orientation,
    start: u32,
    end: u32,
    band: &Band,
    ink_max: u8,
) -> (f64, bool) {
    let half = (band.thickness - 1.0) / 2.0;
    let lo = (band.center - half).round().max(0.0) as u32;
    let hi = (band.center + half).round().max(0.0) as u32;

    let mut ink_sum = 0.0;
    let mut ink_count = 0u32;
    let mut all_sum = 0.0;
    let mut all_count = 0u32;
    let mut light = false;

    for line in lo..=hi {
        for along in start..=end {
            let (x, y) = match orientation {
                Orientation::Horizontal => (along, line),
                Orientation::Vertical => (line, along),
            };
            if x >= image.width() || y >= image.height() {
                continue;
            }
            let v = image.get_pixel(x, y).0[0];
            all_sum += v as f64;
            all_count += 1;
            if v < ink_max {
                ink_sum += v as f64;
                ink_count += 1;
            } else {
                light = true;
            }
        }
    }

    let darkness = if ink_count > 0 {
        ink_sum / ink_count as f64
    } else if all_count > 0 {
        all_sum / all_count as f64
    } else {
        255.0
    };
    (darkness, light)
}

/// Wall band accumulated over the scan lines crossing it
struct Candidate {
    orientation: Orientation,
    band: Band,
    start: u32,
    end: u32,
    gaps: FxHashSet<(u32, u32)>,
}

impl Candidate {
    fn new(orientation: Orientation, band: Band, run: &Run) -> Self {
        Self {
            orientation,
            band,
            start: run.start,
            end: run.end,
            gaps: run.gaps.iter().copied().collect(),
        }
    }

    fn overlaps(&self, start: u32, end: u32) -> bool {
        start <= self.end && end >= self.start
    }

    fn absorb(&mut self, run: &Run) {
        self.start = self.start.min(run.start);
        self.end = self.end.max(run.end);
        self.gaps.extend(run.gaps.iter().copied());
    }
}

/// Scan a binary wall mask for wall candidates
pub fn scan_walls(
    mask: &GrayImage,
    image: &GrayImage,
    profile: &ScanProfile,
    config: &DetectionConfig,
    budget: &Budget,
) -> Result<DetectorOutput> {
    let t = &config.scan;
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut by_band: FxHashMap<(Orientation, i64), Vec<usize>> = FxHashMap::default();

    for orientation in [Orientation::Horizontal, Orientation::Vertical] {
        let axis = Axis { mask, orientation };

        for line in (0..axis.line_count()).step_by(t.stride.max(1) as usize) {
            budget.check(profile.kind)?;

            let pieces = ink_pieces(&axis, line, t.min_piece_len);
            for run in bridge_pieces(&pieces, t.bridge_gap) {
                if (run.len() as f64) < t.min_wall_length || run.fill() < t.min_fill {
                    continue;
                }
                let Some(band) = measure_band(&axis, &run, line, profile, config) else {
                    continue;
                };

                // Rows of one band share its center; fold their runs together
                let key = (orientation, (band.center * 2.0).round() as i64);
                let slots = by_band.entry(key).or_default();
                match slots
                    .iter()
                    .copied()
                    .find(|&i| candidates[i].overlaps(run.start, run.end))
                {
                    Some(i) => candidates[i].absorb(&run),
                    None => {
                        slots.push(candidates.len());
                        candidates.push(Candidate::new(orientation, band, &run));
                    }
                }
            }
        }
    }

    let mut output = DetectorOutput::empty(profile.kind);
    for candidate in candidates {
        let (darkness, light_interior) = sample_band(
            image,
            candidate.orientation,
            candidate.start,
            candidate.end,
            &candidate.band,
            config.style.ink_max,
        );
        let center = candidate.band.center;
        let (start, end) = match candidate.orientation {
            Orientation::Horizontal => (
                Point2D::new(candidate.start as f64, center),
                Point2D::new(candidate.end as f64, center),
            ),
            Orientation::Vertical => (
                Point2D::new(center, candidate.start as f64),
                Point2D::new(center, candidate.end as f64),
            ),
        };
        let length = (candidate.end - candidate.start + 1) as f64;

        let mut wall = WallSegment::new(start, end, candidate.band.thickness, profile.kind);
        wall.confidence = initial_confidence(length, candidate.band.thickness, 1.0, config);
        wall.interior_darkness = darkness;
        wall.light_interior = light_interior;
        output.segments.push(wall);

        let mut gaps: Vec<(u32, u32)> = candidate.gaps.into_iter().collect();
        gaps.sort_unstable();
        output.gaps.extend(gaps.into_iter().map(|(from, to)| BridgedGap {
            orientation: candidate.orientation,
            line: center,
            from: from as f64,
            to: to as f64,
        }));
    }

    Ok(output)
}
