// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall rendering style classification
//!
//! Samples the image on a sparse grid. For every ink sample the run through it
//! is measured along both axes; the shorter run is the wall's cross-section and
//! decides which rendering convention the sample votes for.

use crate::config::StyleThresholds;
use crate::detectors::DetectorKind;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wall rendering convention of a drawing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WallStyle {
    /// Filled black bands
    SolidDark,
    /// Filled gray bands
    MidGray,
    /// Twin thin lines with a light gap
    ParallelLine,
    /// Single thin strokes
    ThinLine,
    /// Hatched or textured bands
    Patterned,
    /// No dominant convention
    Mixed,
}

impl WallStyle {
    /// Detectors run for this style
    pub fn detectors(&self, thresholds: &StyleThresholds) -> Vec<DetectorKind> {
        match self {
            WallStyle::SolidDark => vec![DetectorKind::SolidDark],
            WallStyle::MidGray => vec![DetectorKind::MidGray],
            WallStyle::ParallelLine => vec![DetectorKind::ParallelLine],
            WallStyle::ThinLine => vec![DetectorKind::ThinLine],
            WallStyle::Patterned => vec![DetectorKind::Patterned],
            WallStyle::Mixed => thresholds.mixed_detectors.clone(),
        }
    }
}

impl fmt::Display for WallStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WallStyle::SolidDark => "solid_dark",
            WallStyle::MidGray => "mid_gray",
            WallStyle::ParallelLine => "parallel_line",
            WallStyle::ThinLine => "thin_line",
            WallStyle::Patterned => "patterned",
            WallStyle::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

/// Per-style sample counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleVotes {
    pub solid_dark: usize,
    pub mid_gray: usize,
    pub parallel_line: usize,
    pub thin_line: usize,
    pub patterned: usize,
    /// Ink samples that matched no signature
    pub unclassified: usize,
}

impl StyleVotes {
    pub fn classified(&self) -> usize {
        self.solid_dark + self.mid_gray + self.parallel_line + self.thin_line + self.patterned
    }

    fn add(&mut self, style: WallStyle) {
        match style {
            WallStyle::SolidDark => self.solid_dark += 1,
            WallStyle::MidGray => self.mid_gray += 1,
            WallStyle::ParallelLine => self.parallel_line += 1,
            WallStyle::ThinLine => self.thin_line += 1,
            WallStyle::Patterned => self.patterned += 1,
            WallStyle::Mixed => self.unclassified += 1,
        }
    }

    /// Style with the most votes, ties resolved in declaration order
    fn leader(&self) -> (WallStyle, usize) {
        [
            (WallStyle::SolidDark, self.solid_dark),
            (WallStyle::MidGray, self.mid_gray),
            (WallStyle::ParallelLine, self.parallel_line),
            (WallStyle::ThinLine, self.thin_line),
            (WallStyle::Patterned, self.patterned),
        ]
        .into_iter()
        .fold((WallStyle::Mixed, 0), |best, (style, count)| {
            if count > best.1 {
                (style, count)
            } else {
                best
            }
        })
    }
}

/// Classification outcome with its vote table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleClassification {
    pub style: WallStyle,
    pub votes: StyleVotes,
    /// Share of classified samples held by the selected style
    pub share: f64,
}

/// Axis-aligned ink run through a sample
#[derive(Debug, Clone, Copy)]
struct Run {
    start: u32,
    end: u32, // inclusive
}

impl Run {
    fn len(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// One scan line (row or column) of the image
struct Line<'a> {
    image: &'a GrayImage,
    fixed: u32,
    horizontal: bool,
}

impl<'a> Line<'a> {
    fn len(&self) -> u32 {
        if self.horizontal {
            self.image.width()
        } else {
            self.image.height()
        }
    }

    fn at(&self, i: u32) -> u8 {
        if self.horizontal {
            self.image.get_pixel(i, self.fixed).0[0]
        } else {
            self.image.get_pixel(self.fixed, i).0[0]
        }
    }

    fn is_ink(&self, i: u32, ceiling: u8) -> bool {
        self.at(i) < ceiling
    }

    /// Extent of the ink run containing `i`
    fn run_through(&self, i: u32, ceiling: u8) -> Run {
        let mut start = i;
        while start > 0 && self.is_ink(start - 1, ceiling) {
            start -= 1;
        }
        let mut end = i;
        while end + 1 < self.len() && self.is_ink(end + 1, ceiling) {
            end += 1;
        }
        Run { start, end }
    }

    fn mean(&self, run: Run) -> f64 {
        let sum: f64 = (run.start..=run.end).map(|i| self.at(i) as f64).sum();
        sum / run.len() as f64
    }

    /// Ink runs within `radius` of `center`
    fn runs_in_window(&self, center: u32, radius: u32, ceiling: u8) -> usize {
        let lo = center.saturating_sub(radius);
        let hi = (center + radius).min(self.len() - 1);
        let mut runs = 0;
        let mut prev_ink = false;
        for i in lo..=hi {
            let ink = self.is_ink(i, ceiling);
            if ink && !prev_ink {
                runs += 1;
            }
            prev_ink = ink;
        }
        runs
    }

    /// Whether a light gap of the allowed width followed by another ink run
    /// sits on either side of `run`
    fn has_twin(&self, run: Run, t: &StyleThresholds) -> bool {
        let ceiling = t.ink_max;
        let len = self.len();

        // forward
        let mut gap = 0;
        let mut i = run.end + 1;
        while i < len && !self.is_ink(i, ceiling) && gap <= t.parallel_gap_max {
            gap += 1;
            i += 1;
        }
        if i < len && self.is_ink(i, ceiling) && (t.parallel_gap_min..=t.parallel_gap_max).contains(&gap) {
            return true;
        }

        // backward
        let mut gap = 0;
        let mut i = run.start;
        while i > 0 && !self.is_ink(i - 1, ceiling) && gap <= t.parallel_gap_max {
            gap += 1;
            i -= 1;
        }
        i > 0 && self.is_ink(i - 1, ceiling) && (t.parallel_gap_min..=t.parallel_gap_max).contains(&gap)
    }
}

/// Classify one ink sample
fn classify_sample(image: &GrayImage, x: u32, y: u32, t: &StyleThresholds) -> WallStyle {
    let row = Line {
        image,
        fixed: y,
        horizontal: true,
    };
    let col = Line {
        image,
        fixed: x,
        horizontal: false,
    };

    let h_run = row.run_through(x, t.ink_max);
    let v_run = col.run_through(y, t.ink_max);

    // Cross-section runs along the axis where the ink is shortest
    let (across, run, pos, along, along_pos) = if h_run.len() <= v_run.len() {
        (&row, h_run, x, &col, y)
    } else {
        (&col, v_run, y, &row, x)
    };

    let runs_across = across.runs_in_window(pos, t.pattern_window, t.ink_max);
    let runs_along = along.runs_in_window(along_pos, t.pattern_window, t.ink_max);
    if runs_across.max(runs_along) >= t.pattern_min_runs as usize {
        return WallStyle::Patterned;
    }

    let len = run.len();
    if len <= t.thin_run_max {
        if across.has_twin(run, t) {
            WallStyle::ParallelLine
        } else {
            WallStyle::ThinLine
        }
    } else if (t.solid_run_min..=t.solid_run_max).contains(&len) {
        if across.mean(run) < t.dark_max as f64 {
            WallStyle::SolidDark
        } else {
            WallStyle::MidGray
        }
    } else {
        WallStyle::Mixed
    }
}

/// Count style votes over the sampling grid
pub fn sample_votes(image: &GrayImage, t: &StyleThresholds) -> StyleVotes {
    let mut votes = StyleVotes::default();
    let stride = t.sample_stride.max(1) as usize;

    for y in (0..image.height()).step_by(stride) {
        for x in (0..image.width()).step_by(stride) {
            if image.get_pixel(x, y).0[0] >= t.ink_max {
                continue;
            }
            votes.add(classify_sample(image, x, y, t));
        }
    }
    votes
}

/// Pick the dominant wall style of an image
pub fn classify(image: &GrayImage, t: &StyleThresholds) -> StyleClassification {
    let votes = sample_votes(image, t);
    let classified = votes.classified();

    if classified < t.min_classified_samples.max(1) {
        tracing::debug!(classified, "Too few style samples, using mixed detectors");
        return StyleClassification {
            style: WallStyle::Mixed,
            votes,
            share: 0.0,
        };
    }

    let (leader, count) = votes.leader();
    let share = count as f64 / classified as f64;
    let style = if share >= t.majority_threshold {
        leader
    } else {
        WallStyle::Mixed
    };

    tracing::debug!(
        style = %style,
        share,
        solid_dark = votes.solid_dark,
        mid_gray = votes.mid_gray,
        parallel_line = votes.parallel_line,
        thin_line = votes.thin_line,
        patterned = votes.patterned,
        "Classified wall style"
    );

    StyleClassification {
        style,
        votes,
        share,
    }
}
