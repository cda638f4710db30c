// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raster detectors: one wall mask per rendering convention

use super::scan::{scan_walls, ScanProfile};
use super::{DetectorContext, DetectorKind, DetectorOutput};
use crate::config::DetectionConfig;
use crate::error::Result;
use crate::image_ops::{band_mask, ink_mask, morphological_close};
use image::GrayImage;

/// Build the wall mask and scan profile for a raster detector
pub fn wall_mask(kind: DetectorKind, image: &GrayImage, config: &DetectionConfig) -> (GrayImage, ScanProfile) {
    let style = &config.style;
    let scan = &config.scan;
    let banded = |min_thickness: f64| ScanProfile {
        kind,
        min_thickness,
        max_thickness: scan.max_wall_thickness,
    };

    match kind {
        DetectorKind::SolidDark => (ink_mask(image, style.dark_max), banded(scan.solid_min_thickness)),
        DetectorKind::MidGray => (
            band_mask(image, style.dark_max, style.ink_max.saturating_sub(1)),
            banded(scan.solid_min_thickness),
        ),
        // Twin lines close into one band
        DetectorKind::ParallelLine => (
            morphological_close(&ink_mask(image, style.ink_max), scan.parallel_close_radius),
            banded(scan.solid_min_thickness),
        ),
        DetectorKind::ThinLine => (
            ink_mask(image, style.ink_max),
            ScanProfile {
                kind,
                min_thickness: 1.0,
                max_thickness: scan.thin_max_thickness,
            },
        ),
        DetectorKind::Patterned => (
            morphological_close(&ink_mask(image, style.ink_max), scan.pattern_close_radius),
            banded(scan.solid_min_thickness),
        ),
        // Not a raster detector; an empty mask scans to nothing
        DetectorKind::EdgeContour => (
            GrayImage::new(image.width(), image.height()),
            banded(scan.solid_min_thickness),
        ),
    }
}

/// Detect walls with one of the mask-based detectors
pub fn detect_raster_walls(kind: DetectorKind, ctx: &DetectorContext<'_>) -> Result<DetectorOutput> {
    ctx.budget.check(kind)?;
    let (mask, profile) = wall_mask(kind, ctx.image, ctx.config);
    scan_walls(&mask, ctx.image, &profile, ctx.config, ctx.budget)
}
