// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Real-world measurements

use crate::config::MeasureConfig;
use crate::types::{BoundingBox, Measurements, Room, WallSegment};

/// Units per pixel: configured, or estimated from the image width
pub fn resolve_scale(config: &MeasureConfig, image_width: u32) -> f64 {
    if let Some(scale) = config.scale {
        return scale;
    }
    let spanned = image_width as f64 * config.margin_factor;
    if spanned > 0.0 {
        config.assumed_building_width / spanned
    } else {
        1.0
    }
}

pub fn measure(rooms: &[Room], walls: &[WallSegment], scale: f64, config: &MeasureConfig) -> Measurements {
    Measurements {
        scale,
        unit: config.unit.clone(),
        total_area: rooms.iter().map(|r| r.area).sum::<f64>() * scale * scale,
        total_perimeter: rooms.iter().map(|r| r.perimeter).sum::<f64>() * scale,
        room_count: rooms.len(),
        bounding_box: BoundingBox::from_points(walls.iter().flat_map(|w| [&w.start, &w.end])),
    }
}
