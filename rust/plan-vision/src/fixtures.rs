// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic floor plans for unit tests

use image::{GrayImage, Luma};

pub const PAPER: u8 = 255;

/// White page
pub fn blank(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([PAPER]))
}

/// Fill `[x0, x1) x [y0, y1)`, clipped to the image
pub fn fill_rect(img: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, value: u8) {
    for y in y0..y1.min(img.height()) {
        for x in x0..x1.min(img.width()) {
            img.put_pixel(x, y, Luma([value]));
        }
    }
}

/// Rectangular wall ring of `thickness` inside `[x0, x1) x [y0, y1)`
pub fn draw_ring(img: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, thickness: u32, value: u8) {
    fill_rect(img, x0, y0, x1, y0 + thickness, value);
    fill_rect(img, x0, y1 - thickness, x1, y1, value);
    fill_rect(img, x0, y0, x0 + thickness, y1, value);
    fill_rect(img, x1 - thickness, y0, x1, y1, value);
}

/// Single rectangular room drawn as a solid wall ring
#[allow(clippy::too_many_arguments)]
pub fn solid_rectangle(
    width: u32,
    height: u32,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
    thickness: u32,
    value: u8,
) -> GrayImage {
    let mut img = blank(width, height);
    draw_ring(&mut img, x0, y0, x1, y1, thickness, value);
    img
}

/// Twin gray 1px lines 8px apart: an outer ring plus an L-shaped partition
pub fn double_line_plan() -> GrayImage {
    let mut img = blank(400, 400);
    let gray = 128;

    // Outer faces at 20 / 379, inner faces at 29 / 370
    for (lo, hi) in [(20u32, 379u32), (29, 370)] {
        for i in lo..=hi {
            img.put_pixel(i, lo, Luma([gray]));
            img.put_pixel(i, hi, Luma([gray]));
            img.put_pixel(lo, i, Luma([gray]));
            img.put_pixel(hi, i, Luma([gray]));
        }
    }

    // L-shaped partition
    for x in 120..=280 {
        img.put_pixel(x, 200, Luma([gray]));
        img.put_pixel(x, 209, Luma([gray]));
    }
    for y in 120..=209 {
        img.put_pixel(120, y, Luma([gray]));
        img.put_pixel(129, y, Luma([gray]));
    }
    img
}

/// Uniform random noise, reproducible per seed
pub fn noise(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut state = seed.max(1);
    GrayImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        Luma([(state >> 56) as u8])
    })
}

/// Wall thickness of [`rooms_in_row`]
pub const ROW_WALL: u32 = 6;
/// Interior size of each room in [`rooms_in_row`]
pub const ROW_ROOM_WIDTH: u32 = 100;
pub const ROW_ROOM_HEIGHT: u32 = 140;

/// `n` rooms side by side, separated by solid partitions
pub fn rooms_in_row(n: u32) -> GrayImage {
    let pitch = ROW_ROOM_WIDTH + ROW_WALL;
    let margin = 20;
    let width = margin * 2 + n * pitch + ROW_WALL;
    let height = margin * 2 + ROW_ROOM_HEIGHT + ROW_WALL * 2;
    let mut img = blank(width, height);

    let x_end = margin + n * pitch + ROW_WALL;
    let y_end = margin + ROW_ROOM_HEIGHT + ROW_WALL * 2;
    draw_ring(&mut img, margin, margin, x_end, y_end, ROW_WALL, 0);
    for i in 1..n {
        let x = margin + i * pitch;
        fill_rect(&mut img, x, margin, x + ROW_WALL, y_end, 0);
    }
    img
}
