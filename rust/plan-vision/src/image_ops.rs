// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Image preprocessing for floor plan recognition

use crate::error::{PlanError, Result};
use image::{GrayImage, ImageReader, Luma};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Foreground value used in binary masks
pub const INK: u8 = 255;

/// Rectangular region of interest in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Mean and standard deviation of grayscale intensity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// Decode an image file into grayscale
pub fn load_grayscale(path: impl AsRef<Path>) -> Result<GrayImage> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let reader = ImageReader::open(path)
        .map_err(|e| PlanError::image_load(&name, e))?
        .with_guessed_format()
        .map_err(|e| PlanError::image_load(&name, e))?;
    let decoded = reader.decode().map_err(|e| PlanError::image_load(&name, e))?;
    Ok(decoded.to_luma8())
}

/// Decode an in-memory encoded image (PNG/JPEG) into grayscale
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PlanError::image_load("<memory>", e))?;
    let decoded = reader
        .decode()
        .map_err(|e| PlanError::image_load("<memory>", e))?;
    Ok(decoded.to_luma8())
}

/// Convert RGBA bytes to grayscale image
pub fn rgba_to_grayscale(rgba: &[u8], width: u32, height: u32) -> Result<GrayImage> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() < expected {
        return Err(PlanError::image_load(
            "<rgba>",
            format!("expected {} bytes, got {}", expected, rgba.len()),
        ));
    }

    let mut gray = GrayImage::new(width, height);
    for (i, pixel) in gray.pixels_mut().enumerate() {
        let r = rgba[i * 4] as f32;
        let g = rgba[i * 4 + 1] as f32;
        let b = rgba[i * 4 + 2] as f32;
        // ITU-R BT.601 luma
        let luma = (0.299 * r + 0.587 * g + 0.114 * b).round().min(255.0) as u8;
        *pixel = Luma([luma]);
    }
    Ok(gray)
}

/// Crop to a region of interest, rejecting regions outside the image
pub fn crop_region(image: &GrayImage, region: Region) -> Result<GrayImage> {
    let fits = region.width > 0
        && region.height > 0
        && region.x.checked_add(region.width).is_some_and(|r| r <= image.width())
        && region.y.checked_add(region.height).is_some_and(|b| b <= image.height());
    if !fits {
        return Err(PlanError::InvalidRegion {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            image_width: image.width(),
            image_height: image.height(),
        });
    }
    Ok(image::imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image())
}

/// Intensity mean and standard deviation (the contrast measure)
pub fn intensity_stats(image: &GrayImage) -> IntensityStats {
    let n = image.width() as f64 * image.height() as f64;
    if n == 0.0 {
        return IntensityStats {
            mean: 0.0,
            std_dev: 0.0,
        };
    }

    let (sum, sum_sq) = image.pixels().fold((0.0f64, 0.0f64), |(s, sq), p| {
        let v = p.0[0] as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    IntensityStats {
        mean,
        std_dev: variance.sqrt(),
    }
}

/// Binary mask of pixels whose intensity falls in `[low, high]`
pub fn band_mask(image: &GrayImage, low: u8, high: u8) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(mask.pixels_mut()) {
        let v = src.0[0];
        if v >= low && v <= high {
            dst.0[0] = INK;
        }
    }
    mask
}

/// Binary mask of pixels strictly darker than `ceiling`
pub fn ink_mask(image: &GrayImage, ceiling: u8) -> GrayImage {
    match ceiling {
        0 => GrayImage::new(image.width(), image.height()),
        c => band_mask(image, 0, c - 1),
    }
}

/// Apply Gaussian blur for noise reduction
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Apply Canny edge detection
pub fn canny_edges(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    imageproc::edges::canny(image, low_threshold, high_threshold)
}

/// Pixel-wise OR of two binary masks of equal size
pub fn mask_union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = a.clone();
    for (dst, src) in out.pixels_mut().zip(b.pixels()) {
        dst.0[0] = dst.0[0].max(src.0[0]);
    }
    out
}

/// Morphological dilation - expands white regions
pub fn dilate(image: &GrayImage, radius: u8) -> GrayImage {
    imageproc::morphology::dilate(image, imageproc::distance_transform::Norm::L1, radius)
}

/// Morphological erosion - shrinks white regions
pub fn erode(image: &GrayImage, radius: u8) -> GrayImage {
    imageproc::morphology::erode(image, imageproc::distance_transform::Norm::L1, radius)
}

/// Morphological closing (dilate then erode) - fills small gaps
pub fn morphological_close(image: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return image.clone();
    }
    let dilated = dilate(image, radius);
    erode(&dilated, radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_band_mask() {
        let mut img = GrayImage::from_pixel(4, 1, Luma([255]));
        img.put_pixel(0, 0, Luma([10]));
        img.put_pixel(1, 0, Luma([128]));
        img.put_pixel(2, 0, Luma([230]));

        let gray = band_mask(&img, 50, 220);
        assert_eq!(gray.get_pixel(0, 0).0[0], 0);
        assert_eq!(gray.get_pixel(1, 0).0[0], INK);
        assert_eq!(gray.get_pixel(2, 0).0[0], 0);

        let ink = ink_mask(&img, 220);
        assert_eq!(ink.get_pixel(0, 0).0[0], INK);
        assert_eq!(ink.get_pixel(2, 0).0[0], 0);
    }

    #[test]
    fn test_rgba_to_grayscale() {
        let rgba = vec![255, 255, 255, 255, 0, 0, 0, 255];
        let gray = rgba_to_grayscale(&rgba, 2, 1).unwrap();

        assert_eq!(gray.get_pixel(0, 0).0[0], 255);
        assert_eq!(gray.get_pixel(1, 0).0[0], 0);
        assert!(rgba_to_grayscale(&rgba, 3, 1).is_err());
    }

    #[test]
    fn test_crop_region_bounds() {
        let img = GrayImage::new(100, 50);
        let cropped = crop_region(&img, Region::new(10, 10, 20, 30)).unwrap();
        assert_eq!(cropped.dimensions(), (20, 30));

        let err = crop_region(&img, Region::new(90, 0, 20, 10)).unwrap_err();
        assert!(matches!(err, PlanError::InvalidRegion { .. }));
    }

    #[test]
    fn test_intensity_stats() {
        let mut img = GrayImage::from_pixel(2, 1, Luma([0]));
        img.put_pixel(1, 0, Luma([200]));
        let stats = intensity_stats(&img);
        assert_relative_eq!(stats.mean, 100.0, epsilon = 1e-9);
        assert_relative_eq!(stats.std_dev, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_load_missing_file_is_image_load_error() {
        let err = load_grayscale("/nonexistent/plan.png").unwrap_err();
        assert!(matches!(err, PlanError::ImageLoad { .. }));
        assert!(err.is_fatal());
    }
}
