// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room detection from the final wall set
//!
//! Walls are drawn into a mask with their thickness, and every 4-connected
//! region of open space enclosed by them (not reaching the image border) is a
//! room. Area, perimeter and centroid are pixel statistics; the polygon is
//! the traced boundary simplified with Douglas-Peucker.

use crate::config::RoomThresholds;
use crate::line_ops::{perpendicular_distance, point_near_wall_body};
use crate::types::{BoundingBox, LabelSource, Point2D, Room, RoomLabel, TextLabel, WallSegment};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::region_labelling::{connected_components, Connectivity};

const OPEN: u8 = 255;
const WALL: u8 = 0;

/// Draw walls as filled oriented rectangles on open space
///
/// A pixel is wall when its center lies within half the thickness of the
/// center line, with the ends extended by half the thickness so corners close.
pub fn rasterize_walls(walls: &[WallSegment], width: u32, height: u32) -> GrayImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([OPEN]));
    if width == 0 || height == 0 {
        return img;
    }

    for wall in walls {
        let Some(u) = wall.unit_direction() else {
            continue;
        };
        let half = wall.thickness / 2.0;
        let limit = (half - 0.5).max(0.5) + 1e-6;
        let length = wall.length();
        let reach = half + 1.0;

        let x0 = (wall.start.x.min(wall.end.x) - reach).floor().max(0.0) as u32;
        let y0 = (wall.start.y.min(wall.end.y) - reach).floor().max(0.0) as u32;
        let x1 = ((wall.start.x.max(wall.end.x) + reach).ceil().max(0.0) as u32).min(width - 1);
        let y1 = ((wall.start.y.max(wall.end.y) + reach).ceil().max(0.0) as u32).min(height - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                let (px, py) = (x as f64 - wall.start.x, y as f64 - wall.start.y);
                let along = px * u.x + py * u.y;
                let across = (py * u.x - px * u.y).abs();
                if along >= -half - 1e-6 && along <= length + half + 1e-6 && across <= limit {
                    img.put_pixel(x, y, Luma([WALL]));
                }
            }
        }
    }
    img
}

/// Pixel statistics of one labelled component
#[derive(Debug, Clone)]
struct Component {
    label: u32,
    area: u64,
    boundary: u64,
    sum_x: f64,
    sum_y: f64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    touches_border: bool,
}

impl Component {
    fn new(label: u32, x: u32, y: u32) -> Self {
        Self {
            label,
            area: 0,
            boundary: 0,
            sum_x: 0.0,
            sum_y: 0.0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            touches_border: false,
        }
    }
}

fn component_stats(labels: &image::ImageBuffer<Luma<u32>, Vec<u32>>) -> Vec<Component> {
    let (width, height) = labels.dimensions();
    let mut slots: Vec<Option<Component>> = Vec::new();

    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel.0[0];
        if label == 0 {
            continue;
        }
        let idx = label as usize;
        if slots.len() <= idx {
            slots.resize(idx + 1, None);
        }
        let c = slots[idx].get_or_insert_with(|| Component::new(label, x, y));

        c.area += 1;
        c.sum_x += x as f64;
        c.sum_y += y as f64;
        c.min_x = c.min_x.min(x);
        c.min_y = c.min_y.min(y);
        c.max_x = c.max_x.max(x);
        c.max_y = c.max_y.max(y);

        let on_border = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
        c.touches_border |= on_border;

        let differs = |nx: u32, ny: u32| labels.get_pixel(nx, ny).0[0] != label;
        let boundary = on_border
            || differs(x - 1, y)
            || differs(x + 1, y)
            || differs(x, y - 1)
            || differs(x, y + 1);
        if boundary {
            c.boundary += 1;
        }
    }

    slots.into_iter().flatten().collect()
}

/// Outer boundary of a component, in image coordinates
fn trace_boundary(labels: &image::ImageBuffer<Luma<u32>, Vec<u32>>, c: &Component) -> Vec<Point2D> {
    // One pixel of padding keeps the contour off the crop edge
    let w = c.max_x - c.min_x + 3;
    let h = c.max_y - c.min_y + 3;
    let crop = GrayImage::from_fn(w, h, |x, y| {
        if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
            return Luma([0]);
        }
        let (ix, iy) = (c.min_x + x - 1, c.min_y + y - 1);
        if labels.get_pixel(ix, iy).0[0] == c.label {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    find_contours::<i32>(&crop)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .max_by_key(|contour| contour.points.len())
        .map(|contour| {
            contour
                .points
                .iter()
                .map(|p| {
                    Point2D::new(
                        (p.x + c.min_x as i32 - 1) as f64,
                        (p.y + c.min_y as i32 - 1) as f64,
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Simplify polyline using Douglas-Peucker algorithm
fn douglas_peucker(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = &points[0];
    let last = &points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_idx = 0;

    for (i, point) in points.iter().enumerate().skip(1).take(points.len() - 2) {
        let dist = perpendicular_distance(point, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        let left = douglas_peucker(&points[..=max_idx], epsilon);
        let right = douglas_peucker(&points[max_idx..], epsilon);

        let mut result = left;
        result.extend_from_slice(&right[1..]);
        result
    } else {
        vec![*first, *last]
    }
}

/// Douglas-Peucker on a closed ring
///
/// The ring is split at the point farthest from its first point and both
/// halves are simplified; vertices left collinear at the seam are dropped.
fn simplify_closed(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    if points.len() < 4 {
        return points.to_vec();
    }

    let origin = points[0];
    let far = points
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.distance_to(&origin).total_cmp(&b.1.distance_to(&origin)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    if far == 0 {
        return points.to_vec();
    }

    let mut closing: Vec<Point2D> = points[far..].to_vec();
    closing.push(origin);

    let mut ring = douglas_peucker(&points[..=far], epsilon);
    let tail = douglas_peucker(&closing, epsilon);
    if tail.len() > 2 {
        ring.extend_from_slice(&tail[1..tail.len() - 1]);
    }

    // Drop seam vertices lying on the line between their neighbours
    let mut i = 0;
    while ring.len() > 3 && i < ring.len() {
        let n = ring.len();
        let prev = ring[(i + n - 1) % n];
        let next = ring[(i + 1) % n];
        if perpendicular_distance(&ring[i], &prev, &next) <= epsilon {
            ring.remove(i);
        } else {
            i += 1;
        }
    }
    ring
}

fn ring_length(points: &[Point2D]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.distance_to(b))
        .sum()
}

/// Advisory room type from size (square units) and proportions
pub fn guess_label(area_units: f64, aspect_ratio: f64, confidence: f32) -> RoomLabel {
    let text = if area_units < 50.0 {
        "closet"
    } else if area_units < 100.0 {
        if aspect_ratio > 1.5 || aspect_ratio < 0.67 {
            "hallway"
        } else {
            "bathroom"
        }
    } else if area_units < 150.0 {
        "bedroom"
    } else if area_units < 250.0 {
        if aspect_ratio > 1.3 {
            "kitchen"
        } else {
            "bedroom"
        }
    } else {
        "living_room"
    };
    RoomLabel {
        text: text.to_string(),
        source: LabelSource::SizeGuess,
        confidence,
    }
}

/// Whether a wall bounds the room: an endpoint near a polygon vertex, or a
/// polygon vertex alongside the wall
fn wall_bounds_room(wall: &WallSegment, room: &Room, tolerance: f64) -> bool {
    room.polygon.iter().any(|v| {
        wall.endpoints().iter().any(|p| p.distance_to(v) <= tolerance)
            || point_near_wall_body(v, wall, tolerance)
    })
}

fn support_confidence(rectangularity: f64, wall_count: usize) -> f32 {
    let support = (wall_count as f64 / 4.0).min(1.0);
    (0.5 * rectangularity.clamp(0.0, 1.0) + 0.5 * support) as f32
}

/// Recompute each room's wall list (and the wall-support part of its confidence)
pub fn associate_walls(rooms: &mut [Room], walls: &[WallSegment], t: &RoomThresholds) {
    for room in rooms.iter_mut() {
        room.wall_ids = walls
            .iter()
            .filter(|w| wall_bounds_room(w, room, t.wall_vertex_tolerance))
            .map(|w| w.id)
            .collect();
        let box_area = (room.bounding_box.width() + 1.0) * (room.bounding_box.height() + 1.0);
        let rectangularity = if box_area > 0.0 { room.area / box_area } else { 0.0 };
        room.confidence = support_confidence(rectangularity, room.wall_ids.len());
    }
}

/// Replace size guesses with external labels anchored inside a room
pub fn apply_labels(rooms: &mut [Room], labels: &[TextLabel], t: &RoomThresholds) {
    for label in labels {
        if let Some(room) = rooms.iter_mut().find(|r| r.contains(&label.position)) {
            room.label = Some(RoomLabel {
                text: label.text.clone(),
                source: LabelSource::External,
                confidence: t.external_label_confidence,
            });
        }
    }
}

/// Detect rooms enclosed by `walls` on a `width` x `height` image
///
/// `scale` (units per pixel) only feeds the size-based label guess.
pub fn detect_rooms(
    walls: &[WallSegment],
    width: u32,
    height: u32,
    scale: f64,
    t: &RoomThresholds,
) -> Vec<Room> {
    if walls.is_empty() || width < 3 || height < 3 {
        return Vec::new();
    }

    let open = rasterize_walls(walls, width, height);
    let labels = connected_components(&open, Connectivity::Four, Luma([WALL]));
    let max_area = t.max_area_ratio * width as f64 * height as f64;

    let mut rooms = Vec::new();
    for c in component_stats(&labels) {
        let area = c.area as f64;
        if c.touches_border || area < t.min_area || area > max_area {
            continue;
        }

        let contour = trace_boundary(&labels, &c);
        if contour.len() < 3 {
            continue;
        }
        let epsilon = t.epsilon_ratio * ring_length(&contour);
        let polygon = simplify_closed(&contour, epsilon);

        let bounding_box = BoundingBox {
            min_x: c.min_x as f64,
            min_y: c.min_y as f64,
            max_x: c.max_x as f64,
            max_y: c.max_y as f64,
        };
        let aspect = (bounding_box.width() + 1.0) / (bounding_box.height() + 1.0);
        let label = guess_label(area * scale * scale, aspect, t.guess_confidence);

        rooms.push(Room {
            id: rooms.len(),
            label: Some(label),
            polygon,
            area,
            perimeter: c.boundary as f64,
            centroid: Point2D::new(c.sum_x / area, c.sum_y / area),
            bounding_box,
            wall_ids: Vec::new(),
            opening_ids: Vec::new(),
            confidence: 0.0,
        });
    }
    associate_walls(&mut rooms, walls, t);

    tracing::debug!(rooms = rooms.len(), walls = walls.len(), "Rooms detected");
    rooms
}
