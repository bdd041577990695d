use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
use imageproc::morphology::dilate;
use imageproc::point::Point as DrawPoint;
use imageproc::rect::Rect as DrawRect;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::Polygon;

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;
/// Excluded from a marching pass entirely.
const FROZEN: u8 = 3;
const FAR: f32 = 1.0e6;

/// Largest neighborhood radius `erase_polygon` will use.
pub const MAX_INPAINT_RADIUS: u32 = 64;

/// Rasterizes `polygon` into a `width` x `height` mask (255 inside, edges
/// included). Points are clamped to the image first.
pub fn polygon_mask(width: u32, height: u32, polygon: &Polygon) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return mask;
    }
    let clamped = polygon.clamped(width, height);

    let mut points: Vec<DrawPoint<i32>> = Vec::with_capacity(4);
    for point in clamped.points() {
        let next = DrawPoint::new(point.x, point.y);
        if points.last() != Some(&next) {
            points.push(next);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    if points.len() >= 3 {
        draw_polygon_mut(&mut mask, &points, Luma([255]));
    } else {
        // Collapsed to a line or a point: fill its bounds.
        let rect = clamped.aabb();
        let draw = DrawRect::at(rect.x1, rect.y1)
            .of_size((rect.width() + 1) as u32, (rect.height() + 1) as u32);
        draw_filled_rect_mut(&mut mask, draw, Luma([255]));
    }
    mask
}

/// Erases the pixels under `polygon` by fast-marching inpainting with the
/// given neighborhood radius, clamped to `1..=MAX_INPAINT_RADIUS`.
pub fn erase_polygon(image: &mut RgbImage, polygon: &Polygon, radius: u32) {
    let mask = polygon_mask(image.width(), image.height(), polygon);
    inpaint(image, &mask, radius.clamp(1, MAX_INPAINT_RADIUS));
}

#[derive(Clone, Copy)]
struct Node {
    t: f32,
    idx: usize,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    // Reversed so `BinaryHeap` pops the smallest arrival time first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

/// Working window around the mask, large enough to hold every pixel the
/// weighting neighborhood can reach.
struct Field {
    x0: u32,
    y0: u32,
    w: usize,
    h: usize,
    flags: Vec<u8>,
    t: Vec<f32>,
    color: Vec<[f32; 3]>,
}

impl Field {
    /// 4-connected neighbors inside the window.
    fn neighbors(&self, idx: usize) -> impl Iterator<Item = usize> + use<> {
        let (x, y, w) = (idx % self.w, idx / self.w, self.w);
        [
            (x > 0).then(|| idx - 1),
            (x + 1 < w).then(|| idx + 1),
            (y > 0).then(|| idx - w),
            (y + 1 < self.h).then(|| idx + w),
        ]
        .into_iter()
        .flatten()
    }

    fn at(&self, x: isize, y: isize) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.w || y as usize >= self.h {
            return None;
        }
        Some(y as usize * self.w + x as usize)
    }

    /// Eikonal update from two orthogonal neighbors.
    fn solve(&self, a: Option<usize>, b: Option<usize>) -> f32 {
        let known = |idx: Option<usize>| idx.filter(|&i| self.flags[i] == KNOWN);
        match (known(a), known(b)) {
            (Some(a), Some(b)) => {
                let (ta, tb) = (self.t[a], self.t[b]);
                let r = (2.0 - (ta - tb) * (ta - tb)).max(0.0).sqrt();
                let s = (ta + tb - r) / 2.0;
                if s >= ta && s >= tb {
                    s
                } else if s + r >= ta && s + r >= tb {
                    s + r
                } else {
                    FAR
                }
            }
            (Some(a), None) => 1.0 + self.t[a],
            (None, Some(b)) => 1.0 + self.t[b],
            (None, None) => FAR,
        }
    }

    fn arrival(&self, idx: usize) -> f32 {
        let (x, y) = ((idx % self.w) as isize, (idx / self.w) as isize);
        let left = self.at(x - 1, y);
        let right = self.at(x + 1, y);
        let up = self.at(x, y - 1);
        let down = self.at(x, y + 1);
        self.solve(up, left)
            .min(self.solve(down, left))
            .min(self.solve(up, right))
            .min(self.solve(down, right))
    }

    /// Central difference of `value` at `idx`, one-sided where a neighbor is
    /// still unfilled.
    fn gradient<F: Fn(usize) -> f32>(&self, idx: usize, value: F) -> (f32, f32) {
        let (x, y) = ((idx % self.w) as isize, (idx / self.w) as isize);
        let usable = |i: Option<usize>| i.filter(|&i| self.flags[i] != INSIDE);
        let axis = |lo: Option<usize>, hi: Option<usize>| match (usable(lo), usable(hi)) {
            (Some(lo), Some(hi)) => (value(hi) - value(lo)) * 0.5,
            (None, Some(hi)) => value(hi) - value(idx),
            (Some(lo), None) => value(idx) - value(lo),
            (None, None) => 0.0,
        };
        (
            axis(self.at(x - 1, y), self.at(x + 1, y)),
            axis(self.at(x, y - 1), self.at(x, y + 1)),
        )
    }

    /// Weighted average of already known pixels within `radius`.
    fn fill(&mut self, idx: usize, radius: u32) {
        let (px, py) = ((idx % self.w) as isize, (idx / self.w) as isize);
        let grad_t = self.gradient(idx, |i| self.t[i]);
        let r = radius as isize;
        let r2 = (radius as f32).powi(2);
        let mut sum = [0.0f32; 3];
        let mut total = 0.0f32;
        for ny in py - r..=py + r {
            for nx in px - r..=px + r {
                let Some(n) = self.at(nx, ny) else { continue };
                if n == idx || self.flags[n] == INSIDE {
                    continue;
                }
                let (dx, dy) = ((px - nx) as f32, (py - ny) as f32);
                let len2 = dx * dx + dy * dy;
                if len2 > r2 {
                    continue;
                }
                let dst = 1.0 / (len2 * len2.sqrt());
                let lev = 1.0 / (1.0 + (self.t[n] - self.t[idx]).abs());
                let mut dir = dx * grad_t.0 + dy * grad_t.1;
                if dir.abs() <= 0.01 {
                    dir = 1.0e-6;
                }
                let weight = (dst * lev * dir).abs();
                for (acc, channel) in sum.iter_mut().zip(self.color[n]) {
                    *acc += weight * channel;
                }
                total += weight;
            }
        }
        if total > 0.0 {
            self.color[idx] = sum.map(|acc| acc / total);
        }
    }

    fn march<F: FnMut(&mut Field, usize)>(&mut self, heap: &mut BinaryHeap<Node>, mut on_reach: F) {
        while let Some(Node { idx, .. }) = heap.pop() {
            self.flags[idx] = KNOWN;
            for n in self.neighbors(idx) {
                if self.flags[n] != INSIDE {
                    continue;
                }
                let t = self.arrival(n);
                self.t[n] = t;
                on_reach(self, n);
                self.flags[n] = BAND;
                heap.push(Node { t, idx: n });
            }
        }
    }
}

fn inpaint(image: &mut RgbImage, mask: &GrayImage, radius: u32) {
    let Some((min_x, min_y, max_x, max_y)) = mask_bounds(mask) else {
        return;
    };
    let margin = radius + 2;
    let x0 = min_x.saturating_sub(margin);
    let y0 = min_y.saturating_sub(margin);
    let x1 = (max_x + margin).min(image.width() - 1);
    let y1 = (max_y + margin).min(image.height() - 1);
    let (w, h) = ((x1 - x0 + 1) as usize, (y1 - y0 + 1) as usize);

    let mut inside = vec![false; w * h];
    let mut color = vec![[0.0f32; 3]; w * h];
    for y in 0..h {
        for x in 0..w {
            let (ix, iy) = (x0 + x as u32, y0 + y as u32);
            inside[y * w + x] = mask.get_pixel(ix, iy)[0] > 0;
            color[y * w + x] = image.get_pixel(ix, iy).0.map(f32::from);
        }
    }

    let mut field = Field {
        x0,
        y0,
        w,
        h,
        flags: vec![FROZEN; w * h],
        t: vec![FAR; w * h],
        color,
    };
    let band: Vec<usize> = (0..w * h)
        .filter(|&idx| !inside[idx] && field.neighbors(idx).any(|n| inside[n]))
        .collect();

    // Outward pass: signed distance for the known ring around the mask.
    let ring = chebyshev_ring(&inside, w, h, radius);
    for idx in 0..w * h {
        if !inside[idx] && ring[idx] {
            field.flags[idx] = INSIDE;
        }
    }
    let mut heap = BinaryHeap::new();
    for &idx in &band {
        field.flags[idx] = BAND;
        field.t[idx] = 0.0;
        heap.push(Node { t: 0.0, idx });
    }
    field.march(&mut heap, |_, _| {});
    let outside_t: Vec<f32> = field.t.clone();

    // Inward pass: fill the mask from its boundary.
    for idx in 0..w * h {
        if inside[idx] {
            field.flags[idx] = INSIDE;
            field.t[idx] = FAR;
        } else {
            field.flags[idx] = KNOWN;
            field.t[idx] = if outside_t[idx] < FAR { -outside_t[idx] } else { 0.0 };
        }
    }
    for &idx in &band {
        field.flags[idx] = BAND;
        field.t[idx] = 0.0;
        heap.push(Node { t: 0.0, idx });
    }
    field.march(&mut heap, |field, idx| field.fill(idx, radius));

    for (idx, filled) in inside.iter().enumerate() {
        if !filled {
            continue;
        }
        let (x, y) = (field.x0 + (idx % w) as u32, field.y0 + (idx / w) as u32);
        let rgb = field.color[idx].map(|c| c.round().clamp(0.0, 255.0) as u8);
        image.put_pixel(x, y, image::Rgb(rgb));
    }
}

fn mask_bounds(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((a, b, c, d)) => (a.min(x), b.min(y), c.max(x), d.max(y)),
        });
    }
    bounds
}

/// Pixels within `range` (Chebyshev distance) of the mask, mask included.
fn chebyshev_ring(inside: &[bool], w: usize, h: usize, range: u32) -> Vec<bool> {
    let window = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([if inside[y as usize * w + x as usize] { 255 } else { 0 }])
    });
    let range = range.min(u8::MAX as u32) as u8;
    dilate(&window, Norm::LInf, range)
        .pixels()
        .map(|pixel| pixel[0] > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::Rect;
    use image::Rgb;

    #[test]
    fn mask_covers_polygon_edges() {
        let polygon = Rect::new(5, 5, 15, 12).to_polygon();
        let mask = polygon_mask(30, 30, &polygon);
        assert_eq!(mask.get_pixel(5, 5)[0], 255);
        assert_eq!(mask.get_pixel(15, 12)[0], 255);
        assert_eq!(mask.get_pixel(10, 8)[0], 255);
        assert_eq!(mask.get_pixel(4, 5)[0], 0);
        assert_eq!(mask.get_pixel(16, 12)[0], 0);
        assert_eq!(mask.get_pixel(10, 13)[0], 0);
    }

    #[test]
    fn collapsed_polygon_still_masks_its_line() {
        let polygon = Rect::new(3, 7, 20, 7).to_polygon();
        let mask = polygon_mask(30, 30, &polygon);
        assert_eq!(mask.get_pixel(3, 7)[0], 255);
        assert_eq!(mask.get_pixel(20, 7)[0], 255);
        assert_eq!(mask.get_pixel(10, 8)[0], 0);
    }

    #[test]
    fn text_on_flat_background_is_erased() {
        let mut image = RgbImage::from_pixel(80, 60, Rgb([240, 230, 220]));
        for y in 25..35 {
            for x in 20..60 {
                if (x / 3) % 2 == 0 {
                    image.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
        let before = image.clone();
        erase_polygon(&mut image, &Rect::new(18, 23, 61, 36).to_polygon(), 5);
        for y in 23..=36 {
            for x in 18..=61 {
                let [r, g, b] = image.get_pixel(x, y).0;
                assert!(r.abs_diff(240) <= 2 && g.abs_diff(230) <= 2 && b.abs_diff(220) <= 2);
            }
        }
        assert_eq!(image.get_pixel(0, 0), before.get_pixel(0, 0));
        assert_eq!(image.get_pixel(17, 30), before.get_pixel(17, 30));
    }

    #[test]
    fn fill_follows_the_surrounding_split() {
        // Left half dark, right half light; the erased strip should keep the split.
        let mut image = RgbImage::from_fn(60, 40, |x, _| {
            if x < 30 { Rgb([20, 20, 20]) } else { Rgb([230, 230, 230]) }
        });
        for x in 5..55 {
            image.put_pixel(x, 20, Rgb([255, 0, 0]));
        }
        erase_polygon(&mut image, &Rect::new(5, 18, 54, 22).to_polygon(), 4);
        assert!(image.get_pixel(10, 20)[0] < 60);
        assert!(image.get_pixel(50, 20)[0] > 190);
    }

    #[test]
    fn mask_at_image_corner_does_not_panic() {
        let mut image = RgbImage::from_pixel(20, 20, Rgb([100, 100, 100]));
        image.put_pixel(0, 0, Rgb([0, 0, 0]));
        erase_polygon(&mut image, &Rect::new(-5, -5, 2, 2).to_polygon(), 15);
        assert_eq!(image.get_pixel(0, 0).0, [100, 100, 100]);
    }

    #[test]
    fn neighbors_stay_inside_the_window() {
        let field = Field {
            x0: 0,
            y0: 0,
            w: 3,
            h: 2,
            flags: vec![KNOWN; 6],
            t: vec![0.0; 6],
            color: vec![[0.0; 3]; 6],
        };
        assert_eq!(field.neighbors(0).collect::<Vec<_>>(), [1, 3]);
        assert_eq!(field.neighbors(4).collect::<Vec<_>>(), [3, 5, 1]);
        assert_eq!(field.neighbors(5).collect::<Vec<_>>(), [4, 2]);
    }

    #[test]
    fn ring_matches_chebyshev_distance() {
        let (w, h) = (9, 7);
        let mut inside = vec![false; w * h];
        inside[3 * w + 4] = true;
        let ring = chebyshev_ring(&inside, w, h, 2);
        assert!(ring[3 * w + 4]);
        assert!(ring[w + 2]);
        assert!(ring[5 * w + 6]);
        assert!(!ring[3 * w + 7]);
        assert!(!ring[3 * w + 1]);
        assert_eq!(ring.iter().filter(|&&v| v).count(), 25);
    }

    #[test]
    fn oversized_radius_is_clamped() {
        let mut image = RgbImage::from_pixel(40, 30, Rgb([90, 90, 90]));
        image.put_pixel(20, 15, Rgb([0, 0, 0]));
        erase_polygon(&mut image, &Rect::new(18, 13, 22, 17).to_polygon(), 70_000);
        assert_eq!(image.get_pixel(20, 15).0, [90, 90, 90]);
    }

    #[test]
    fn large_block_is_erased() {
        let mut image = RgbImage::from_pixel(320, 220, Rgb([250, 250, 250]));
        for y in (20..200).step_by(12) {
            for x in 20..300 {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        erase_polygon(&mut image, &Rect::new(10, 10, 309, 209).to_polygon(), 6);
        assert!(image.pixels().all(|pixel| pixel[0] > 200));
    }
}
