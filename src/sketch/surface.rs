//! Rendering target for sketch paths.

#[cfg(test)]
#[path = "surface_test.rs"]
mod surface_test;

use envelopes::{Path, Point};

/// Anything paths can be replayed onto.
pub trait Surface {
    /// Draw (or erase, for `is_drawing == false`) one path.
    fn render_path(&mut self, path: &Path);
    /// Wipe the whole surface.
    fn clear(&mut self);
}

/// In-memory ink grid. Draw sets pixels, erase clears them, the brush is a
/// square of the stroke width centred on each point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    ink: Vec<bool>,
}

impl Raster {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, ink: vec![false; width as usize * height as usize] }
    }

    /// A raster with `paths` replayed in order.
    #[must_use]
    pub fn replay<'a>(width: u32, height: u32, paths: impl IntoIterator<Item = &'a Path>) -> Self {
        let mut raster = Self::new(width, height);
        for path in paths {
            raster.render_path(path);
        }
        raster
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the pixel at (`x`, `y`) holds ink. Out-of-bounds is blank.
    #[must_use]
    pub fn is_inked(&self, x: i32, y: i32) -> bool {
        self.index(x, y).is_some_and(|i| self.ink[i])
    }

    /// Number of inked pixels.
    #[must_use]
    pub fn inked(&self) -> usize {
        self.ink.iter().filter(|cell| **cell).count()
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x.unsigned_abs(), y.unsigned_abs());
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Pull a point to within one brush of the grid so segments thrown far
    /// off-canvas stay cheap to walk.
    fn confine(&self, point: Point, stroke_width: u32) -> Point {
        let reach = i32::try_from(stroke_width.min(self.width.max(self.height))).unwrap_or(i32::MAX);
        let span = |size: u32| i32::try_from(size).unwrap_or(i32::MAX).saturating_add(reach);
        Point::new(point.x.clamp(-reach, span(self.width)), point.y.clamp(-reach, span(self.height)))
    }

    fn stamp(&mut self, center: Point, stroke_width: u32, ink: bool) {
        let brush = i32::try_from(stroke_width.max(1)).unwrap_or(i32::MAX);
        let (lo, hi) = (-((brush - 1) / 2), brush / 2);
        let x_max = i32::try_from(self.width).unwrap_or(i32::MAX) - 1;
        let y_max = i32::try_from(self.height).unwrap_or(i32::MAX) - 1;
        let (x0, x1) = (center.x.saturating_add(lo).max(0), center.x.saturating_add(hi).min(x_max));
        let (y0, y1) = (center.y.saturating_add(lo).max(0), center.y.saturating_add(hi).min(y_max));
        for y in y0..=y1 {
            for x in x0..=x1 {
                if let Some(i) = self.index(x, y) {
                    self.ink[i] = ink;
                }
            }
        }
    }

    fn line(&mut self, from: Point, to: Point, stroke_width: u32, ink: bool) {
        let (from, to) = (self.confine(from, stroke_width), self.confine(to, stroke_width));
        // Bresenham over every octant.
        let (dx, dy) = ((to.x - from.x).abs(), -(to.y - from.y).abs());
        let (sx, sy) = (if from.x < to.x { 1 } else { -1 }, if from.y < to.y { 1 } else { -1 });
        let (mut x, mut y, mut err) = (from.x, from.y, dx + dy);
        loop {
            self.stamp(Point::new(x, y), stroke_width, ink);
            if x == to.x && y == to.y {
                break;
            }
            let doubled = 2 * err;
            if doubled >= dy {
                err += dy;
                x += sx;
            }
            if doubled <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

impl Surface for Raster {
    fn render_path(&mut self, path: &Path) {
        match path.points.as_slice() {
            [] => {}
            [only] => self.stamp(*only, path.stroke_width, path.is_drawing),
            points => {
                for pair in points.windows(2) {
                    self.line(pair[0], pair[1], path.stroke_width, path.is_drawing);
                }
            }
        }
    }

    fn clear(&mut self) {
        self.ink.fill(false);
    }
}
