//! Region derivation for outgoing drawing updates.

#[cfg(test)]
#[path = "region_test.rs"]
mod region_test;

use envelopes::{Path, Point, Region};

/// Pixel dimensions of the active sketch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn max_x(self) -> i32 {
        i32::try_from(self.width).unwrap_or(i32::MAX).saturating_sub(1)
    }

    fn max_y(self) -> i32 {
        i32::try_from(self.height).unwrap_or(i32::MAX).saturating_sub(1)
    }
}

/// Inclusive bounding box of `path`, grown by its stroke width and clamped
/// to the canvas. Always satisfies `start <= end` on both axes.
#[must_use]
pub fn bounds(path: &Path, canvas: Option<Canvas>) -> (Point, Point) {
    let Some(first) = path.points.first() else {
        return (Point::default(), Point::default());
    };
    let (min, max) = path.points.iter().fold((*first, *first), |(min, max), p| {
        (Point::new(min.x.min(p.x), min.y.min(p.y)), Point::new(max.x.max(p.x), max.y.max(p.y)))
    });

    let margin = i32::try_from(path.stroke_width).unwrap_or(i32::MAX);
    let mut end = Point::new(max.x.saturating_add(margin), max.y.saturating_add(margin));
    if let Some(canvas) = canvas {
        end.x = end.x.min(canvas.max_x());
        end.y = end.y.min(canvas.max_y());
    }
    // Paths entirely off-canvas collapse onto their clamped end.
    let start = Point::new(min.x.saturating_sub(margin).max(0).min(end.x), min.y.saturating_sub(margin).max(0).min(end.y));
    (start, end)
}

/// Wrap `path` in a single-path region sized by [`bounds`].
#[must_use]
pub fn region_for_path(path: &Path, canvas: Option<Canvas>) -> Region {
    let (start, end) = bounds(path, canvas);
    Region { start, end, paths: vec![path.clone()] }
}
