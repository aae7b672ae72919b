//! Sketch geometry and the sketch command vocabulary.
//!
//! A [`Path`] is one continuous pointer gesture. A [`Region`] wraps the paths
//! of one incremental edit in an inclusive bounding box; it is the unit of
//! sketch synchronization. A [`Sketch`] is a persisted drawing whose raster
//! is never stored: it is the replay of its regions, in receipt order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// Integer canvas coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An ordered sequence of points plus stroke metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    /// At least one point, in drawing order.
    pub points: Vec<Point>,
    /// `true` draws ink, `false` erases.
    pub is_drawing: bool,
    /// Brush size in canvas pixels; always positive.
    pub stroke_width: u32,
}

impl Path {
    /// Begin a path at `start`.
    #[must_use]
    pub fn new(start: Point, is_drawing: bool, stroke_width: u32) -> Self {
        Self { points: vec![start], is_drawing, stroke_width }
    }

    /// The same stroke with draw/erase swapped. Undo is expressed as this.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self { points: self.points.clone(), is_drawing: !self.is_drawing, stroke_width: self.stroke_width }
    }

    #[must_use]
    pub fn last_point(&self) -> Option<Point> {
        self.points.last().copied()
    }

    /// A path becomes a stroke once the pointer has moved at least once.
    #[must_use]
    pub fn is_stroke(&self) -> bool {
        self.points.len() >= 2
    }

    pub(crate) fn validate(&self) -> Result<(), SchemaError> {
        if self.points.is_empty() {
            return Err(SchemaError::EmptyPath);
        }
        if self.stroke_width == 0 {
            return Err(SchemaError::ZeroStrokeWidth);
        }
        Ok(())
    }
}

/// A bounding box (inclusive, stroke margin included) and the paths inside it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub start: Point,
    pub end: Point,
    pub paths: Vec<Path>,
}

impl Region {
    pub(crate) fn validate(&self) -> Result<(), SchemaError> {
        if self.start.x > self.end.x || self.start.y > self.end.y {
            return Err(SchemaError::InvertedRegion);
        }
        if self.paths.is_empty() {
            return Err(SchemaError::EmptyRegion);
        }
        self.paths.iter().try_for_each(Path::validate)
    }
}

/// A persisted drawing surface shared by one channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sketch {
    pub id: String,
    pub channel_name: String,
    pub display_name: String,
    pub width: u32,
    pub height: u32,
    pub created_by: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Applied regions keyed by region id, in receipt order.
    ///
    /// Region ids cross the key-case conversion like field names, so they
    /// must be lowercase kebab-case or UUIDs: `region_a` is re-sent as `regionA`.
    #[serde(default)]
    pub regions: IndexMap<String, Region>,
}

impl Sketch {
    /// Every applied path, in replay order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.regions.values().flat_map(|region| region.paths.iter())
    }

    pub(crate) fn validate(&self) -> Result<(), SchemaError> {
        if self.id.is_empty() {
            return Err(SchemaError::MissingSketchId);
        }
        self.regions.values().try_for_each(Region::validate)
    }
}

/// Discriminator of a [`SketchCommand`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    New,
    Update,
    Clear,
    Delete,
}

/// Content of a `SKETCH` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SketchCommand {
    pub command_type: CommandType,
    pub sketch_id: String,
    /// Present on `Update` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    /// `Some(true)` while the stroke is still being drawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_partial: Option<bool>,
    /// Present on `New` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sketch_data: Option<Sketch>,
}

impl SketchCommand {
    /// Announce a freshly created sketch.
    #[must_use]
    pub fn new_sketch(sketch: Sketch) -> Self {
        Self {
            command_type: CommandType::New,
            sketch_id: sketch.id.clone(),
            region: None,
            is_partial: None,
            sketch_data: Some(sketch),
        }
    }

    /// Partial or complete drawing update for one region.
    #[must_use]
    pub fn update(sketch_id: impl Into<String>, region: Region, is_partial: bool) -> Self {
        Self {
            command_type: CommandType::Update,
            sketch_id: sketch_id.into(),
            region: Some(region),
            is_partial: Some(is_partial),
            sketch_data: None,
        }
    }

    #[must_use]
    pub fn clear(sketch_id: impl Into<String>) -> Self {
        Self::bare(CommandType::Clear, sketch_id.into())
    }

    #[must_use]
    pub fn delete(sketch_id: impl Into<String>) -> Self {
        Self::bare(CommandType::Delete, sketch_id.into())
    }

    fn bare(command_type: CommandType, sketch_id: String) -> Self {
        Self { command_type, sketch_id, region: None, is_partial: None, sketch_data: None }
    }

    /// Whether this update belongs to a stroke still in progress.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.is_partial.unwrap_or(false)
    }

    /// Check the per-command shape rules serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.sketch_id.is_empty() {
            return Err(SchemaError::MissingSketchId);
        }
        match (self.command_type, &self.region) {
            (CommandType::Update, None) => return Err(SchemaError::MissingRegion),
            (CommandType::Update, Some(region)) => region.validate()?,
            (other, Some(_)) => return Err(SchemaError::UnexpectedRegion(other)),
            (_, None) => {}
        }
        if self.command_type == CommandType::New {
            let Some(sketch) = &self.sketch_data else {
                return Err(SchemaError::MissingSketchData);
            };
            if sketch.id != self.sketch_id {
                return Err(SchemaError::SketchIdMismatch {
                    expected: self.sketch_id.clone(),
                    found: sketch.id.clone(),
                });
            }
            sketch.validate()?;
        }
        Ok(())
    }
}
