//! Local drawing state for the active sketch.
//!
//! DESIGN
//! ======
//! - `existing_paths`: everything received from the server or peers, in
//!   receipt order.
//! - `paths`: strokes this client applied locally, including undo
//!   inversions and redos.
//! - `pending_paths`: completed local strokes whose final update could not
//!   be handed to the transport. They are kept for inspection and are not
//!   replayed on reconnect.
//! - `history`: the undo/redo stacks. Undo pops the last applied stroke and
//!   yields its inversion; redo re-applies it.

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;

use envelopes::{Path, Point};

/// Undo/redo stacks over completed local strokes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    undo: Vec<Path>,
    redo: Vec<Path>,
}

impl History {
    /// Record a new stroke. Clears the redo stack.
    pub fn record(&mut self, path: Path) {
        self.undo.push(path);
        self.redo.clear();
    }

    /// Move the last applied stroke to the redo stack and return it.
    pub fn undo(&mut self) -> Option<Path> {
        let path = self.undo.pop()?;
        self.redo.push(path.clone());
        Some(path)
    }

    /// Move the last undone stroke back and return it.
    pub fn redo(&mut self) -> Option<Path> {
        let path = self.redo.pop()?;
        self.undo.push(path.clone());
        Some(path)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Strokes currently in effect, oldest first.
    #[must_use]
    pub fn applied(&self) -> &[Path] {
        &self.undo
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalSketchState {
    existing_paths: Vec<Path>,
    paths: Vec<Path>,
    pending_paths: Vec<Path>,
    current: Option<Path>,
    history: History,
}

impl LocalSketchState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything, e.g. on sketch switch.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Seed from a freshly selected sketch.
    pub fn load(&mut self, paths: impl IntoIterator<Item = Path>) {
        self.reset();
        self.existing_paths.extend(paths);
    }

    pub fn append_existing(&mut self, paths: &[Path]) {
        self.existing_paths.extend_from_slice(paths);
    }

    /// Start a new in-progress path, replacing any unfinished one.
    pub fn begin(&mut self, start: Point, is_drawing: bool, stroke_width: u32) {
        self.current = Some(Path::new(start, is_drawing, stroke_width));
    }

    /// Append `point` to the in-progress path and return the new segment as
    /// a two-point path for immediate rendering.
    pub fn extend(&mut self, point: Point) -> Option<Path> {
        let current = self.current.as_mut()?;
        let previous = current.last_point()?;
        current.points.push(point);
        Some(Path { points: vec![previous, point], is_drawing: current.is_drawing, stroke_width: current.stroke_width })
    }

    /// End the in-progress path. Single-point paths are discarded.
    pub fn finish(&mut self) -> Option<Path> {
        self.current.take().filter(Path::is_stroke)
    }

    /// Apply a completed local stroke and make it undoable.
    pub fn commit(&mut self, path: Path) {
        self.paths.push(path.clone());
        self.history.record(path);
    }

    pub fn mark_pending(&mut self, path: Path) {
        self.pending_paths.push(path);
    }

    /// Undo the last stroke; returns the inversion to render and broadcast.
    pub fn undo(&mut self) -> Option<Path> {
        let inverted = self.history.undo()?.inverted();
        self.paths.push(inverted.clone());
        Some(inverted)
    }

    /// Redo the last undone stroke; returns it for rendering and broadcast.
    pub fn redo(&mut self) -> Option<Path> {
        let path = self.history.redo()?;
        self.paths.push(path.clone());
        Some(path)
    }

    #[must_use]
    pub fn existing_paths(&self) -> &[Path] {
        &self.existing_paths
    }

    #[must_use]
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    #[must_use]
    pub fn pending_paths(&self) -> &[Path] {
        &self.pending_paths
    }

    #[must_use]
    pub fn current(&self) -> Option<&Path> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.current.is_some()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }
}
