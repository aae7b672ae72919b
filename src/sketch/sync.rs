//! Sketch synchronization for one (channel, sketch) pair.
//!
//! SYSTEM CONTEXT
//! ==============
//! Local pointer gestures become `SKETCH` updates on the channel socket, and
//! updates from peers become redraws on the local [`Surface`]. The protocol
//! registers itself with the [`ConnectionManager`] under a fixed handler key
//! and owns the local drawing state for whichever sketch is active.
//!
//! ORDERING
//! ========
//! Remote envelopes pass through a FIFO inbox guarded by an in-flight flag.
//! An envelope that arrives while another is being applied (for example from
//! inside a surface callback) waits until the current one is fully applied.
//!
//! LIMITATIONS
//! ===========
//! - Local edits render first and are broadcast afterwards; there is no
//!   server acknowledgement and no rollback.
//! - Edits made while the channel socket is down are not submitted. Their
//!   final path is kept in `pending_paths` but never replayed.
//! - Undo and redo are broadcast as ordinary updates (an erase of the
//!   stroke, then a redraw). This converges for a single active drawer only;
//!   concurrent drawers undoing over each other is undefined.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use envelopes::{CommandType, Content, Envelope, Path, Point, Region, Sketch, SketchCommand};
use tracing::{debug, info, trace, warn};

use super::region::{Canvas, region_for_path};
use super::state::LocalSketchState;
use super::surface::Surface;
use super::throttle::Throttle;
use crate::net::{ConnectionManager, ConnectionScope, HandlerSet};
use crate::timers::Timers;

/// Handler key under which the protocol registers on the channel scope.
pub const HANDLER_KEY: &str = "sketch";

#[derive(Clone, Debug, PartialEq, Eq)]
struct ActiveSketch {
    id: String,
    canvas: Canvas,
}

struct SyncInner {
    channel_name: Option<String>,
    sketches: Vec<Sketch>,
    active: Option<ActiveSketch>,
    local: LocalSketchState,
    throttle: Throttle<Region>,
}

impl SyncInner {
    fn envelope(&self, username: &str, command: SketchCommand) -> Option<Envelope> {
        let channel = self.channel_name.as_ref()?;
        Some(Envelope::new(channel.clone(), username, Content::Sketch(command)))
    }

    fn is_active(&self, sketch_id: &str) -> bool {
        self.active.as_ref().is_some_and(|active| active.id == sketch_id)
    }
}

struct SyncShared {
    manager: ConnectionManager,
    timers: Rc<dyn Timers>,
    username: String,
    inner: RefCell<SyncInner>,
    surface: RefCell<Box<dyn Surface>>,
    inbox: RefCell<VecDeque<Envelope>>,
    applying: Cell<bool>,
}

/// What a remote command asks the surface to do once state is updated.
enum Redraw {
    Nothing,
    Paths(Vec<Path>),
    Clear,
}

/// Handle to the protocol instance. Clones share state.
#[derive(Clone)]
pub struct SketchSync {
    shared: Rc<SyncShared>,
}

impl SketchSync {
    /// Create the protocol and register it on the channel scope.
    #[must_use]
    pub fn new(
        manager: ConnectionManager,
        timers: Rc<dyn Timers>,
        username: &str,
        throttle_window: Duration,
        surface: Box<dyn Surface>,
    ) -> Self {
        let sync = Self {
            shared: Rc::new(SyncShared {
                manager,
                timers,
                username: username.to_owned(),
                inner: RefCell::new(SyncInner {
                    channel_name: None,
                    sketches: Vec::new(),
                    active: None,
                    local: LocalSketchState::new(),
                    throttle: Throttle::new(throttle_window),
                }),
                surface: RefCell::new(surface),
                inbox: RefCell::new(VecDeque::new()),
                applying: Cell::new(false),
            }),
        };
        sync.attach();
        sync
    }

    fn from_weak(weak: &Weak<SyncShared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    fn attach(&self) {
        let weak = Rc::downgrade(&self.shared);
        let handlers = HandlerSet::new().on_sketch(move |envelope, _| {
            if let Some(sync) = Self::from_weak(&weak) {
                sync.receive(envelope.clone());
            }
        });
        self.shared.manager.add_handlers(ConnectionScope::Channel, HANDLER_KEY, handlers);
    }

    /// Cancel any pending partial send and unregister from the manager.
    pub fn teardown(&self) {
        self.cancel_throttle();
        self.shared.manager.remove_handlers(ConnectionScope::Channel, HANDLER_KEY);
    }

    // =========================================================================
    // BINDING
    // =========================================================================

    /// Bind to `channel_name`. Switching channels forgets every sketch.
    pub fn bind_channel(&self, channel_name: &str) {
        if self.shared.inner.borrow().channel_name.as_deref() == Some(channel_name) {
            return;
        }
        self.reset(Some(channel_name.to_owned()));
    }

    pub fn unbind(&self) {
        self.reset(None);
    }

    fn reset(&self, channel_name: Option<String>) {
        self.cancel_throttle();
        {
            let mut inner = self.shared.inner.borrow_mut();
            inner.channel_name = channel_name;
            inner.sketches.clear();
            inner.active = None;
            inner.local.reset();
        }
        self.shared.inbox.borrow_mut().clear();
        self.shared.surface.borrow_mut().clear();
    }

    /// Replace the known sketch list, e.g. after an HTTP listing.
    ///
    /// The active sketch stays selected only if it is still listed.
    pub fn set_sketches(&self, sketches: Vec<Sketch>) {
        let still_active = {
            let mut inner = self.shared.inner.borrow_mut();
            inner.sketches = sketches;
            inner.active.as_ref().is_none_or(|a| inner.sketches.iter().any(|s| s.id == a.id))
        };
        if !still_active {
            self.deselect();
        }
    }

    /// Make `sketch` active: reset local state and replay its regions.
    pub fn select_sketch(&self, sketch: Sketch) {
        self.cancel_throttle();
        let replay: Vec<Path> = sketch.paths().cloned().collect();
        {
            let mut inner = self.shared.inner.borrow_mut();
            inner.active = Some(ActiveSketch { id: sketch.id.clone(), canvas: Canvas::new(sketch.width, sketch.height) });
            inner.local.load(replay.iter().cloned());
            upsert(&mut inner.sketches, sketch);
        }
        self.shared.inbox.borrow_mut().clear();
        let mut surface = self.shared.surface.borrow_mut();
        surface.clear();
        for path in &replay {
            surface.render_path(path);
        }
    }

    pub fn deselect(&self) {
        self.cancel_throttle();
        {
            let mut inner = self.shared.inner.borrow_mut();
            inner.active = None;
            inner.local.reset();
        }
        self.shared.surface.borrow_mut().clear();
    }

    // =========================================================================
    // LOCAL DRAWING
    // =========================================================================

    /// Begin buffering a path. Nothing renders or sends until the pointer moves.
    pub fn start_path(&self, point: Point, is_drawing_tool: bool, stroke_width: u32) {
        self.cancel_throttle();
        self.shared.inner.borrow_mut().local.begin(point, is_drawing_tool, stroke_width.max(1));
    }

    /// Extend the path, render the new segment, and schedule a partial update.
    pub fn continue_path(&self, point: Point) {
        let (segment, arm) = {
            let mut guard = self.shared.inner.borrow_mut();
            let inner = &mut *guard;
            let Some(segment) = inner.local.extend(point) else {
                return;
            };
            let arm = match (&inner.active, inner.local.current()) {
                (Some(active), Some(path)) => inner.throttle.offer(region_for_path(path, Some(active.canvas))),
                _ => false,
            };
            (segment, arm)
        };
        self.shared.surface.borrow_mut().render_path(&segment);
        if arm {
            self.arm_throttle();
        }
    }

    /// Finish the path: send one final update and make it undoable.
    ///
    /// Single-point paths and paths drawn with no active sketch are dropped.
    pub fn complete_path(&self) {
        self.cancel_throttle();
        let (path, envelope) = {
            let mut guard = self.shared.inner.borrow_mut();
            let inner = &mut *guard;
            let Some(path) = inner.local.finish() else {
                trace!("discarding single-point path");
                return;
            };
            let Some(active) = inner.active.clone() else {
                debug!("no active sketch; discarding path");
                return;
            };
            let command = SketchCommand::update(active.id, region_for_path(&path, Some(active.canvas)), false);
            let envelope = inner.envelope(&self.shared.username, command);
            inner.local.commit(path.clone());
            (path, envelope)
        };
        self.transmit(path, envelope);
    }

    /// Erase the last stroke and broadcast the erasure.
    pub fn undo(&self) {
        let Some((path, envelope)) = self.step(LocalSketchState::undo) else {
            return;
        };
        self.shared.surface.borrow_mut().render_path(&path);
        self.transmit(path, envelope);
    }

    /// Redraw the last undone stroke and broadcast it.
    pub fn redo(&self) {
        let Some((path, envelope)) = self.step(LocalSketchState::redo) else {
            return;
        };
        self.shared.surface.borrow_mut().render_path(&path);
        self.transmit(path, envelope);
    }

    fn step(&self, op: fn(&mut LocalSketchState) -> Option<Path>) -> Option<(Path, Option<Envelope>)> {
        let mut guard = self.shared.inner.borrow_mut();
        let inner = &mut *guard;
        let active = inner.active.clone()?;
        let path = op(&mut inner.local)?;
        let command = SketchCommand::update(active.id, region_for_path(&path, Some(active.canvas)), false);
        let envelope = inner.envelope(&self.shared.username, command);
        Some((path, envelope))
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        let inner = self.shared.inner.borrow();
        inner.active.is_some() && inner.local.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        let inner = self.shared.inner.borrow();
        inner.active.is_some() && inner.local.can_redo()
    }

    fn transmit(&self, path: Path, envelope: Option<Envelope>) {
        let delivered = envelope.is_some_and(|envelope| self.shared.manager.send(&envelope));
        if !delivered {
            warn!(points = path.points.len(), "sketch update not submitted; keeping path as pending");
            self.shared.inner.borrow_mut().local.mark_pending(path);
        }
    }

    fn arm_throttle(&self) {
        let window = self.shared.inner.borrow().throttle.window();
        let weak = Rc::downgrade(&self.shared);
        let timer = self.shared.timers.set_timeout(
            window,
            Box::new(move || {
                if let Some(sync) = Self::from_weak(&weak) {
                    sync.flush_partial();
                }
            }),
        );
        self.shared.inner.borrow_mut().throttle.armed(timer);
    }

    fn flush_partial(&self) {
        let envelope = {
            let mut guard = self.shared.inner.borrow_mut();
            let inner = &mut *guard;
            let Some(region) = inner.throttle.fire() else {
                return;
            };
            let Some(active) = inner.active.as_ref() else {
                return;
            };
            inner.envelope(&self.shared.username, SketchCommand::update(active.id.clone(), region, true))
        };
        let sent = envelope.is_some_and(|envelope| self.shared.manager.send(&envelope));
        if !sent {
            debug!("partial sketch update dropped");
        }
    }

    fn cancel_throttle(&self) {
        let timer = self.shared.inner.borrow_mut().throttle.cancel();
        if let Some(timer) = timer {
            self.shared.timers.clear_timeout(timer);
        }
    }

    // =========================================================================
    // SKETCH LIFECYCLE BROADCASTS
    // =========================================================================

    /// Wipe the active sketch locally and tell peers to do the same.
    pub fn clear_sketch(&self) {
        self.cancel_throttle();
        let envelope = {
            let mut inner = self.shared.inner.borrow_mut();
            let Some(active) = inner.active.clone() else {
                return;
            };
            inner.local.reset();
            clear_regions(&mut inner.sketches, &active.id);
            inner.envelope(&self.shared.username, SketchCommand::clear(active.id))
        };
        self.shared.surface.borrow_mut().clear();
        self.broadcast(envelope);
    }

    /// Record a sketch created through the HTTP API and announce it.
    pub fn announce_created(&self, sketch: Sketch) {
        let envelope = {
            let mut inner = self.shared.inner.borrow_mut();
            upsert(&mut inner.sketches, sketch.clone());
            inner.envelope(&self.shared.username, SketchCommand::new_sketch(sketch))
        };
        self.broadcast(envelope);
    }

    /// Forget a sketch deleted through the HTTP API and announce it.
    pub fn announce_deleted(&self, sketch_id: &str) {
        let (was_active, envelope) = {
            let mut inner = self.shared.inner.borrow_mut();
            inner.sketches.retain(|s| s.id != sketch_id);
            (inner.is_active(sketch_id), inner.envelope(&self.shared.username, SketchCommand::delete(sketch_id)))
        };
        if was_active {
            self.deselect();
        }
        self.broadcast(envelope);
    }

    fn broadcast(&self, envelope: Option<Envelope>) {
        let sent = envelope.is_some_and(|envelope| self.shared.manager.send(&envelope));
        if !sent {
            warn!("sketch lifecycle command not submitted");
        }
    }

    // =========================================================================
    // REMOTE RECEIPT
    // =========================================================================

    /// Queue an incoming envelope and apply queued envelopes in arrival order.
    pub fn receive(&self, envelope: Envelope) {
        self.shared.inbox.borrow_mut().push_back(envelope);
        if self.shared.applying.replace(true) {
            trace!("apply in flight; envelope queued");
            return;
        }
        loop {
            let next = self.shared.inbox.borrow_mut().pop_front();
            let Some(envelope) = next else {
                break;
            };
            self.apply(&envelope);
        }
        self.shared.applying.set(false);
    }

    fn apply(&self, envelope: &Envelope) {
        let Content::Sketch(command) = &envelope.content else {
            return;
        };
        if envelope.username == self.shared.username {
            trace!(sketch = %command.sketch_id, "ignoring echo of own update");
            return;
        }

        let redraw = {
            let mut guard = self.shared.inner.borrow_mut();
            let inner = &mut *guard;
            match command.command_type {
                CommandType::Update => match &command.region {
                    Some(region) if inner.is_active(&command.sketch_id) => {
                        inner.local.append_existing(&region.paths);
                        Redraw::Paths(region.paths.clone())
                    }
                    _ => {
                        trace!(sketch = %command.sketch_id, "update for inactive sketch ignored");
                        Redraw::Nothing
                    }
                },
                CommandType::Clear => {
                    clear_regions(&mut inner.sketches, &command.sketch_id);
                    if inner.is_active(&command.sketch_id) {
                        if let Some(timer) = inner.throttle.cancel() {
                            self.shared.timers.clear_timeout(timer);
                        }
                        inner.local.reset();
                        info!(sketch = %command.sketch_id, by = %envelope.username, "sketch cleared");
                        Redraw::Clear
                    } else {
                        Redraw::Nothing
                    }
                }
                CommandType::Delete => {
                    inner.sketches.retain(|s| s.id != command.sketch_id);
                    if inner.is_active(&command.sketch_id) {
                        if let Some(timer) = inner.throttle.cancel() {
                            self.shared.timers.clear_timeout(timer);
                        }
                        inner.active = None;
                        inner.local.reset();
                        info!(sketch = %command.sketch_id, by = %envelope.username, "active sketch deleted");
                        Redraw::Clear
                    } else {
                        Redraw::Nothing
                    }
                }
                CommandType::New => {
                    if let Some(sketch) = &command.sketch_data {
                        if !inner.sketches.iter().any(|s| s.id == sketch.id) {
                            inner.sketches.push(sketch.clone());
                        }
                    }
                    Redraw::Nothing
                }
            }
        };

        match redraw {
            Redraw::Nothing => {}
            Redraw::Paths(paths) => {
                let mut surface = self.shared.surface.borrow_mut();
                for path in &paths {
                    surface.render_path(path);
                }
            }
            Redraw::Clear => self.shared.surface.borrow_mut().clear(),
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    #[must_use]
    pub fn username(&self) -> &str {
        &self.shared.username
    }

    #[must_use]
    pub fn channel_name(&self) -> Option<String> {
        self.shared.inner.borrow().channel_name.clone()
    }

    #[must_use]
    pub fn active_sketch_id(&self) -> Option<String> {
        self.shared.inner.borrow().active.as_ref().map(|a| a.id.clone())
    }

    /// Sketches known in the bound channel, in arrival order.
    #[must_use]
    pub fn sketches(&self) -> Vec<Sketch> {
        self.shared.inner.borrow().sketches.clone()
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.shared.inner.borrow().local.is_drawing()
    }

    #[must_use]
    pub fn existing_paths(&self) -> Vec<Path> {
        self.shared.inner.borrow().local.existing_paths().to_vec()
    }

    #[must_use]
    pub fn paths(&self) -> Vec<Path> {
        self.shared.inner.borrow().local.paths().to_vec()
    }

    #[must_use]
    pub fn pending_paths(&self) -> Vec<Path> {
        self.shared.inner.borrow().local.pending_paths().to_vec()
    }

    /// Local strokes currently in effect (the undo stack), oldest first.
    #[must_use]
    pub fn applied_paths(&self) -> Vec<Path> {
        self.shared.inner.borrow().local.history().applied().to_vec()
    }
}

fn upsert(sketches: &mut Vec<Sketch>, sketch: Sketch) {
    match sketches.iter_mut().find(|s| s.id == sketch.id) {
        Some(slot) => *slot = sketch,
        None => sketches.push(sketch),
    }
}

fn clear_regions(sketches: &mut [Sketch], sketch_id: &str) {
    if let Some(sketch) = sketches.iter_mut().find(|s| s.id == sketch_id) {
        sketch.regions.clear();
    }
}
