use super::*;

fn stroke(x: i32) -> Path {
    let mut path = Path::new(Point::new(x, 0), true, 2);
    path.points.push(Point::new(x, 10));
    path
}

#[test]
fn extend_yields_the_new_segment() {
    let mut state = LocalSketchState::new();
    assert_eq!(state.extend(Point::new(1, 1)), None);

    state.begin(Point::new(0, 0), false, 4);
    let segment = state.extend(Point::new(3, 4)).expect("segment");
    assert_eq!(segment.points, vec![Point::new(0, 0), Point::new(3, 4)]);
    assert!(!segment.is_drawing);
    assert_eq!(segment.stroke_width, 4);
    assert!(state.is_drawing());
}

#[test]
fn single_point_path_is_discarded() {
    let mut state = LocalSketchState::new();
    state.begin(Point::new(5, 5), true, 2);
    assert_eq!(state.finish(), None);
    assert!(!state.is_drawing());
    assert!(!state.can_undo());
}

#[test]
fn finish_returns_the_full_stroke() {
    let mut state = LocalSketchState::new();
    state.begin(Point::new(0, 0), true, 2);
    state.extend(Point::new(1, 0));
    state.extend(Point::new(2, 0));
    let path = state.finish().expect("stroke");
    assert_eq!(path.points.len(), 3);
}

#[test]
fn commit_clears_redo() {
    let mut state = LocalSketchState::new();
    state.commit(stroke(1));
    state.undo();
    assert!(state.can_redo());
    state.commit(stroke(2));
    assert!(!state.can_redo());
}

#[test]
fn undo_inverts_and_redo_reapplies() {
    let mut state = LocalSketchState::new();
    state.commit(stroke(1));

    let inverted = state.undo().expect("undo");
    assert!(!inverted.is_drawing);
    assert_eq!(inverted.points, stroke(1).points);

    let redone = state.redo().expect("redo");
    assert_eq!(redone, stroke(1));
    assert_eq!(state.paths(), &[stroke(1), stroke(1).inverted(), stroke(1)]);
}

#[test]
fn undo_then_redo_everything_restores_applied_strokes() {
    let mut state = LocalSketchState::new();
    for x in 0..4 {
        state.commit(stroke(x));
    }
    let before = state.history().applied().to_vec();

    for _ in 0..4 {
        assert!(state.undo().is_some());
    }
    assert!(!state.can_undo());
    assert!(state.undo().is_none());
    assert!(state.history().applied().is_empty());

    for _ in 0..4 {
        assert!(state.redo().is_some());
    }
    assert!(!state.can_redo());
    assert_eq!(state.history().applied(), before.as_slice());
}

#[test]
fn load_replaces_everything() {
    let mut state = LocalSketchState::new();
    state.commit(stroke(1));
    state.mark_pending(stroke(1));
    state.load([stroke(7), stroke(8)]);

    assert_eq!(state.existing_paths(), &[stroke(7), stroke(8)]);
    assert!(state.paths().is_empty());
    assert!(state.pending_paths().is_empty());
    assert!(!state.can_undo());
}
