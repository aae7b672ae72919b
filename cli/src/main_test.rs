use std::io::Cursor;

use super::*;

#[test]
fn blank_lines_split_strokes() {
    let input = "0,0\n5,5\n\n\n10 10\n 12 , 14 \n";
    let strokes = parse_strokes(Cursor::new(input)).expect("valid input");
    assert_eq!(strokes, vec![vec![Point::new(0, 0), Point::new(5, 5)], vec![Point::new(10, 10), Point::new(12, 14)]]);
}

#[test]
fn malformed_point_reports_line() {
    let error = parse_strokes(Cursor::new("1,1\n2,two\n")).expect_err("second line is invalid");
    assert!(matches!(error, CliError::BadPoint { line: 2, .. }), "got {error:?}");
}

#[test]
fn extra_coordinates_are_rejected() {
    assert_eq!(parse_point("1,2,3"), None);
    assert_eq!(parse_point("-4,7"), Some(Point::new(-4, 7)));
}

#[test]
fn ascii_marks_inked_pixels() {
    let mut path = Path::new(Point::new(0, 0), true, 1);
    path.points.push(Point::new(2, 0));
    let raster = Raster::replay(3, 2, [&path]);
    assert_eq!(ascii(&raster), "###\n...");
}

#[test]
fn oversized_sketch_is_refused_before_allocating() {
    let error = raster_for(100_000, 100_000).expect_err("too large");
    assert!(matches!(error, CliError::SketchTooLarge { width: 100_000, height: 100_000 }), "got {error:?}");
    assert!(matches!(raster_for(64, MAX_SKETCH_SIDE + 1), Err(CliError::SketchTooLarge { .. })));
}

#[test]
fn sketch_within_bounds_gets_a_blank_raster() {
    let raster = raster_for(64, 32).expect("fits");
    assert_eq!(ascii(&raster.borrow()).lines().count(), 32);
    assert!(raster_for(MAX_SKETCH_SIDE, 1).is_ok());
}
