use serde_json::json;

use super::*;

#[test]
fn successful_response_yields_data() {
    let raw = json!({ "success": true, "data": { "username": "alice", "isAdmin": true } });
    let user: UserInfo = decode_response(raw).expect("decodes").into_result().expect("success");
    assert_eq!(user, UserInfo { username: "alice".into(), is_admin: true });
}

#[test]
fn failed_response_carries_message_and_code() {
    let raw = json!({ "success": false, "error": { "message": "channel not found", "code": 404 } });
    let err = decode_response::<Sketch>(raw).expect("decodes").into_result().expect_err("should fail");
    match err {
        ApiError::Application { message, code } => {
            assert_eq!(message, "channel not found");
            assert_eq!(code, 404);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failure_without_detail_still_fails() {
    let response: ApiResponse<Value> = decode_response(json!({ "success": false })).expect("decodes");
    assert!(matches!(response.into_unit(), Err(ApiError::Application { code: 0, .. })));
}

#[test]
fn success_without_data_is_missing_data_unless_ignored() {
    let response: ApiResponse<Sketch> = decode_response(json!({ "success": true })).expect("decodes");
    assert!(matches!(response.clone().into_result(), Err(ApiError::MissingData)));
    assert!(response.into_unit().is_ok());
}

#[test]
fn sketch_bodies_cross_the_case_boundary() {
    let raw = json!({
        "success": true,
        "data": [{
            "id": "s1",
            "channelName": "general",
            "displayName": "Doodle",
            "width": 64,
            "height": 48,
            "createdBy": "alice",
            "createdAt": 1_700_000_000_000_i64,
            "regions": {
                "r-1": {
                    "start": { "x": 0, "y": 0 },
                    "end": { "x": 10, "y": 10 },
                    "paths": [{ "points": [{ "x": 1, "y": 1 }, { "x": 9, "y": 9 }], "isDrawing": true, "strokeWidth": 2 }]
                }
            }
        }]
    });
    let sketches: Vec<Sketch> = decode_response(raw).expect("decodes").into_result().expect("success");
    assert_eq!(sketches.len(), 1);
    assert_eq!(sketches[0].display_name, "Doodle");
    assert_eq!(sketches[0].created_by, "alice");
    let path = sketches[0].paths().next().expect("one path");
    assert_eq!(path.stroke_width, 2);
    assert!(path.is_drawing);
}

#[test]
fn fetched_sketch_keeps_region_receipt_order() {
    let text = r#"{
        "success": true,
        "data": {
            "id": "s1",
            "channelName": "general",
            "displayName": "Doodle",
            "width": 64,
            "height": 48,
            "createdBy": "alice",
            "createdAt": 1700000000000,
            "regions": {
                "z-region": {
                    "start": { "x": 0, "y": 0 },
                    "end": { "x": 10, "y": 10 },
                    "paths": [{ "points": [{ "x": 1, "y": 1 }, { "x": 9, "y": 9 }], "isDrawing": true, "strokeWidth": 2 }]
                },
                "a-region": {
                    "start": { "x": 0, "y": 0 },
                    "end": { "x": 10, "y": 10 },
                    "paths": [{ "points": [{ "x": 1, "y": 1 }, { "x": 9, "y": 9 }], "isDrawing": false, "strokeWidth": 2 }]
                }
            }
        }
    }"#;
    let raw: Value = serde_json::from_str(text).expect("json");
    let sketch: Sketch = decode_response(raw).expect("decodes").into_result().expect("success");
    assert_eq!(sketch.regions.keys().collect::<Vec<_>>(), ["z-region", "a-region"]);
    assert_eq!(sketch.paths().map(|p| p.is_drawing).collect::<Vec<_>>(), [true, false]);
}

#[test]
fn history_decodes_wire_envelopes() {
    let raw = json!({
        "success": true,
        "data": [
            { "channelName": "general", "username": "bob", "timestamp": 5, "type": "TEXT", "content": "hi" },
            { "channelName": "general", "username": "bob", "timestamp": 6, "type": "IMAGE", "content": "https://img/1.png" }
        ]
    });
    let history: Vec<Envelope> = decode_response(raw).expect("decodes").into_result().expect("success");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].channel_name, "general");
}

#[test]
fn new_sketch_body_is_camel_case() {
    let body = to_wire_json(&NewSketch { display_name: "Doodle", width: 10, height: 20 }).expect("encodes");
    assert_eq!(body, json!({ "displayName": "Doodle", "width": 10, "height": 20 }));
}

#[test]
fn endpoint_joins_base_without_double_slash() {
    let client = ApiClient::new("http://127.0.0.1:8080/", "tok");
    assert_eq!(client.endpoint("/api/sketches/s1"), "http://127.0.0.1:8080/api/sketches/s1");
}
