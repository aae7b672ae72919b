use super::*;
use crate::{
    ChannelAction, ChannelInfo, ChannelUpdate, Content, Envelope, MemberAction, MemberUpdate, Path, Point, Presence,
    Region, Sketch, SketchCommand, SystemUserStatus, UserStatus, decode_envelope, encode_envelope,
};
use proptest::prelude::*;
use serde_json::json;

#[test]
fn camel_key_converts_snake_words() {
    assert_eq!(camel_key("stroke_width"), "strokeWidth");
    assert_eq!(camel_key("is_partial"), "isPartial");
    assert_eq!(camel_key("channel_name"), "channelName");
    assert_eq!(camel_key("type"), "type");
}

#[test]
fn snake_key_converts_camel_words() {
    assert_eq!(snake_key("strokeWidth"), "stroke_width");
    assert_eq!(snake_key("sketchData"), "sketch_data");
    assert_eq!(snake_key("x"), "x");
}

#[test]
fn underscores_without_lowercase_successor_survive() {
    assert_eq!(camel_key("point_2"), "point_2");
    assert_eq!(camel_key("_meta"), "_meta");
    assert_eq!(snake_key(&camel_key("a__b")), "a__b");
}

#[test]
fn conversion_recurses_through_objects_and_arrays_but_not_values() {
    let local = json!({
        "sketch_data": {
            "display_name": "stroke_width",
            "regions": [{"is_drawing": true, "paths": [{"stroke_width": 3}]}]
        }
    });
    let wire = to_wire(local.clone());
    assert_eq!(
        wire,
        json!({
            "sketchData": {
                "displayName": "stroke_width",
                "regions": [{"isDrawing": true, "paths": [{"strokeWidth": 3}]}]
            }
        })
    );
    assert_eq!(to_local(wire), local);
}

fn snake_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}(_[a-z0-9]{1,6}){0,3}"
}

fn camel_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}([A-Z][a-z0-9]{0,6}){0,3}"
}

fn json_strategy(keys: BoxedStrategy<String>) -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z_ ]{0,12}".prop_map(serde_json::Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, move |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(serde_json::Value::Array),
            prop::collection::btree_map(keys.clone(), inner, 0..6)
                .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
        ]
    })
}

fn point_strategy() -> impl Strategy<Value = Point> {
    (-500..500i32, -500..500i32).prop_map(|(x, y)| Point::new(x, y))
}

fn path_strategy() -> impl Strategy<Value = Path> {
    (prop::collection::vec(point_strategy(), 1..8), any::<bool>(), 1..40u32)
        .prop_map(|(points, is_drawing, stroke_width)| Path { points, is_drawing, stroke_width })
}

fn region_strategy() -> impl Strategy<Value = Region> {
    (prop::collection::vec(path_strategy(), 1..3), 0..50i32, 0..50i32).prop_map(|(paths, x, y)| Region {
        start: Point::new(x, y),
        end: Point::new(x + 10, y + 10),
        paths,
    })
}

fn sketch_strategy() -> impl Strategy<Value = Sketch> {
    (
        "[a-z0-9-]{1,12}",
        prop::collection::vec(("[a-f0-9-]{4,12}", region_strategy()), 0..5),
        1..2000u32,
        1..2000u32,
    )
        .prop_map(|(id, regions, width, height)| Sketch {
            id,
            channel_name: "general".to_owned(),
            display_name: "Board one".to_owned(),
            width,
            height,
            created_by: "ann".to_owned(),
            created_at: 1_700_000_000_000,
            regions: regions.into_iter().collect(),
        })
}

fn region_ids(envelope: &Envelope) -> Vec<String> {
    match &envelope.content {
        Content::Sketch(SketchCommand { sketch_data: Some(sketch), .. }) => sketch.regions.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

fn content_strategy() -> impl Strategy<Value = Content> {
    prop_oneof![
        ".{0,20}".prop_map(Content::Text),
        "https://[a-z]{1,8}\\.test/[a-z]{1,8}".prop_map(Content::Image),
        ("[a-z]{1,8}", any::<bool>(), any::<bool>()).prop_map(|(username, added, is_admin)| {
            Content::MemberUpdate(MemberUpdate {
                username,
                action: if added { MemberAction::Added } else { MemberAction::RoleChanged },
                is_admin,
            })
        }),
        ("[a-z]{1,8}", any::<bool>()).prop_map(|(username, online)| {
            Content::UserStatus(UserStatus { username, action: if online { Presence::Online } else { Presence::Offline } })
        }),
        ("[a-z]{1,8}", prop::option::of("[a-z ]{0,12}"), any::<bool>()).prop_map(|(name, description, created)| {
            Content::ChannelUpdate(ChannelUpdate {
                action: if created { ChannelAction::Created } else { ChannelAction::Deleted },
                channel: ChannelInfo { name, description, created_by: None },
            })
        }),
        any::<u32>().prop_map(|count| Content::SystemUserStatus(SystemUserStatus { count })),
        ("[a-z0-9-]{1,8}", region_strategy(), any::<bool>())
            .prop_map(|(id, region, partial)| Content::Sketch(SketchCommand::update(id, region, partial))),
        "[a-z0-9-]{1,8}".prop_map(|id| Content::Sketch(SketchCommand::clear(id))),
        "[a-z0-9-]{1,8}".prop_map(|id| Content::Sketch(SketchCommand::delete(id))),
        sketch_strategy().prop_map(|sketch| Content::Sketch(SketchCommand::new_sketch(sketch))),
    ]
}

proptest! {
    #[test]
    fn local_keys_survive_wire_round_trip(value in json_strategy(snake_key_strategy().boxed())) {
        prop_assert_eq!(to_local(to_wire(value.clone())), value);
    }

    #[test]
    fn wire_keys_survive_local_round_trip(value in json_strategy(camel_key_strategy().boxed())) {
        prop_assert_eq!(to_wire(to_local(value.clone())), value);
    }

    #[test]
    fn every_envelope_survives_encode_decode(
        content in content_strategy(),
        channel_name in "[a-z-]{0,10}",
        username in "[a-z]{1,10}",
        timestamp in 0..i64::MAX,
    ) {
        let envelope = Envelope { channel_name, username, timestamp, content };
        let text = encode_envelope(&envelope).expect("encode");
        let decoded = decode_envelope(&text).expect("decode");
        // IndexMap equality ignores order; replay does not.
        prop_assert_eq!(region_ids(&decoded), region_ids(&envelope));
        prop_assert_eq!(decoded, envelope);
    }
}
