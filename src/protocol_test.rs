use super::*;
use serde_json::json;
use uuid::Uuid;

fn decode(value: &serde_json::Value) -> ClientMessage {
    ClientMessage::decode(&value.to_string()).expect("should decode")
}

#[test]
fn stroke_start_decodes_attrs_and_points() {
    let msg = decode(&json!({
        "event": "stroke-start",
        "data": {
            "actionId": "s-1",
            "tool": "brush",
            "color": "#000000",
            "brushSize": 5,
            "points": [{"x": 1, "y": 2}, {"x": 3.5, "y": 4}]
        }
    }));

    let ClientMessage::StrokeStart(stroke) = msg else {
        panic!("expected stroke-start");
    };
    assert_eq!(stroke.action_id.as_str(), "s-1");
    assert_eq!(stroke.attrs.tool, Some(json!("brush")));
    assert_eq!(stroke.attrs.brush_size, Some(json!(5)));
    assert_eq!(stroke.points, vec![Point::new(1.0, 2.0), Point::new(3.5, 4.0)]);
}

#[test]
fn malformed_points_are_dropped_individually() {
    let msg = decode(&json!({
        "event": "stroke-update",
        "data": {
            "actionId": "s-1",
            "points": [{"x": 1, "y": 1}, {"x": "bad", "y": 2}, null, {"y": 3}, {"x": 4, "y": 4}]
        }
    }));

    let ClientMessage::StrokeUpdate(update) = msg else {
        panic!("expected stroke-update");
    };
    assert_eq!(update.points, vec![Point::new(1.0, 1.0), Point::new(4.0, 4.0)]);
}

#[test]
fn non_array_points_decode_as_empty_batch() {
    let msg = decode(&json!({"event": "stroke-update", "data": {"actionId": "s-1", "points": "oops"}}));
    let ClientMessage::StrokeUpdate(update) = msg else {
        panic!("expected stroke-update");
    };
    assert!(update.points.is_empty());
}

#[test]
fn legacy_stroke_id_alias_is_accepted() {
    let msg = decode(&json!({"event": "stroke-end", "data": {"strokeId": "legacy", "totalPoints": 12}}));
    let ClientMessage::StrokeEnd(end) = msg else {
        panic!("expected stroke-end");
    };
    assert_eq!(end.action_id.as_str(), "legacy");
    assert_eq!(end.total_points, Some(12));
}

#[test]
fn missing_action_id_is_rejected() {
    let text = json!({"event": "stroke-start", "data": {"points": []}}).to_string();
    assert!(ClientMessage::decode(&text).is_err());

    let empty = json!({"event": "stroke-start", "data": {"actionId": ""}}).to_string();
    assert!(ClientMessage::decode(&empty).is_err());
}

#[test]
fn shape_and_text_ids_are_optional() {
    let shape = decode(&json!({
        "event": "shape-drawn",
        "data": {"tool": "circle", "startPos": {"x": 0, "y": 0}, "endPos": {"x": 5, "y": 5}}
    }));
    let ClientMessage::ShapeDrawn(shape) = shape else {
        panic!("expected shape-drawn");
    };
    assert!(shape.action_id.is_none());
    assert_eq!(shape.end_pos, Point::new(5.0, 5.0));

    let text = decode(&json!({
        "event": "text-added",
        "data": {"textId": "t-1", "text": "hello", "pos": {"x": 1, "y": 1}}
    }));
    let ClientMessage::TextAdded(text) = text else {
        panic!("expected text-added");
    };
    assert_eq!(text.action_id.map(String::from).as_deref(), Some("t-1"));
    assert_eq!(text.text, "hello");
}

#[test]
fn shape_without_positions_is_rejected() {
    let text = json!({"event": "shape-drawn", "data": {"startPos": {"x": 0, "y": 0}}}).to_string();
    assert!(ClientMessage::decode(&text).is_err());
}

#[test]
fn payloadless_events_decode_without_data() {
    assert!(matches!(decode(&json!({"event": "undo"})), ClientMessage::Undo));
    assert!(matches!(decode(&json!({"event": "redo"})), ClientMessage::Redo));
    assert!(matches!(decode(&json!({"event": "clear-canvas"})), ClientMessage::ClearCanvas));
    assert!(matches!(decode(&json!({"event": "ping", "data": null})), ClientMessage::Ping));
}

#[test]
fn payloadless_events_ignore_any_data() {
    assert!(matches!(decode(&json!({"event": "undo", "data": {}})), ClientMessage::Undo));
    assert!(matches!(decode(&json!({"event": "redo", "data": {"userId": "x"}})), ClientMessage::Redo));
    assert!(matches!(decode(&json!({"event": "clear-canvas", "data": []})), ClientMessage::ClearCanvas));
    assert!(matches!(decode(&json!({"event": "list-rooms", "data": "all"})), ClientMessage::ListRooms));
    assert!(matches!(decode(&json!({"event": "ping", "data": {"t": 1}})), ClientMessage::Ping));
}

#[test]
fn payload_events_still_require_data() {
    assert!(ClientMessage::decode(r#"{"event":"join-room","data":{}}"#).is_err());
    assert!(ClientMessage::decode(r#"{"event":"stroke-start"}"#).is_err());
    assert!(ClientMessage::decode("[1,2]").is_err());
}

#[test]
fn room_requests_accept_room_name() {
    let msg = decode(&json!({"event": "join-room", "data": {"roomName": "studio"}}));
    let ClientMessage::JoinRoom(room) = msg else {
        panic!("expected join-room");
    };
    assert_eq!(room.room_name, "studio");
    assert_eq!(ClientMessage::JoinRoom(room).event(), "join-room");
}

#[test]
fn unknown_event_is_an_error() {
    assert!(ClientMessage::decode(r#"{"event":"drawing-data","data":{}}"#).is_err());
    assert!(ClientMessage::decode("not json").is_err());
}

#[test]
fn outbound_messages_use_event_and_data_envelope() {
    let user_id = Uuid::new_v4();
    let msg = ServerMessage::CursorMove(CursorMoved { user_id, cursor: Point::new(3.0, 4.0) });
    let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();

    assert_eq!(value["event"], json!("cursor-move"));
    assert_eq!(value["data"]["userId"], json!(user_id));
    assert_eq!(value["data"]["cursor"], json!({"x": 3.0, "y": 4.0}));
    assert!(msg.is_cursor());
}

#[test]
fn room_error_carries_code_and_message() {
    #[derive(Debug, thiserror::Error)]
    #[error("room name is required")]
    struct Empty;

    impl ErrorCode for Empty {
        fn error_code(&self) -> &'static str {
            "E_ROOM_NAME_EMPTY"
        }
    }

    let msg = ServerMessage::room_error(&Empty);
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["event"], json!("room-error"));
    assert_eq!(value["data"]["code"], json!("E_ROOM_NAME_EMPTY"));
    assert_eq!(value["data"]["message"], json!("room name is required"));
}

#[test]
fn now_ms_is_positive() {
    assert!(now_ms() > 0);
}
