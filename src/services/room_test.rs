use super::*;
use crate::state::test_helpers::aid;
use uuid::Uuid;

fn registry() -> RoomRegistry {
    RoomRegistry::new("default", 100, 50)
}

fn shape() -> ActionPayload {
    ActionPayload::Shape { start_pos: Point::new(0.0, 0.0), end_pos: Point::new(10.0, 10.0) }
}

// =============================================================================
// Room: drawing
// =============================================================================

#[test]
fn stroke_lifecycle_commits_to_history() {
    let alice = Uuid::new_v4();
    let mut room = Room::new("r", 100);
    room.begin_stroke(aid("s1"), alice, DisplayAttrs::default(), vec![Point::new(0.0, 0.0)])
        .unwrap();
    room.append_stroke_points(&aid("s1"), alice, vec![Point::new(1.0, 1.0)])
        .unwrap();
    assert!(room.visible_history().is_empty());

    let committed = room.end_stroke(&aid("s1"), alice).unwrap();
    assert_eq!(committed.payload, ActionPayload::Stroke { points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)] });
    assert_eq!(committed.seq, 1);
    assert_eq!(room.live_stroke_count(), 0);
    assert_eq!(room.visible_history().len(), 1);
    assert_eq!(room.stack_sizes(alice), StackSizes { undo: 1, redo: 0 });
}

#[test]
fn stroke_id_already_committed_is_rejected() {
    let alice = Uuid::new_v4();
    let mut room = Room::new("r", 100);
    room.commit_drawing(alice, Some(aid("x")), DisplayAttrs::default(), shape())
        .unwrap();

    let err = room
        .begin_stroke(aid("x"), alice, DisplayAttrs::default(), Vec::new())
        .unwrap_err();
    assert_eq!(err, ActionError::Log(LogError::DuplicateAction(aid("x"))));
    assert_eq!(room.live_stroke_count(), 0);
}

#[test]
fn commit_drawing_generates_missing_ids_and_rejects_duplicates() {
    let alice = Uuid::new_v4();
    let mut room = Room::new("r", 100);
    let first = room.commit_drawing(alice, None, DisplayAttrs::default(), shape()).unwrap();
    let second = room.commit_drawing(alice, None, DisplayAttrs::default(), shape()).unwrap();
    assert_ne!(first.action_id, second.action_id);
    assert!(second.seq > first.seq);

    let dup = room.commit_drawing(alice, Some(first.action_id.clone()), DisplayAttrs::default(), shape());
    assert!(matches!(dup, Err(ActionError::Log(LogError::DuplicateAction(_)))));
    assert_eq!(room.visible_history().len(), 2);
}

#[test]
fn clear_wipes_history_and_every_stack() {
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let mut room = Room::new("r", 100);
    room.commit_drawing(alice, None, DisplayAttrs::default(), shape()).unwrap();
    room.commit_drawing(bob, None, DisplayAttrs::default(), shape()).unwrap();
    room.undo(bob).unwrap();

    let cleared = room.clear(alice);
    assert_eq!(cleared.kind(), crate::state::ActionKind::Clear);
    assert!(room.visible_history().is_empty());
    assert_eq!(room.stack_sizes(alice), StackSizes::default());
    assert_eq!(room.stack_sizes(bob), StackSizes::default());
    assert!(room.undo(alice).is_none());
    assert!(room.redo(bob).is_none());
}

#[test]
fn clear_keeps_other_users_live_strokes() {
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let mut room = Room::new("r", 100);
    room.begin_stroke(aid("b1"), bob, DisplayAttrs::default(), vec![Point::new(1.0, 1.0)])
        .unwrap();

    room.clear(alice);
    assert!(room.has_live_stroke(&aid("b1")));
    room.end_stroke(&aid("b1"), bob).unwrap();
    assert_eq!(room.visible_history().len(), 1);
}

#[test]
fn undo_is_per_author() {
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let mut room = Room::new("r", 100);
    room.commit_drawing(alice, Some(aid("a1")), DisplayAttrs::default(), shape()).unwrap();
    room.commit_drawing(bob, Some(aid("b1")), DisplayAttrs::default(), shape()).unwrap();

    assert_eq!(room.undo(alice).unwrap().action_id, aid("a1"));
    let visible: Vec<ActionId> = room.visible_history().into_iter().map(|a| a.action_id).collect();
    assert_eq!(visible, vec![aid("b1")]);
}

#[test]
fn summary_reports_counts() {
    let alice = Uuid::new_v4();
    let mut registry = registry();
    registry.join(alice, "default");
    let room = registry.room_of_mut(alice).unwrap();
    room.commit_drawing(alice, None, DisplayAttrs::default(), shape()).unwrap();
    room.begin_stroke(aid("s"), alice, DisplayAttrs::default(), Vec::new()).unwrap();

    assert_eq!(
        room.summary(),
        RoomSummary { id: "default".into(), users: 1, history: 1, live_strokes: 1 }
    );
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn default_room_exists_and_survives_emptying() {
    let alice = Uuid::new_v4();
    let mut registry = registry();
    assert_eq!(registry.list_rooms(), vec!["default"]);

    registry.join(alice, "default");
    let departed = registry.leave(alice, Departure::Disconnect).unwrap();
    assert!(!departed.destroyed);
    assert!(registry.get("default").is_some());
}

#[test]
fn validate_name_trims_and_rejects_bad_names() {
    let registry = registry();
    assert_eq!(registry.validate_name("  art  ").unwrap(), "art");
    assert_eq!(registry.validate_name("   "), Err(RoomError::EmptyName));
    assert_eq!(registry.validate_name(&"x".repeat(51)), Err(RoomError::NameTooLong { max: 50 }));
    assert_eq!(registry.validate_name("a\u{7}b"), Err(RoomError::InvalidName));
    assert_eq!(RoomError::EmptyName.error_code(), "E_ROOM_NAME_EMPTY");
}

#[test]
fn create_is_idempotent_and_does_not_join() {
    let alice = Uuid::new_v4();
    let mut registry = registry();
    registry.join(alice, "default");

    assert_eq!(registry.create("art").unwrap(), ("art".to_owned(), true));
    assert_eq!(registry.create(" art ").unwrap(), ("art".to_owned(), false));
    assert_eq!(registry.room_of(alice).map(String::as_str), Some("default"));
    assert_eq!(registry.list_rooms(), vec!["art", "default"]);
}

#[test]
fn switching_rooms_purges_strokes_and_destroys_empty_room() {
    let alice = Uuid::new_v4();
    let mut registry = registry();
    registry.join(alice, "art");
    registry
        .room_of_mut(alice)
        .unwrap()
        .begin_stroke(aid("s1"), alice, DisplayAttrs::default(), Vec::new())
        .unwrap();

    let joined = registry.join(alice, "default");
    let previous = joined.previous.clone().unwrap();
    assert_eq!(previous.room_id, "art");
    assert_eq!(previous.purged, vec![aid("s1")]);
    assert!(previous.destroyed);
    assert!(joined.rooms_changed());
    assert!(registry.get("art").is_none());
}

#[test]
fn joining_current_room_changes_nothing() {
    let alice = Uuid::new_v4();
    let mut registry = registry();
    registry.join(alice, "default");

    let again = registry.join(alice, "default");
    assert!(again.unchanged);
    assert!(again.previous.is_none());
    assert_eq!(registry.get("default").unwrap().members(), &[alice]);
}

#[test]
fn user_is_in_exactly_one_room() {
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let mut registry = registry();
    registry.join(alice, "default");
    registry.join(bob, "default");
    registry.join(alice, "art");

    assert_eq!(registry.get("default").unwrap().members(), &[bob]);
    assert_eq!(registry.get("art").unwrap().members(), &[alice]);
    assert_eq!(registry.room_of(alice).map(String::as_str), Some("art"));
}

#[test]
fn switch_keeps_history_but_disconnect_forgets_it() {
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let mut registry = registry();
    registry.join(alice, "default");
    registry.join(bob, "default");
    registry
        .room_of_mut(alice)
        .unwrap()
        .commit_drawing(alice, None, DisplayAttrs::default(), shape())
        .unwrap();

    registry.join(alice, "art");
    assert_eq!(registry.get("default").unwrap().stack_sizes(alice).undo, 1);

    registry.join(alice, "default");
    registry.leave(alice, Departure::Disconnect);
    let room = registry.get("default").unwrap();
    assert_eq!(room.stack_sizes(alice), StackSizes::default());
    assert_eq!(room.visible_history().len(), 1);
}

#[test]
fn disconnect_forgets_history_in_rooms_left_earlier() {
    let alice = Uuid::new_v4();
    let mut registry = registry();
    registry.join(alice, "default");
    registry
        .room_of_mut(alice)
        .unwrap()
        .commit_drawing(alice, None, DisplayAttrs::default(), shape())
        .unwrap();

    registry.join(alice, "art");
    registry.leave(alice, Departure::Disconnect);

    let room = registry.get("default").unwrap();
    assert_eq!(room.stack_sizes(alice), StackSizes::default());
    assert_eq!(room.visible_history().len(), 1);
}
