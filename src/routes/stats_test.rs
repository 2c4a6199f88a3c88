use super::*;
use crate::services::room::Departure;
use crate::state::test_helpers::{aid, connect, test_app_state};
use crate::state::{ActionPayload, DisplayAttrs, Point};

#[tokio::test]
async fn stats_count_rooms_users_and_events() {
    let state = test_app_state();
    let (alice, _alice_rx) = connect(&state, "alice").await;
    let (bob, _bob_rx) = connect(&state, "bob").await;
    {
        let mut hub = state.hub.write().await;
        hub.rooms.join(bob, "art");
        let room = hub.rooms.room_of_mut(alice).unwrap();
        let shape = ActionPayload::Shape { start_pos: Point::new(0.0, 0.0), end_pos: Point::new(1.0, 1.0) };
        room.commit_drawing(alice, Some(aid("s1")), DisplayAttrs::default(), shape.clone()).unwrap();
        room.commit_drawing(alice, Some(aid("s2")), DisplayAttrs::default(), shape).unwrap();
        room.undo(alice).unwrap();
        room.begin_stroke(aid("live"), alice, DisplayAttrs::default(), Vec::new()).unwrap();
    }

    let Json(stats) = stats(State(state.clone())).await;
    assert_eq!(stats.rooms, 2);
    assert_eq!(stats.users, 2);
    assert_eq!(stats.total_events, 2);
    assert_eq!(stats.visible_events, 1);
    assert_eq!(stats.hidden_events, 1);
    assert_eq!(stats.live_strokes, 1);
}

#[tokio::test]
async fn list_rooms_is_sorted_with_member_counts() {
    let state = test_app_state();
    let (alice, _alice_rx) = connect(&state, "alice").await;
    let (bob, _bob_rx) = connect(&state, "bob").await;
    {
        let mut hub = state.hub.write().await;
        hub.rooms.join(alice, "zebra");
        hub.rooms.join(bob, "art");
        hub.rooms.leave(bob, Departure::Disconnect);
    }

    let Json(rooms) = list_rooms(State(state)).await;
    let ids: Vec<&str> = rooms.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["default", "zebra"]);
    assert_eq!(rooms[1].users, 1);
    assert_eq!(rooms[0].users, 0);
}
