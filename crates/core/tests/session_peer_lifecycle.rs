//! Integration test for the session peer-membership invariant behind
//! "last-peer departure" (spec.md §3: "destroyed when the room has zero
//! peers"): `ConversationOrchestrator` decides whether to tear a session
//! down purely from `Session::is_empty()`, so that bookkeeping must hold
//! under multiple peers joining and leaving in any order, not just the
//! single-peer case.

use voice_agent_core::{PeerId, Session};

fn new_peer() -> PeerId {
    PeerId::new_v4()
}

#[test]
fn session_is_empty_only_after_every_peer_has_left() {
    let session = Session::new("ctx-multi", None, true);
    assert!(session.is_empty());

    let first = new_peer();
    let second = new_peer();
    let third = new_peer();

    session.add_peer(first);
    session.add_peer(second);
    session.add_peer(third);
    assert_eq!(session.peer_count(), 3);
    assert!(!session.is_empty());

    session.remove_peer(first);
    assert!(!session.is_empty(), "two peers remain");

    session.remove_peer(second);
    assert!(!session.is_empty(), "one peer remains");

    session.remove_peer(third);
    assert!(session.is_empty(), "session empties only once the last peer leaves");
}

#[test]
fn removing_a_peer_twice_is_a_no_op() {
    let session = Session::new("ctx-dup-remove", None, true);
    let peer = new_peer();
    session.add_peer(peer);

    session.remove_peer(peer);
    assert!(session.is_empty());

    session.remove_peer(peer);
    assert!(session.is_empty());
}

#[test]
fn allows_interruptions_flag_is_carried_from_construction() {
    let barge_in_enabled = Session::new("ctx-interrupt-on", None, true);
    assert!(barge_in_enabled.allows_interruptions);

    let barge_in_disabled = Session::new("ctx-interrupt-off", None, false);
    assert!(!barge_in_disabled.allows_interruptions);
}
