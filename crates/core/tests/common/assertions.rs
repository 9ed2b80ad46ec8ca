//! Assertions and waiters over broadcast events.

use nl_protocol::ipc::Event;
use nl_protocol::node_models::NodeState;
use std::time::Duration;
use tokio::sync::broadcast;

/// Upper bound for every wait. Generous because paused-clock tests
/// auto-advance through it instantly.
#[allow(dead_code)]
pub const WAIT_LIMIT: Duration = Duration::from_secs(120);

/// Receive events until `predicate` matches, returning the matching event.
#[allow(dead_code)]
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<Event>,
    predicate: impl Fn(&Event) -> bool,
) -> Event {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    };
    tokio::time::timeout(WAIT_LIMIT, wait)
        .await
        .expect("expected event was not broadcast")
}

/// Receive events until the node enters `state`.
#[allow(dead_code)]
pub async fn wait_for_state(events: &mut broadcast::Receiver<Event>, state: NodeState) {
    wait_for_event(events, |event| *event == Event::StateChanged(state)).await;
}

/// All events received so far, without waiting.
#[allow(dead_code)]
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// State changes among `events`, in order.
#[allow(dead_code)]
pub fn state_changes(events: &[Event]) -> Vec<NodeState> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

/// Assert that `events` contain exactly the given state changes, in order.
#[allow(dead_code)]
pub fn assert_state_sequence(events: &[Event], expected: &[NodeState]) {
    assert_eq!(
        state_changes(events),
        expected,
        "unexpected state sequence in {events:?}"
    );
}

/// Assert that `args` contain `flag` immediately followed by `value`.
#[allow(dead_code)]
pub fn assert_arg_pair(args: &[String], flag: &str, value: &str) {
    let found = args
        .windows(2)
        .any(|pair| pair[0] == flag && pair[1] == value);
    assert!(found, "expected `{flag} {value}` in {args:?}");
}
