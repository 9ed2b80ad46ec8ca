//! Allowed node state transitions.
//!
//! ```text
//! Stopped | Crashed | Errored -> Starting
//! Starting -> Starting | Running | Unrecoverable | Stopping
//! Running  -> Crashed | Stopping | Updating
//! Crashed  -> Unrecoverable | Stopped
//! Stopping -> Stopped
//! Updating -> Updated
//! any      -> Exiting | Errored
//! ```
//!
//! `Unrecoverable`, `Exiting` and `Updated` are terminal except that an
//! `Unrecoverable` or `Updated` node may still move to `Exiting`.

use nl_protocol::node_models::NodeState;

/// Whether the node may move from `from` to `to`.
pub fn is_allowed(from: NodeState, to: NodeState) -> bool {
    use NodeState::*;

    if from == to {
        // Only a new startup attempt re-enters its own state.
        return from == Starting;
    }

    match (from, to) {
        (Exiting, _) => false,
        (_, Exiting) => true,
        (Unrecoverable | Updated, _) => false,
        (_, Errored) => true,
        (Stopped | Crashed | Errored, Starting) => true,
        (Starting, Running | Unrecoverable | Stopping) => true,
        (Running, Crashed | Stopping | Updating) => true,
        (Crashed, Unrecoverable | Stopped) => true,
        (Stopping, Stopped) => true,
        (Updating, Updated) => true,
        _ => false,
    }
}

/// States from which the node can never start again.
pub fn is_terminal(state: NodeState) -> bool {
    matches!(
        state,
        NodeState::Unrecoverable | NodeState::Exiting | NodeState::Updated
    )
}
