//! Connectivity status models.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Snapshot of the node's connectivity as seen by the consumer process.
///
/// The consumer owns these values; the supervisor only caches the last
/// snapshot so that a restarted consumer can bootstrap without waiting for a
/// fresh network round trip.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "camelCase")]
pub struct CardanoStatus {
    /// The node API answered the last request.
    pub is_node_responding: bool,

    /// The node is subscribed to at least one peer.
    pub is_node_subscribed: bool,

    /// The node is receiving blocks and not stalling.
    pub is_node_syncing: bool,

    /// The local chain is within the allowed distance of the network tip.
    pub is_node_in_sync: bool,

    /// The node has been connected at least once during this session.
    pub has_been_connected: bool,
}

impl CardanoStatus {
    /// Conservative status: nothing is known to work.
    pub fn disconnected(has_been_connected: bool) -> Self {
        Self {
            has_been_connected,
            ..Self::default()
        }
    }

    /// Responding, subscribed and syncing.
    pub fn is_connected(&self) -> bool {
        self.is_node_responding && self.is_node_subscribed && self.is_node_syncing
    }
}
