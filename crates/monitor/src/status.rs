//! Connectivity and sync computations.
//!
//! Everything here is a pure function over the values reported by the node
//! API, so the monitor can recompute its booleans after every poll.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One answer of the node API, reduced to what the monitor needs.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSnapshot {
    /// Sync progress reported by the node, in percent.
    pub sync_progress: f64,

    /// Height of the network tip, absent while the node knows no peer.
    pub network_height: Option<u64>,

    /// Height of the local chain.
    pub local_height: u64,

    /// Difference from NTP time in microseconds, absent when unknown.
    pub time_difference_us: Option<i64>,

    /// The node is subscribed to at least one peer.
    pub is_subscribed: bool,
}

/// Coarse progress of the node towards a usable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStage {
    /// Waiting for the first peer subscription.
    #[default]
    Connecting,
    /// Subscribed, catching up with the network.
    Syncing,
    /// In sync with the network.
    Running,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::Connecting => "connecting",
            SyncStage::Syncing => "syncing",
            SyncStage::Running => "running",
        };
        f.write_str(name)
    }
}

/// Next stage given the current one and the latest poll.
pub fn next_stage(stage: SyncStage, is_subscribed: bool, is_in_sync: bool) -> SyncStage {
    match stage {
        SyncStage::Connecting if is_subscribed => SyncStage::Syncing,
        SyncStage::Syncing if is_in_sync => SyncStage::Running,
        other => other,
    }
}

/// Whether the reported NTP difference is within the allowed bound.
pub fn is_time_correct(difference_us: Option<i64>, allowed_us: i64) -> bool {
    matches!(difference_us, Some(difference) if difference <= allowed_us)
}

/// Whether the node is receiving blocks.
pub fn is_syncing(
    has_started_receiving_blocks: bool,
    is_increasing: bool,
    is_stalling: bool,
) -> bool {
    has_started_receiving_blocks && (is_increasing || !is_stalling)
}

/// Whether the local chain is close enough to the network tip.
pub fn is_in_sync(
    is_syncing: bool,
    network_height: u64,
    local_height: u64,
    allowed_lag: u64,
) -> bool {
    is_syncing && network_height.saturating_sub(local_height) <= allowed_lag
}

/// Percentage of the network chain present locally.
pub fn sync_percentage(local_height: u64, network_height: u64) -> f64 {
    if network_height < 1 {
        return 0.0;
    }
    if local_height >= network_height {
        return 100.0;
    }
    local_height as f64 / network_height as f64 * 100.0
}
