//! Monitor configuration.

use std::time::Duration;

/// Polling intervals and thresholds of the status monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Interval between regular network status polls.
    pub poll_interval: Duration,

    /// Interval between forced NTP time checks.
    pub ntp_check_interval: Duration,

    /// Time without a new network block after which syncing is considered stalled.
    pub max_allowed_stall: Duration,

    /// Largest accepted difference from NTP time, in microseconds.
    pub allowed_time_difference_us: i64,

    /// Timeout of a single node API request.
    pub request_timeout: Duration,

    /// Blocks the local chain may lag behind the network while still in sync.
    pub unsynced_blocks_allowed: u64,

    /// Treat the system time as correct regardless of NTP checks.
    pub ignore_system_time: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            ntp_check_interval: Duration::from_secs(30 * 60),
            max_allowed_stall: Duration::from_secs(2 * 60),
            allowed_time_difference_us: 15_000_000,
            request_timeout: Duration::from_secs(30),
            unsynced_blocks_allowed: 6,
            ignore_system_time: false,
        }
    }
}
