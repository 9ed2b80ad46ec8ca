//! Managed node models.
//!
//! This module defines the lifecycle state of the supervised node, the TLS
//! material needed to talk to its API, and the faults that can be injected
//! into it for testing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

/// Lifecycle state of the managed node.
///
/// The normal lifecycle is:
/// Stopped -> Starting -> Running -> Stopping -> Stopped
///
/// Special states:
/// - Updating / Updated: the node is applying an update and will exit by itself
/// - Crashed: the node exited while running
/// - Errored: an internal fault occurred, `start` may be retried
/// - Exiting: the supervising application is shutting down
/// - Unrecoverable: retry budget exhausted, operator intervention required
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// No node process is running.
    #[default]
    Stopped,

    /// A node process was spawned and readiness is awaited.
    Starting,

    /// The node signalled readiness and its TLS config is available.
    Running,

    /// A graceful stop is in progress.
    Stopping,

    /// The supervising application is shutting down.
    Exiting,

    /// The node is applying an update and is expected to exit by itself.
    Updating,

    /// The node exited after applying an update.
    Updated,

    /// The node exited unexpectedly while running.
    Crashed,

    /// An internal fault occurred that is not a lifecycle crash.
    Errored,

    /// Retry budget exhausted.
    Unrecoverable,
}

impl NodeState {
    /// All states, in declaration order.
    pub const ALL: [NodeState; 10] = [
        NodeState::Stopped,
        NodeState::Starting,
        NodeState::Running,
        NodeState::Stopping,
        NodeState::Exiting,
        NodeState::Updating,
        NodeState::Updated,
        NodeState::Crashed,
        NodeState::Errored,
        NodeState::Unrecoverable,
    ];

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Stopped => "stopped",
            NodeState::Starting => "starting",
            NodeState::Running => "running",
            NodeState::Stopping => "stopping",
            NodeState::Exiting => "exiting",
            NodeState::Updating => "updating",
            NodeState::Updated => "updated",
            NodeState::Crashed => "crashed",
            NodeState::Errored => "errored",
            NodeState::Unrecoverable => "unrecoverable",
        }
    }

    /// States in which the node is shutting down and TLS config must be dropped.
    pub fn is_shutting_down(&self) -> bool {
        matches!(
            self,
            NodeState::Stopping | NodeState::Exiting | NodeState::Updating
        )
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection material for the node's secure API.
///
/// Produced once the node reports the port it listens on, and cleared
/// whenever the node leaves the running state.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, TS)]
pub struct TlsConfig {
    /// Port of the node API on localhost.
    pub port: u16,

    /// PEM encoded CA certificate.
    pub ca: Vec<u8>,

    /// PEM encoded client certificate.
    pub cert: Vec<u8>,

    /// PEM encoded client private key.
    pub key: Vec<u8>,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("port", &self.port)
            .field("ca", &format_args!("<{} bytes>", self.ca.len()))
            .field("cert", &format_args!("<{} bytes>", self.cert.len()))
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Faults that can be injected into the node to make it misbehave.
///
/// The serialized names are the ones understood by the node itself.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TS,
)]
pub enum FaultInjection {
    /// The node ignores termination requests.
    #[serde(rename = "FInjIgnoreShutdown")]
    IgnoreShutdown,

    /// The node stops answering API calls.
    #[serde(rename = "FInjIgnoreAPI")]
    IgnoreApi,

    /// The node applies an update but does not exit.
    #[serde(rename = "FInjApplyUpdateNoExit")]
    ApplyUpdateNoExit,

    /// The node applies an update and exits with an unexpected code.
    #[serde(rename = "FInjApplyUpdateWrongExitCode")]
    ApplyUpdateWrongExitCode,
}

impl FaultInjection {
    /// All known faults.
    pub const ALL: [FaultInjection; 4] = [
        FaultInjection::IgnoreShutdown,
        FaultInjection::IgnoreApi,
        FaultInjection::ApplyUpdateNoExit,
        FaultInjection::ApplyUpdateWrongExitCode,
    ];

    /// Name of the fault as understood by the node.
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultInjection::IgnoreShutdown => "FInjIgnoreShutdown",
            FaultInjection::IgnoreApi => "FInjIgnoreAPI",
            FaultInjection::ApplyUpdateNoExit => "FInjApplyUpdateNoExit",
            FaultInjection::ApplyUpdateWrongExitCode => "FInjApplyUpdateWrongExitCode",
        }
    }

    /// Kebab-case name accepted on the command line.
    fn short_name(&self) -> &'static str {
        match self {
            FaultInjection::IgnoreShutdown => "ignore-shutdown",
            FaultInjection::IgnoreApi => "ignore-api",
            FaultInjection::ApplyUpdateNoExit => "apply-update-no-exit",
            FaultInjection::ApplyUpdateWrongExitCode => "apply-update-wrong-exit-code",
        }
    }
}

impl fmt::Display for FaultInjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultInjection {
    type Err = String;

    /// Accepts both the node names (`FInjIgnoreShutdown`) and the short
    /// kebab-case names (`ignore-shutdown`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FaultInjection::ALL
            .into_iter()
            .find(|fault| {
                fault.as_str().eq_ignore_ascii_case(s)
                    || fault.short_name().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| format!("unknown fault injection: {s}"))
    }
}
