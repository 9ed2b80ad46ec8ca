//! Inter-process communication protocol.
//!
//! This module defines the message types exchanged between the supervisor
//! (which owns the node) and the consumer (which monitors the node's network
//! status).
//!
//! The protocol follows a Request/Response + Event pattern:
//! - `Request`: Commands and queries sent from the consumer to the supervisor
//! - `Response`: Exactly one answer per request, success or explicit error
//! - `Event`: Broadcasts sent from the supervisor to every consumer
//!
//! Every request belongs to one logical [`Channel`]. Handlers must tolerate
//! duplicate delivery of the same request.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::node_models::{FaultInjection, NodeState, TlsConfig};
use crate::status_models::CardanoStatus;

/// Exit code of the supervising application once an update was applied.
pub const UPDATE_EXIT_CODE: i32 = 20;

/// Named logical channels between supervisor and consumer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    StateChange,
    TlsConfig,
    Status,
    Restart,
    FaultInjection,
    AwaitUpdate,
}

impl Channel {
    /// Name of the channel on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Channel::StateChange => "cardano-state-change",
            Channel::TlsConfig => "cardano-tls-config",
            Channel::Status => "cardano-status",
            Channel::Restart => "cardano-restart",
            Channel::FaultInjection => "cardano-fault-injection",
            Channel::AwaitUpdate => "cardano-await-update",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Requests sent from the consumer to the supervisor.
///
/// Uses tagged enum serialization for TypeScript compatibility:
/// ```json
/// {
///   "type": "restart",
///   "payload": { "forced": true }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Request {
    /// Ask for the current node state.
    GetState,

    /// Ask for the current TLS config (absent while the node is not running).
    GetTlsConfig,

    /// Ask for the cached connectivity status.
    GetStatus,

    /// Push a fresh connectivity status into the supervisor's cache.
    SaveStatus(CardanoStatus),

    /// Restart the node with the last known configuration.
    Restart {
        /// Skip the restart cooldown.
        forced: bool,
    },

    /// Toggle a fault injection. Takes effect on the next spawn.
    SetFault { fault: FaultInjection, enabled: bool },

    /// Ask for the active fault injections.
    GetFaults,

    /// Await the node's self-triggered exit after it applied an update.
    ///
    /// Acknowledged immediately; completion is signalled with
    /// [`Event::ExitRequested`].
    AwaitUpdate,
}

impl Request {
    /// Logical channel the request belongs to.
    pub fn channel(&self) -> Channel {
        match self {
            Request::GetState => Channel::StateChange,
            Request::GetTlsConfig => Channel::TlsConfig,
            Request::GetStatus | Request::SaveStatus(_) => Channel::Status,
            Request::Restart { .. } => Channel::Restart,
            Request::SetFault { .. } | Request::GetFaults => Channel::FaultInjection,
            Request::AwaitUpdate => Channel::AwaitUpdate,
        }
    }
}

/// Error categories reported across the IPC boundary.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// File or process access failed.
    Io,
    /// A startup, shutdown, kill or update wait was exceeded.
    Timeout,
    /// Malformed TLS material or unexpected node output.
    Protocol,
    /// Retry budget exhausted; operator intervention required.
    Fatal,
    /// The operation is not allowed in the current state.
    InvalidState,
    /// The request could not be delivered or answered.
    Transport,
}

/// Responses sent from the supervisor for each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Response {
    State(NodeState),
    TlsConfig(Option<TlsConfig>),
    Status(CardanoStatus),
    Faults(Vec<FaultInjection>),

    /// The request completed without a value.
    Done,

    /// The request failed.
    Error { kind: ErrorKind, message: String },
}

impl Response {
    /// Build an error response.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

/// Broadcasts sent from the supervisor to every connected consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// The node moved to a new lifecycle state.
    StateChanged(NodeState),

    /// The TLS config was produced or cleared.
    TlsConfigChanged(Option<TlsConfig>),

    /// The consumer is asked to terminate with the given exit code.
    ExitRequested { code: i32 },
}

impl Event {
    /// Logical channel the event is broadcast on.
    pub fn channel(&self) -> Channel {
        match self {
            Event::StateChanged(_) => Channel::StateChange,
            Event::TlsConfigChanged(_) => Channel::TlsConfig,
            Event::ExitRequested { .. } => Channel::AwaitUpdate,
        }
    }
}

/// Envelope used by stream transports (one JSON document per line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Frame {
    Request {
        #[ts(type = "number")]
        id: u64,
        request: Request,
    },
    Response {
        #[ts(type = "number")]
        id: u64,
        response: Response,
    },
    Event { event: Event },
}
