//! Error type of node supervision operations.

use nl_protocol::ipc::ErrorKind;
use nl_protocol::node_models::NodeState;
use std::time::Duration;
use thiserror::Error;

use crate::process::ProcessError;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Timed out after {}ms waiting for {operation}", after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Malformed TLS material or unexpected node output.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Retry budget exhausted, or the node is unrecoverable.
    #[error("{0}")]
    Fatal(String),

    #[error("Cannot move node from {from} to {to}")]
    InvalidTransition { from: NodeState, to: NodeState },

    /// A startup was aborted by a stop or exit request.
    #[error("Node startup was cancelled")]
    Cancelled,
}

impl NodeError {
    /// Category reported across the IPC boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::Process(_) | NodeError::Store(_) => ErrorKind::Io,
            NodeError::Timeout { .. } => ErrorKind::Timeout,
            NodeError::Protocol(_) => ErrorKind::Protocol,
            NodeError::Fatal(_) => ErrorKind::Fatal,
            NodeError::InvalidTransition { .. } | NodeError::Cancelled => ErrorKind::InvalidState,
        }
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
