//! Error types of the consumer side.

use thiserror::Error;

use crate::link::LinkError;

#[derive(Error, Debug)]
pub enum MonitorError {
    /// The node API request failed or returned an error status.
    #[error("Node API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The node API answered with an unexpected body.
    #[error("Unexpected node API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Link(#[from] LinkError),
}
