//! Structured messages written by the node on stdout.
//!
//! The node interleaves these JSON documents with its regular log output,
//! one per line:
//!
//! ```json
//! {"ReplyPort": 8090}
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeMessage {
    /// The node API is listening on this port. Signals readiness.
    ReplyPort(u16),
}

impl NodeMessage {
    /// Parse one output line, returning `None` for regular log lines.
    pub fn parse_line(line: &str) -> Option<NodeMessage> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}
