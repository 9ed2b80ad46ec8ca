//! # nl-protocol
//!
//! Wire types shared by the node supervisor, its consumers and the CLI.
//!
//! - [`config_models`]: the launcher configuration file and its timing defaults
//! - [`node_models`]: lifecycle states, TLS material and fault injections
//! - [`status_models`]: the connectivity snapshot a consumer reports back
//! - [`ipc`]: requests, responses, events and the line-delimited frame envelope
//!
//! Everything here is plain data. The crate depends on serde and ts-rs only,
//! so a UI can generate matching TypeScript bindings without pulling in tokio.

pub mod config_models;
pub mod ipc;
pub mod node_models;
pub mod status_models;

pub use config_models::*;
pub use ipc::*;
pub use node_models::*;
pub use status_models::*;
