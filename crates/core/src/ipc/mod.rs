//! IPC gateway between the supervisor and its consumers.
//!
//! - [`gateway`]: request handlers and event broadcasting
//! - [`stream`]: JSON-lines transport over any byte stream

pub mod gateway;
pub mod stream;

pub use gateway::{EventBus, IpcGateway};
pub use stream::serve_connection;
