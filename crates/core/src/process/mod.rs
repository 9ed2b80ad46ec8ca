//! Process control.
//!
//! The node supervisor never touches OS primitives directly. It goes through
//! the [`ProcessController`] trait, which the OS implementation backs with
//! `tokio::process` and signals, and which tests replace with a scripted
//! double.

pub mod controller;
pub mod message;
pub mod os;

pub use controller::{
    ExitInfo, LogSink, ProcessController, ProcessError, ProcessEvent, SpawnedNode,
};
pub use message::NodeMessage;
pub use os::OsProcessController;
