//! # nl-core
//!
//! Supervision of a single blockchain node process.
//!
//! [`state::NodeSupervisor`] owns the node lifecycle: it spawns the node
//! through a [`process::ProcessController`], waits for the API port and TLS
//! material, restarts after crashes and tears the process down on exit. The
//! [`ipc`] gateway exposes that state to consumers in-process or over a
//! Unix socket, and [`status`] caches the connectivity they report back.
//! Configuration comes from [`config`], the previous pid from [`storage`].

pub mod config;
pub mod error;
pub mod ipc;
pub mod process;
pub mod state;
pub mod status;
pub mod storage;

pub use error::{NodeError, NodeResult};
