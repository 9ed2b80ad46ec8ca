//! Node lifecycle management.
//!
//! This module provides:
//! - The transition table of node states
//! - Lifecycle hooks fired on state changes
//! - Node invocation and TLS loading
//! - The [`NodeSupervisor`] coordinating all of the above

pub mod hooks;
pub mod launch;
pub mod supervisor;
pub mod transitions;

pub use hooks::LifecycleHooks;
pub use supervisor::{Broadcaster, NodeSupervisor, NoopBroadcaster};
