//! Persistence of launcher state that must survive a restart of the
//! supervising application.

pub mod pid_store;

pub use pid_store::{JsonFilePidStore, MemoryPidStore, PidStore, StoreError};
